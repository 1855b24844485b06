use petgraph::graph::NodeIndex;
use thiserror::Error;

use crate::core::{Key, KeySet, Kind, format_keys};

/// Raised while registering or validating strategy definitions. A registry
/// that failed validation must not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Key '{0}' transitively requires itself")]
    Cyclic(Key),

    #[error("Key '{0}' was never registered")]
    Unregistered(Key),

    #[error("Key '{0}' requires '{1}', which was never registered")]
    Unresolvable(Key, Key),

    #[error("Key '{0}' already has a strategy for node kind '{1}'")]
    Duplicate(Key, Kind),

    #[error("Strategy '{0}' is not present in the catalog")]
    UnknownStrategy(String),

    #[error("Couldn't parse manifest.\n{0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Couldn't read manifest.\n{0}")]
    Io(#[from] std::io::Error),
}

/// Returned by the operations of an [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Key '{0}' is not registered")]
    UnknownKey(Key),

    #[error("No progress possible, keys {} remain open", format_keys(.0))]
    Unsatisfiable(KeySet),

    #[error("Removal would strand computed keys {}", format_keys(.0))]
    DependencyViolation(KeySet),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Raised while building a [`Tree`](crate::Tree).
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Node {0:?} is not part of the tree")]
    ForeignParent(NodeIndex),
}
