//! Declarative strategy definitions.
//!
//! A [`Manifest`] describes which keys exist, which node kinds they apply to,
//! what they require and in which order they run. It names strategies instead
//! of containing them, the actual functions come from a [`Catalog`].
//!
//! ```json
//! {
//!   "definitions": [
//!     { "key": "type-path", "kind": "Class", "strategy": "path" },
//!     { "key": "derived-id", "kind": "Class", "requires": ["type-path"],
//!       "order": "post", "strategy": "id" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::core::{Key, KeySet, Kind, Order};
use crate::error::ConfigError;
use crate::registry::{Context, Strategy, StrategyEntry, StrategyFn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub key: Key,
    pub kind: Kind,
    #[serde(default)]
    pub requires: KeySet,
    #[serde(default)]
    pub order: Order,
    /// Name of the strategy in the catalog.
    pub strategy: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub definitions: Vec<Definition>,
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Binds every definition to its strategy.
    pub fn into_entries<N>(&self, catalog: &Catalog<N>) -> Result<Vec<StrategyEntry<N>>, ConfigError> {
        self.definitions
            .iter()
            .map(|def| {
                let strategy = catalog
                    .get(&def.strategy)
                    .ok_or_else(|| ConfigError::UnknownStrategy(def.strategy.clone()))?;

                Ok(StrategyEntry::new(def.key.clone(), def.kind.clone(), strategy)
                    .requires(def.requires.iter().cloned())
                    .order(def.order))
            })
            .collect()
    }
}

/// Named strategies a [`Manifest`] can refer to.
pub struct Catalog<N> {
    strategies: HashMap<String, Arc<dyn Strategy<N>>>,
}

impl<N: 'static> Catalog<N> {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, strategy: Arc<dyn Strategy<N>>) -> &mut Self {
        self.strategies.insert(name.into(), strategy);
        self
    }

    pub fn add<F, R>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&Context<'_, N>, NodeIndex) -> Option<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        self.insert(name, Arc::new(StrategyFn::new(callback)))
    }
}

impl<N> Catalog<N> {
    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy<N>>> {
        self.strategies.get(name).cloned()
    }
}

impl<N: 'static> Default for Catalog<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keys;

    const MANIFEST: &str = r#"{
        "definitions": [
            { "key": "type-path", "kind": "Class", "strategy": "path" },
            { "key": "type-path", "kind": "Package", "strategy": "path" },
            { "key": "derived-id", "kind": "Class", "requires": ["type-path"],
              "order": "post", "strategy": "id" }
        ]
    }"#;

    fn catalog() -> Catalog<()> {
        let mut catalog = Catalog::new();
        catalog
            .add("path", |_, node| Some(node.index()))
            .add("id", |_, _| Some("id"));
        catalog
    }

    #[test]
    fn test_parse() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.definitions.len(), 3);

        let last = &manifest.definitions[2];
        assert_eq!(last.order, Order::Post);
        assert_eq!(last.requires, keys(["type-path"]));
        assert_eq!(manifest.definitions[0].order, Order::Pre);
        assert!(manifest.definitions[0].requires.is_empty());
    }

    #[test]
    fn test_into_entries() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let entries = manifest.into_entries(&catalog()).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].key.as_str(), "derived-id");
        assert!(entries[2].applies_to("Class"));
    }

    #[test]
    fn test_unknown_strategy() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let mut catalog = Catalog::<()>::new();
        catalog.add("path", |_, _| Some(0_u8));

        assert!(matches!(
            manifest.into_entries(&catalog),
            Err(ConfigError::UnknownStrategy(name)) if name == "id"
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            Manifest::from_json(r#"{ "definitions": [ { "key": 1 } ] }"#),
            Err(ConfigError::Manifest(_))
        ));
        assert!(matches!(
            Manifest::from_path("/nonexistent/manifest.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
