#![forbid(unsafe_code)]
//! Incremental computation of derived values ("annotations") over the nodes
//! of tree-shaped models.
//!
//! Every kind of annotation is named by a [`Key`] and computed by strategies
//! dispatched on the exact [`Kind`] of each node. A key may require other keys
//! to be computed first, possibly on different nodes. The [`Engine`] resolves
//! these requirements, computes only what a model is missing, and refuses
//! removals that would leave computed keys without their prerequisites.
//!
//! ```rust
//! use annotengine::{Engine, Model, Node, Order, Registry, Tree};
//!
//! struct Element(&'static str, &'static str);
//!
//! impl Node for Element {
//!     fn kind(&self) -> &str {
//!         self.0
//!     }
//! }
//!
//! let mut registry: Registry<Element> = Registry::new();
//! for kind in ["Package", "Class"] {
//!     registry
//!         .strategy("type-path")
//!         .on(kind)
//!         .run(|ctx, node| {
//!             let parent = ctx.parent(node).and_then(|p| ctx.get::<String>(p, "type-path"));
//!             let name = ctx.node(node).1;
//!             Some(parent.map_or_else(|| name.to_string(), |p| format!("{p}.{name}")))
//!         })?;
//! }
//! registry
//!     .strategy("derived-id")
//!     .on("Class")
//!     .depends_on(["type-path"])
//!     .order(Order::Post)
//!     .run(|ctx, node| ctx.get::<String>(node, "type-path").map(|p| p.to_uppercase()))?;
//!
//! let engine = Engine::from_registry(registry)?;
//!
//! let mut tree = Tree::new(Element("Package", "model"));
//! let class = tree.add_child(tree.root(), Element("Class", "Order"))?;
//! let mut model = Model::new(tree);
//!
//! engine.annotate_keys(&mut model, ["derived-id"])?;
//!
//! assert_eq!(
//!     model.annotation::<String>(class, "derived-id").map(String::as_str),
//!     Some("MODEL.ORDER")
//! );
//! assert_eq!(engine.executed_keys(&model).len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod core;
pub mod engine;
mod error;
pub mod manifest;
mod registry;
mod store;
mod tree;
mod utils;

pub use petgraph::graph::NodeIndex;

pub use crate::core::{Dynamic, Key, KeySet, Kind, Order, keys};
pub use crate::engine::{Diagnostics, Phase, Round};
pub use crate::error::{ConfigError, EngineError, TreeError};
pub use crate::manifest::{Catalog, Manifest};
pub use crate::registry::{Context, Registry, Strategy, StrategyBinder, StrategyDef, StrategyEntry};
pub use crate::store::{AnnotationStore, Model, SideTable};
pub use crate::tree::{Node, Tree, Visit};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;

use crate::engine::Scheduler;

/// Entry point computing and removing annotations on models.
///
/// The engine owns a validated [`Registry`]. It holds no state about the
/// models it is used on, everything computed lives in the model itself. Calls
/// are synchronous and one model must not be used by two calls at once.
pub struct Engine<N> {
    registry: Registry<N>,
}

impl<N> Engine<N>
where
    N: Node,
{
    /// An engine without any keys.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Validates `registry` and takes ownership of it.
    pub fn from_registry(registry: Registry<N>) -> Result<Self, ConfigError> {
        registry.validate()?;
        Ok(Self { registry })
    }

    /// Builds an engine from declarative definitions bound to `catalog`.
    pub fn from_manifest(manifest: &Manifest, catalog: &Catalog<N>) -> Result<Self, ConfigError> {
        let mut engine = Self::new();
        engine.configure(manifest.into_entries(catalog)?)?;
        Ok(engine)
    }

    /// Replaces the current configuration with `entries`. On failure the
    /// previous configuration stays in place.
    pub fn configure(
        &mut self,
        entries: impl IntoIterator<Item = StrategyEntry<N>>,
    ) -> Result<(), ConfigError> {
        let mut registry = Registry::new();
        registry.register(entries)?;
        registry.validate()?;

        tracing::info!(keys = registry.requirements().len(), strategies = registry.len(), "configured");
        self.registry = registry;
        Ok(())
    }

    pub fn registry(&self) -> &Registry<N> {
        &self.registry
    }

    /// Computes every registered key on `model`.
    pub fn annotate<S>(&self, model: &mut Model<N, S>) -> Result<Diagnostics, EngineError>
    where
        S: AnnotationStore,
    {
        Scheduler::new(&self.registry).annotate(model, &self.registry.all_keys())
    }

    /// Computes `keys` and everything they require on `model`.
    pub fn annotate_keys<S, I, K>(&self, model: &mut Model<N, S>, keys: I) -> Result<Diagnostics, EngineError>
    where
        S: AnnotationStore,
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Scheduler::new(&self.registry).annotate(model, &crate::core::keys(keys))
    }

    /// Removes every computed key from `model`. Returns the number of values
    /// removed.
    pub fn remove_annotations<S>(&self, model: &mut Model<N, S>) -> Result<usize, EngineError>
    where
        S: AnnotationStore,
    {
        let computed = engine::executed_keys(model);
        Scheduler::new(&self.registry).remove_annotations(model, &computed)
    }

    /// Removes `keys` from `model`, failing without any change if a key that
    /// stays computed requires one of them.
    pub fn remove_annotation_keys<S, I, K>(&self, model: &mut Model<N, S>, keys: I) -> Result<usize, EngineError>
    where
        S: AnnotationStore,
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Scheduler::new(&self.registry).remove_annotations(model, &crate::core::keys(keys))
    }

    /// Keys fully computed for `model`.
    pub fn executed_keys<S>(&self, model: &Model<N, S>) -> KeySet
    where
        S: AnnotationStore,
    {
        engine::executed_keys(model)
    }

    /// Every key this engine can compute.
    pub fn available_keys(&self) -> KeySet {
        self.registry.all_keys()
    }
}

impl<N: Node> Default for Engine<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> std::fmt::Debug for Engine<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("registry", &self.registry).finish()
    }
}
