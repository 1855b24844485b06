//! Registration and dispatch of the strategies that compute annotations.
//!
//! A [`Registry`] maps every annotation [`Key`] to the strategies registered
//! for it, one per node [`Kind`], and separately to the set of keys that must
//! already be computed before the key itself can be computed. All strategies
//! sharing a key are requested and removed together, so their requirement
//! sets are merged into one.
//!
//! ## Building a registry
//!
//! ```rust
//! use annotengine::{Order, Registry};
//! # struct Class;
//! # impl annotengine::Node for Class { fn kind(&self) -> &str { "Class" } }
//!
//! let mut registry: Registry<Class> = Registry::new();
//!
//! registry
//!     .strategy("type-path")
//!     .on("Class")
//!     .run(|_, node| Some(format!("/{}", node.index())))?;
//!
//! registry
//!     .strategy("derived-id")
//!     .on("Class")
//!     .depends_on(["type-path"])
//!     .order(Order::Post)
//!     .run(|ctx, node| ctx.get::<String>(node, "type-path").map(|p| p.len()))?;
//!
//! registry.validate()?;
//! # Ok::<(), annotengine::ConfigError>(())
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::graph::NodeIndex;

use crate::core::{Dynamic, Key, KeySet, Kind, Order};
use crate::error::ConfigError;
use crate::store::AnnotationStore;
use crate::tree::Tree;

/// Read-only view handed to strategies while they compute.
///
/// Besides the tree itself, it exposes every annotation stored so far, which
/// includes all prerequisite keys on every node.
pub struct Context<'a, N> {
    pub(crate) tree: &'a Tree<N>,
    pub(crate) store: &'a dyn AnnotationStore,
}

impl<'a, N> Context<'a, N> {
    pub(crate) fn new(tree: &'a Tree<N>, store: &'a dyn AnnotationStore) -> Self {
        Self { tree, store }
    }

    pub fn tree(&self) -> &'a Tree<N> {
        self.tree
    }

    pub fn node(&self, index: NodeIndex) -> &'a N {
        &self.tree[index]
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.tree.parent(index)
    }

    pub fn children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.tree.children(index)
    }

    pub fn value(&self, index: NodeIndex, key: impl Into<Key>) -> Option<&'a Dynamic> {
        self.store.get(index, &key.into())
    }

    /// Typed access to an annotation already stored on `index`.
    pub fn get<T>(&self, index: NodeIndex, key: impl Into<Key>) -> Option<&'a T>
    where
        T: 'static,
    {
        self.value(index, key)?.downcast_ref::<T>()
    }
}

/// Computes the value of one key for a single node.
///
/// Returning `None` means the key does not apply to this particular node,
/// which is not an error.
pub trait Strategy<N>: Send + Sync {
    fn compute(&self, ctx: &Context<'_, N>, node: NodeIndex) -> Option<Dynamic>;
}

/// Adapts a typed closure into a [`Strategy`].
pub(crate) struct StrategyFn<F, R> {
    callback: F,
    _phantom: PhantomData<fn() -> R>,
}

impl<F, R> StrategyFn<F, R> {
    pub(crate) fn new(callback: F) -> Self {
        Self {
            callback,
            _phantom: PhantomData,
        }
    }
}

impl<N, F, R> Strategy<N> for StrategyFn<F, R>
where
    F: Fn(&Context<'_, N>, NodeIndex) -> Option<R> + Send + Sync,
    R: Send + Sync + 'static,
{
    fn compute(&self, ctx: &Context<'_, N>, node: NodeIndex) -> Option<Dynamic> {
        (self.callback)(ctx, node).map(|value| Arc::new(value) as Dynamic)
    }
}

/// One strategy bound to an annotation key and the node kind it handles.
pub struct StrategyEntry<N> {
    pub key: Key,
    pub kind: Kind,
    pub requires: KeySet,
    pub order: Order,
    pub strategy: Arc<dyn Strategy<N>>,
}

impl<N> StrategyEntry<N> {
    pub fn new(key: impl Into<Key>, kind: impl Into<Kind>, strategy: Arc<dyn Strategy<N>>) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            requires: KeySet::new(),
            order: Order::Pre,
            strategy,
        }
    }

    /// Builds an entry from a typed closure.
    pub fn from_fn<F, R>(key: impl Into<Key>, kind: impl Into<Kind>, callback: F) -> Self
    where
        F: Fn(&Context<'_, N>, NodeIndex) -> Option<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
        N: 'static,
    {
        Self::new(key, kind, Arc::new(StrategyFn::new(callback)))
    }

    pub fn requires<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        self.requires.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Exact match on the node kind.
    pub fn applies_to(&self, kind: &str) -> bool {
        self.kind.as_str() == kind
    }

    pub fn compute(&self, ctx: &Context<'_, N>, node: NodeIndex) -> Option<Dynamic> {
        self.strategy.compute(ctx, node)
    }
}

impl<N> Clone for StrategyEntry<N> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind.clone(),
            requires: self.requires.clone(),
            order: self.order,
            strategy: self.strategy.clone(),
        }
    }
}

impl<N> Debug for StrategyEntry<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("requires", &self.requires)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// All strategies known to an engine, indexed by key and node kind.
///
/// Once [`validate`](Registry::validate) succeeds the registry is expected to
/// stay unchanged; registering more entries afterwards without validating
/// again leaves the engine free to fail with
/// [`EngineError::Unsatisfiable`](crate::EngineError::Unsatisfiable).
pub struct Registry<N> {
    strategies: BTreeMap<Key, HashMap<Kind, StrategyEntry<N>>>,
    requires: BTreeMap<Key, KeySet>,
}

impl<N> Registry<N> {
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
            requires: BTreeMap::new(),
        }
    }

    /// Starts the definition of a strategy for `key`.
    pub fn strategy(&mut self, key: impl Into<Key>) -> StrategyDef<'_, N> {
        StrategyDef {
            registry: self,
            key: key.into(),
        }
    }

    /// Adds `entries`, merging the requirement sets of entries sharing a key.
    ///
    /// Either every entry is added or, if any `(key, kind)` pair is already
    /// taken, none is.
    pub fn register(
        &mut self,
        entries: impl IntoIterator<Item = StrategyEntry<N>>,
    ) -> Result<(), ConfigError> {
        let entries: Vec<_> = entries.into_iter().collect();

        let mut seen = HashSet::new();
        for entry in &entries {
            let taken = self
                .strategies
                .get(&entry.key)
                .is_some_and(|kinds| kinds.contains_key(&entry.kind));

            if taken || !seen.insert((&entry.key, &entry.kind)) {
                return Err(ConfigError::Duplicate(entry.key.clone(), entry.kind.clone()));
            }
        }

        for entry in entries {
            self.requires
                .entry(entry.key.clone())
                .or_default()
                .extend(entry.requires.iter().cloned());

            self.strategies
                .entry(entry.key.clone())
                .or_default()
                .insert(entry.kind.clone(), entry);
        }

        Ok(())
    }

    /// Checks that every required key is registered and that no key
    /// transitively requires itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, requires) in &self.requires {
            if let Some(missing) = requires.iter().find(|req| !self.requires.contains_key(*req)) {
                return Err(ConfigError::Unresolvable(key.clone(), missing.clone()));
            }
        }

        // edges point from a prerequisite to the keys requiring it
        let mut graph = DiGraphMap::<&Key, ()>::new();
        for (key, requires) in &self.requires {
            graph.add_node(key);
            for req in requires {
                graph.add_edge(req, key, ());
            }
        }

        toposort(&graph, None).map_err(|cycle| ConfigError::Cyclic(cycle.node_id().clone()))?;

        tracing::debug!(keys = self.requires.len(), "validated registry");
        Ok(())
    }

    /// The strategy registered for exactly this node kind, if any.
    pub fn dispatch(&self, key: &Key, kind: &str) -> Option<&StrategyEntry<N>> {
        self.strategies.get(key)?.get(kind)
    }

    pub fn all_keys(&self) -> KeySet {
        self.requires.keys().cloned().collect()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.requires.contains_key(key)
    }

    /// Keys that must be computed before `key`.
    pub fn requires(&self, key: &Key) -> Option<&KeySet> {
        self.requires.get(key)
    }

    /// Snapshot of the whole requirement map.
    pub fn requirements(&self) -> &BTreeMap<Key, KeySet> {
        &self.requires
    }

    /// Every strategy registered under `key`.
    pub fn entries(&self, key: &Key) -> impl Iterator<Item = &StrategyEntry<N>> {
        self.strategies.get(key).into_iter().flat_map(HashMap::values)
    }

    pub fn len(&self) -> usize {
        self.strategies.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl<N> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> Debug for Registry<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("requires", &self.requires)
            .field("strategies", &self.len())
            .finish()
    }
}

/// Renders the requirement graph as a Mermaid diagram.
impl<N> Display for Registry<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        let ids: HashMap<&Key, usize> = self.requires.keys().zip(0..).collect();

        for (key, id) in self.requires.keys().zip(0..) {
            let mut kinds: Vec<_> = self.entries(key).map(|e| e.kind.as_str()).collect();
            kinds.sort_unstable();
            let name = key.as_str().replace('"', "\\\"");
            writeln!(f, "    {id}[\"{name}\\n{}\"]", kinds.join(", "))?;
        }

        for (key, requires) in &self.requires {
            for req in requires {
                // unresolved requirements have no node to point from
                if let (Some(source), Some(target)) = (ids.get(req), ids.get(key)) {
                    writeln!(f, "    {source} --> {target}")?;
                }
            }
        }

        Ok(())
    }
}

/// First step of defining a strategy, the key is known but the node kind is
/// not.
pub struct StrategyDef<'a, N> {
    registry: &'a mut Registry<N>,
    key: Key,
}

impl<'a, N> StrategyDef<'a, N> {
    /// Binds the strategy to nodes of exactly this kind.
    pub fn on(self, kind: impl Into<Kind>) -> StrategyBinder<'a, N> {
        StrategyBinder {
            registry: self.registry,
            key: self.key,
            kind: kind.into(),
            requires: KeySet::new(),
            order: Order::Pre,
        }
    }
}

pub struct StrategyBinder<'a, N> {
    registry: &'a mut Registry<N>,
    key: Key,
    kind: Kind,
    requires: KeySet,
    order: Order,
}

impl<'a, N: 'static> StrategyBinder<'a, N> {
    pub fn depends_on<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        self.requires.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn run<F, R>(self, callback: F) -> Result<(), ConfigError>
    where
        F: Fn(&Context<'_, N>, NodeIndex) -> Option<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let entry = StrategyEntry::from_fn(self.key, self.kind, callback)
            .requires(self.requires)
            .order(self.order);

        self.registry.register([entry])
    }
}
