//! Per-node annotation storage and the model that owns it.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::core::{Dynamic, Key, KeySet};
use crate::tree::Tree;

/// Storage for computed annotation values and the record of which keys have
/// been fully computed for a model.
///
/// The store is owned by the model it describes, the engine never keeps state
/// keyed by model identity.
pub trait AnnotationStore {
    /// Keys fully computed for this model, `None` if the record was never
    /// created.
    fn computed_keys(&self) -> Option<&KeySet>;

    /// Keys fully computed for this model, creating an empty record on first
    /// access.
    fn computed_keys_mut(&mut self) -> &mut KeySet;

    fn get(&self, node: NodeIndex, key: &Key) -> Option<&Dynamic>;

    fn set(&mut self, node: NodeIndex, key: Key, value: Dynamic);

    fn remove(&mut self, node: NodeIndex, key: &Key) -> Option<Dynamic>;
}

/// Default [`AnnotationStore`], a side-table keyed by node index.
#[derive(Default)]
pub struct SideTable {
    computed: Option<KeySet>,
    values: HashMap<NodeIndex, HashMap<Key, Dynamic>>,
}

impl SideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys that currently hold a value on `node`.
    pub fn keys_at(&self, node: NodeIndex) -> KeySet {
        self.values
            .get(&node)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of stored values across all nodes.
    pub fn len(&self) -> usize {
        self.values.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnnotationStore for SideTable {
    fn computed_keys(&self) -> Option<&KeySet> {
        self.computed.as_ref()
    }

    fn computed_keys_mut(&mut self) -> &mut KeySet {
        self.computed.get_or_insert_with(KeySet::new)
    }

    fn get(&self, node: NodeIndex, key: &Key) -> Option<&Dynamic> {
        self.values.get(&node)?.get(key)
    }

    fn set(&mut self, node: NodeIndex, key: Key, value: Dynamic) {
        self.values.entry(node).or_default().insert(key, value);
    }

    fn remove(&mut self, node: NodeIndex, key: &Key) -> Option<Dynamic> {
        let map = self.values.get_mut(&node)?;
        let value = map.remove(key);
        if map.is_empty() {
            self.values.remove(&node);
        }
        value
    }
}

impl std::fmt::Debug for SideTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<_> = self
            .values
            .iter()
            .map(|(node, map)| (node.index(), map.len()))
            .collect();
        counts.sort();

        f.debug_struct("SideTable")
            .field("computed", &self.computed)
            .field("values", &counts)
            .finish()
    }
}

/// A tree together with the annotations computed over it.
#[derive(Debug)]
pub struct Model<N, S = SideTable> {
    pub(crate) tree: Tree<N>,
    pub(crate) store: S,
}

impl<N> Model<N> {
    pub fn new(tree: Tree<N>) -> Self {
        Self::with_store(tree, SideTable::default())
    }
}

impl<N, S> Model<N, S>
where
    S: AnnotationStore,
{
    pub fn with_store(tree: Tree<N>, store: S) -> Self {
        Self { tree, store }
    }

    pub fn tree(&self) -> &Tree<N> {
        &self.tree
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (Tree<N>, S) {
        (self.tree, self.store)
    }

    /// The raw value stored for `key` on `node`.
    pub fn value(&self, node: NodeIndex, key: impl Into<Key>) -> Option<&Dynamic> {
        self.store.get(node, &key.into())
    }

    /// The value stored for `key` on `node`, if present and of type `T`.
    pub fn annotation<T>(&self, node: NodeIndex, key: impl Into<Key>) -> Option<&T>
    where
        T: 'static,
    {
        self.value(node, key)?.downcast_ref::<T>()
    }
}
