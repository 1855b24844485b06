//! Arena-backed tree models and the traversal the scheduler runs over them.

use std::ops::Index;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::TreeError;

/// A node of a tree-shaped model.
///
/// The kind is what strategies are dispatched on, two nodes of the same kind
/// are always handled by the same strategy for a given key.
pub trait Node {
    fn kind(&self) -> &str;
}

/// Event emitted while walking a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// The node is entered, none of its descendants were visited yet.
    Pre(NodeIndex),
    /// All descendants of the node were visited.
    Post(NodeIndex),
}

/// A rooted tree stored in an arena. Edges point from parent to child, node
/// identity is the [`NodeIndex`] handed out on insertion and stays stable for
/// the lifetime of the tree.
#[derive(Debug, Clone)]
pub struct Tree<N> {
    graph: DiGraph<N, ()>,
    root: NodeIndex,
}

impl<N> Tree<N> {
    pub fn new(root: N) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(root);
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Appends `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeIndex, node: N) -> Result<NodeIndex, TreeError> {
        if self.graph.node_weight(parent).is_none() {
            return Err(TreeError::ForeignParent(parent));
        }
        let index = self.graph.add_node(node);
        self.graph.add_edge(parent, index, ());
        Ok(index)
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .next()
    }

    /// Children of a node, in insertion order.
    pub fn children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        // petgraph yields the most recently added edge first
        children.reverse();
        children
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Depth-first pre-order walk starting at `from`. Every node produces a
    /// [`Visit::Pre`] event before any event of its descendants and a
    /// [`Visit::Post`] event after all of them. The walk uses an explicit
    /// stack, so deep trees can't overflow the call stack.
    pub fn walk(&self, from: NodeIndex, mut visitor: impl FnMut(Visit)) {
        let mut stack = vec![Visit::Pre(from)];

        while let Some(visit) = stack.pop() {
            visitor(visit);

            if let Visit::Pre(index) = visit {
                stack.push(Visit::Post(index));
                // pushed newest first, so the oldest child is popped first
                stack.extend(
                    self.graph
                        .neighbors_directed(index, Direction::Outgoing)
                        .map(Visit::Pre),
                );
            }
        }
    }
}

impl<N> Index<NodeIndex> for Tree<N> {
    type Output = N;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.graph[index]
    }
}
