//! Node collections keyed by concrete node type.

use std::any::TypeId;

use indexmap::IndexMap;

use super::node::NodeHandle;

/// An insertion-ordered set of nodes holding at most one node per concrete type.
///
/// Used for the registry's master list and for each node's edge lists.
#[derive(Clone, Default)]
pub struct NodeCollection {
    nodes: IndexMap<TypeId, NodeHandle>,
}

impl NodeCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Returns `false` if a node of the same type is already present.
    pub fn insert(&mut self, node: NodeHandle) -> bool {
        if self.nodes.contains_key(&node.type_id()) {
            return false;
        }
        self.nodes.insert(node.type_id(), node);
        true
    }

    /// Look up the node of concrete type `T`.
    pub fn get<T: 'static>(&self) -> Option<&NodeHandle> {
        self.nodes.get(&TypeId::of::<T>())
    }

    /// Look up a node by its type id.
    pub fn get_by_id(&self, type_id: TypeId) -> Option<&NodeHandle> {
        self.nodes.get(&type_id)
    }

    /// Whether a node of concrete type `T` is present.
    pub fn contains<T: 'static>(&self) -> bool {
        self.nodes.contains_key(&TypeId::of::<T>())
    }

    /// Whether a node with this type id is present.
    pub fn contains_id(&self, type_id: TypeId) -> bool {
        self.nodes.contains_key(&type_id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the collection holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over the nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeHandle> {
        self.nodes.values()
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Build a new collection from the nodes matching `pred`.
    pub fn filter<F>(&self, mut pred: F) -> NodeCollection
    where
        F: FnMut(&NodeHandle) -> bool,
    {
        let nodes = self
            .nodes
            .iter()
            .filter(|(_, node)| pred(*node))
            .map(|(id, node)| (*id, node.clone()))
            .collect();
        NodeCollection { nodes }
    }
}

impl IntoIterator for NodeCollection {
    type Item = NodeHandle;
    type IntoIter = indexmap::map::IntoValues<TypeId, NodeHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_values()
    }
}

impl<'a> IntoIterator for &'a NodeCollection {
    type Item = &'a NodeHandle;
    type IntoIter = indexmap::map::Values<'a, TypeId, NodeHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.values()
    }
}

impl FromIterator<NodeHandle> for NodeCollection {
    fn from_iter<I: IntoIterator<Item = NodeHandle>>(iter: I) -> Self {
        let mut collection = NodeCollection::new();
        for node in iter {
            collection.insert(node);
        }
        collection
    }
}

impl std::fmt::Debug for NodeCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.nodes.values().map(NodeHandle::type_name))
            .finish()
    }
}
