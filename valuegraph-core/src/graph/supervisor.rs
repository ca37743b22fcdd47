//! Graph Supervisor
//!
//! [`Graph`] owns the node registry. It registers nodes, answers queries
//! about the registered set (enabled, root and leaf nodes), and tears the
//! whole graph down between evaluation epochs with [`Graph::reset`].

use std::any::{type_name, TypeId};
use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

use super::collection::NodeCollection;
use super::node::{Node, NodeHandle};
use super::registry::NodeRegistry;
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::scheduler::UpdateTaskManager;

/// A fixed set of nodes and their edges.
pub struct Graph {
    config: GraphConfig,
    registry: RwLock<NodeRegistry>,
}

impl Graph {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(NodeRegistry::new()),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Register a node.
    ///
    /// Fails if a node of type `N` is already registered, or if `N` declares
    /// a state property whose name is blank or already claimed. A failed
    /// registration leaves the graph unchanged.
    pub fn register<N: Node>(&self, node: N) -> Result<NodeHandle, GraphError> {
        let property = N::state_property();

        let handle = {
            let mut registry = self.registry.write();
            registry.validate(TypeId::of::<N>(), type_name::<N>(), property.as_ref())?;

            let handle = NodeHandle::new(node, property, self.config.update_deadline);
            registry.insert(handle.clone());
            handle
        };

        UpdateTaskManager::arm(&handle);
        debug!(
            node = handle.type_name(),
            enabled = handle.is_enabled(),
            "node registered"
        );
        Ok(handle)
    }

    /// The registered node of type `T`.
    pub fn node<T: Node>(&self) -> Option<NodeHandle> {
        self.registry.read().nodes().get::<T>().cloned()
    }

    /// Snapshot of every registered node.
    pub fn nodes(&self) -> NodeCollection {
        self.registry.read().nodes().clone()
    }

    pub fn len(&self) -> usize {
        self.registry.read().nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().nodes().is_empty()
    }

    /// Whether a registered node claimed this state property name.
    pub fn is_name_claimed(&self, name: &str) -> bool {
        self.registry.read().is_name_claimed(name)
    }

    /// Nodes whose state property is declared and enabled.
    pub fn enabled_nodes(&self) -> NodeCollection {
        Self::filter_enabled(&self.nodes())
    }

    pub fn filter_enabled(nodes: &NodeCollection) -> NodeCollection {
        nodes.filter(NodeHandle::is_enabled)
    }

    /// Nodes of `nodes` without preceders.
    pub fn filter_roots(nodes: &NodeCollection) -> NodeCollection {
        nodes.filter(|n| !n.has_preceders())
    }

    /// Nodes without followers reachable from `nodes` (including `nodes` themselves).
    pub fn filter_leaves(nodes: &NodeCollection) -> NodeCollection {
        let mut leaves = NodeCollection::new();
        let mut seen: HashSet<TypeId> = HashSet::new();
        let mut unvisited: Vec<NodeHandle> = nodes.iter().cloned().collect();

        while let Some(node) = unvisited.pop() {
            if !seen.insert(node.type_id()) {
                continue;
            }

            let followers = node.followers();
            if followers.is_empty() {
                leaves.insert(node);
            } else {
                unvisited.extend(followers.into_iter().filter(|f| !seen.contains(&f.type_id())));
            }
        }

        leaves
    }

    /// Close every node and clear the registry and claimed names.
    pub fn reset(&self) {
        let removed = self.registry.write().clear();
        for node in removed.iter() {
            node.close();
        }
        debug!(
            removed = removed.len(),
            enabled = self.enabled_nodes().len(),
            "graph reset"
        );
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        for node in self.registry.get_mut().clear().iter() {
            node.close();
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("config", &self.config)
            .field("nodes", self.registry.read().nodes())
            .finish()
    }
}
