//! Node Registry
//!
//! Master list of registered nodes plus the set of claimed state property
//! names. Enforces one node per concrete type and unique, non-blank names.

use std::any::TypeId;
use std::collections::HashSet;

use super::collection::NodeCollection;
use super::node::{NodeHandle, StateProperty};
use crate::error::GraphError;

#[derive(Debug, Default)]
pub(crate) struct NodeRegistry {
    nodes: NodeCollection,
    names: HashSet<String>,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Check that a node of this type and descriptor may be registered.
    pub(crate) fn validate(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        property: Option<&StateProperty>,
    ) -> Result<(), GraphError> {
        if self.nodes.contains_id(type_id) {
            return Err(GraphError::DuplicateNode { node: type_name });
        }

        let Some(property) = property else {
            return Ok(());
        };

        match property.name {
            Some(name) if !name.trim().is_empty() => {
                if self.names.contains(name) {
                    return Err(GraphError::DuplicateName {
                        node: type_name,
                        name: name.to_string(),
                    });
                }
                Ok(())
            }
            _ => Err(GraphError::InvalidName { node: type_name }),
        }
    }

    /// Insert a validated node and claim its name.
    pub(crate) fn insert(&mut self, node: NodeHandle) {
        if let Some(name) = node.name() {
            self.names.insert(name.to_string());
        }
        self.nodes.insert(node);
    }

    pub(crate) fn nodes(&self) -> &NodeCollection {
        &self.nodes
    }

    pub(crate) fn is_name_claimed(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Remove every node and release every name, returning the removed nodes.
    pub(crate) fn clear(&mut self) -> NodeCollection {
        self.names.clear();
        std::mem::take(&mut self.nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn rejects_blank_names() {
        let registry = NodeRegistry::new();
        let id = TypeId::of::<A>();

        for prop in [
            StateProperty::new(true, ""),
            StateProperty::new(true, "   "),
            StateProperty::unnamed(true),
        ] {
            assert_eq!(
                registry.validate(id, "A", Some(&prop)),
                Err(GraphError::InvalidName { node: "A" })
            );
        }
    }

    #[test]
    fn undeclared_descriptor_is_accepted() {
        let registry = NodeRegistry::new();
        assert_eq!(registry.validate(TypeId::of::<A>(), "A", None), Ok(()));
    }

    #[test]
    fn rejects_claimed_names() {
        let mut registry = NodeRegistry::new();
        registry.names.insert("X".to_string());

        let err = registry
            .validate(TypeId::of::<B>(), "B", Some(&StateProperty::new(false, "X")))
            .unwrap_err();
        assert_eq!(err.as_label(), "graph_duplicate_name");

        registry.clear();
        assert!(!registry.is_name_claimed("X"));
    }
}
