//! Error types used by the graph and by node computations.
//!
//! - [`GraphError`]: configuration errors raised while building or driving
//!   the graph. These surface synchronously to whoever builds the graph.
//! - [`NodeError`]: failures of a single node's value computation. These
//!   are logged by the scheduler and never reach the scan loop.

use thiserror::Error;

/// Errors raised while registering nodes, declaring edges, or starting the
/// scan loop.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A node of this concrete type is already registered.
    #[error("node of type {node} already registered; only one node of each type is allowed")]
    DuplicateNode {
        /// Type name of the rejected node.
        node: &'static str,
    },

    /// The declared state property name is empty or whitespace.
    #[error("state property name of node {node} is invalid (must not be empty or whitespace)")]
    InvalidName {
        /// Type name of the rejected node.
        node: &'static str,
    },

    /// Another node already claimed this state property name.
    #[error("node {node}: another node already has state property name {name:?}; names must be unique")]
    DuplicateName {
        /// Type name of the rejected node.
        node: &'static str,
        /// The contested name.
        name: String,
    },

    /// A node tried to precede or follow a node of its own type.
    #[error("a node cannot {relation} a node of the same type ({node})")]
    SelfRelationship {
        /// `"precede"` or `"follow"`.
        relation: &'static str,
        /// Type name of the offending node.
        node: &'static str,
    },

    /// The edge between these two node types was already declared.
    #[error("relationship {preceder} -> {follower} already declared; duplicates are not allowed")]
    DuplicateRelationship {
        /// Upstream node type.
        preceder: &'static str,
        /// Downstream node type.
        follower: &'static str,
    },

    /// An edge call received no nodes or a node that is no longer registered.
    #[error("invalid argument to {call}: {reason}")]
    InvalidArgument {
        /// The call that rejected its argument.
        call: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A cancellation signal was registered by a node that is not a follower.
    #[error("{follower} is not a follower of {node}")]
    NotAFollower {
        /// Node whose registry was targeted.
        node: &'static str,
        /// The node that tried to register.
        follower: &'static str,
    },

    /// `ScanLoop::start` was called while the loop is already running.
    #[error("scan loop already running")]
    AlreadyRunning,
}

impl GraphError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use valuegraph_core::GraphError;
    ///
    /// assert_eq!(GraphError::AlreadyRunning.as_label(), "scan_already_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GraphError::DuplicateNode { .. } => "graph_duplicate_node",
            GraphError::InvalidName { .. } => "graph_invalid_name",
            GraphError::DuplicateName { .. } => "graph_duplicate_name",
            GraphError::SelfRelationship { .. } => "graph_self_relationship",
            GraphError::DuplicateRelationship { .. } => "graph_duplicate_relationship",
            GraphError::InvalidArgument { .. } => "graph_invalid_argument",
            GraphError::NotAFollower { .. } => "graph_not_a_follower",
            GraphError::AlreadyRunning => "scan_already_running",
        }
    }
}

/// Errors returned by [`Node::determine_value`](crate::Node::determine_value).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The computation failed.
    #[error("computation failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// A preceder the computation relies on is not connected to this node.
    #[error("missing preceder {node}")]
    MissingPreceder {
        /// Type name of the missing preceder.
        node: &'static str,
    },

    /// The computation panicked.
    #[error("computation of {node} panicked")]
    Panicked {
        /// Type name of the node.
        node: &'static str,
    },
}

impl NodeError {
    /// Convenience constructor for [`NodeError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        NodeError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeError::Failed { .. } => "node_failed",
            NodeError::MissingPreceder { .. } => "node_missing_preceder",
            NodeError::Panicked { .. } => "node_panicked",
        }
    }
}
