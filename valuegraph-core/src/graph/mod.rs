//! Dependency Graph
//!
//! This module implements the node graph: nodes, their edges, their value
//! ledgers and the registry that owns them.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are computed values, one node per concrete Rust type
//! - Edges are "precedes/follows" relationships: if A precedes B, B's value
//!   is computed from A's, and A is updated before B computes
//!
//! The graph is fixed once built. Edges cannot be removed; the only way to
//! change topology is [`Graph::reset`] followed by a rebuild.
//!
//! # Design Decisions
//!
//! 1. The registry is an explicit [`Graph`] value rather than a global, so
//!    independent graphs (and tests) never share state.
//!
//! 2. Edges are stored on both ends (preceders and followers) for traversal
//!    in both directions. Both ends hold strong handles; [`Graph::reset`]
//!    closes every node, which clears its edges and breaks the cycles.
//!
//! 3. Each node's publication descriptor ([`StateProperty`]) is read once at
//!    registration from the node type's static [`Node::state_property`].

mod collection;
mod ledger;
mod node;
mod registry;
mod supervisor;

pub use collection::NodeCollection;
pub use ledger::{ValueLedger, LEDGER_CAPACITY};
pub use node::{Node, NodeContext, NodeHandle, StateProperty};
pub use supervisor::Graph;
