//! Valuegraph Core
//!
//! A small dependency-graph evaluation engine. Computed value nodes are
//! arranged in a DAG of "precedes/follows" relationships; each node
//! recomputes its value asynchronously, and a change in any value cancels
//! and invalidates everything downstream of it. A periodic scan loop
//! drives recomputation and publishes a [`State`] snapshot of all enabled
//! node values.
//!
//! # Architecture
//!
//! - `graph`: nodes, edges, value ledgers and the registry ([`Graph`])
//! - `scheduler`: per-node update tasks, the cancellation cascade and the
//!   [`ScanLoop`] driver
//! - `state`: the published snapshot
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use valuegraph_core::{Graph, ScanLoop};
//!
//! let graph = Arc::new(Graph::default());
//! let milky_way = graph.register(MilkyWay)?;
//! let solar_system = graph.register(SolarSystem)?;
//! milky_way.precedes(&[&solar_system])?;
//!
//! let scan = ScanLoop::new(graph.clone());
//! scan.on_state(|state| println!("{state}"));
//! scan.start()?;
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod scheduler;
pub mod state;

pub use config::GraphConfig;
pub use error::{GraphError, NodeError};
pub use graph::{Graph, Node, NodeCollection, NodeContext, NodeHandle, StateProperty};
pub use scheduler::{ScanLoop, TaskStatus};
pub use state::State;

pub use async_trait::async_trait;
pub use serde_json::Value;
