//! Update Scheduling
//!
//! Everything that moves values through the graph at runtime:
//!
//! - `task`: per-node update task manager (join-or-start, cancellation
//!   checks, preceder fan-out, publishing)
//! - `cascade`: transitive cancellation of followers after a value change
//! - `signal`: cancellation token with a self-triggering deadline
//! - `scan`: the periodic driver producing [`State`](crate::State) snapshots
//!
//! # Concurrency
//!
//! Node computations run as spawned tokio tasks. Locks (ledger, edges,
//! registry, follower signals) guard in-memory mutation only and are never
//! held across an await.

mod cascade;
mod scan;
mod signal;
mod task;

pub use scan::ScanLoop;
pub use task::{TaskStatus, UpdateTaskManager};
