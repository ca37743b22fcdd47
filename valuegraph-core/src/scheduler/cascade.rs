//! Cancellation Cascade
//!
//! When a node's value changes, everything downstream may have consumed the
//! old value. The cascade walks all transitive followers breadth-first:
//!
//! 1. Start from the changed node's direct followers.
//! 2. For each visited follower, ask it to cancel the signals its own
//!    followers registered with it. A node only ever cancels signals that
//!    were registered with it, so the cascade is relayed hop by hop.
//! 3. Strict followers have their current value nulled immediately
//!    (previous value kept).
//! 4. Queue the follower's followers, skipping nodes already visited.
//!
//! The walk is fire-and-forget: it does not wait for any task to stop.

use std::any::TypeId;
use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::graph::NodeHandle;

/// Relay cancellation to every transitive follower of `origin`.
///
/// Returns the number of followers visited.
pub(crate) fn cancel_followers_transitively(origin: &NodeHandle) -> usize {
    let mut visited: HashSet<TypeId> = HashSet::new();
    let mut queue: VecDeque<NodeHandle> = origin.followers().into_iter().collect();

    while let Some(follower) = queue.pop_front() {
        if !visited.insert(follower.type_id()) {
            continue;
        }

        debug!(
            node = origin.type_name(),
            follower = follower.type_name(),
            "issuing cancel to follower"
        );
        follower.tasks().cancel_followers();

        if follower.is_strict() {
            debug!(node = follower.type_name(), "strict value; nulling");
            follower.ledger().nullify();
        }

        for next in follower.followers() {
            if !visited.contains(&next.type_id()) {
                queue.push_back(next);
            }
        }
    }

    visited.len()
}
