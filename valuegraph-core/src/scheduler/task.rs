//! Update Task Manager
//!
//! One manager per node. It owns the node's in-flight computation, the
//! node's cancellation signal and the signals its followers registered
//! with it.
//!
//! # Update cycle
//!
//! ```text
//! update() ─► in flight? ── yes ─► join the same computation
//!                │
//!                no
//!                ▼
//!         spawn computation:
//!           start deadline
//!           cancelled? ──────────────────────► null value, Canceled
//!           update all preceders (concurrently)
//!           cancelled? / preceder faulted? ──► null value / Faulted
//!           determine_value()
//!           cancelled? ──────────────────────► null value, Canceled
//!           publish value; cascade if changed
//!           Completed
//! ```
//!
//! Awaits on preceders and on the node's own computation race the
//! cancellation token, so a computation that never returns is abandoned
//! once the deadline fires.
//!
//! The computation handle stays in place after it settles, so repeated
//! `update()` calls within a tick resolve to the same result. The scan
//! loop recycles settled handles between ticks via [`UpdateTaskManager::recycle`].

use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument};

use super::cascade::cancel_followers_transitively;
use super::signal::CancelSignal;
use crate::error::{GraphError, NodeError};
use crate::graph::{NodeContext, NodeHandle};

/// Lifecycle status of a node's update task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// No computation has been started since the last recycle.
    NotStarted,
    /// A computation is in flight.
    Running,
    /// The computation published a value.
    Completed,
    /// The computation observed cancellation and nulled the value.
    Canceled,
    /// The computation, or one of its preceders, failed.
    Faulted,
}

impl TaskStatus {
    /// Completed, cancelled or faulted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Canceled | TaskStatus::Faulted
        )
    }

    /// Anything but running. The scan loop recycles these between ticks.
    pub fn is_recyclable(self) -> bool {
        self != TaskStatus::Running
    }

    pub fn as_label(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Faulted => "faulted",
        }
    }
}

/// A spawned computation and the channel its status is published on.
struct InFlight {
    status: watch::Receiver<TaskStatus>,
    join: JoinHandle<()>,
}

impl InFlight {
    fn spawn(node: NodeHandle) -> Self {
        let (tx, rx) = watch::channel(TaskStatus::Running);

        let task = async move {
            let status = match AssertUnwindSafe(manage_value_update(&node))
                .catch_unwind()
                .await
            {
                Ok(status) => status,
                Err(_) => {
                    let err = NodeError::Panicked {
                        node: node.type_name(),
                    };
                    error!(node = node.type_name(), label = err.as_label(), "{err}");
                    TaskStatus::Faulted
                }
            };
            debug!(node = node.type_name(), status = status.as_label(), "update task settled");
            tx.send_replace(status);
        };
        // log under whichever span requested the update
        let join = tokio::spawn(task.in_current_span());

        Self { status: rx, join }
    }

    fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }
}

/// Per-node owner of the in-flight computation and cancellation state.
pub struct UpdateTaskManager {
    update_deadline: Duration,
    in_flight: Mutex<Option<InFlight>>,
    signal: Mutex<CancelSignal>,
    follower_signals: DashMap<TypeId, CancellationToken>,
}

impl UpdateTaskManager {
    pub(crate) fn new(update_deadline: Duration) -> Self {
        Self {
            update_deadline,
            in_flight: Mutex::new(None),
            signal: Mutex::new(CancelSignal::new()),
            follower_signals: DashMap::new(),
        }
    }

    /// Join the node's in-flight computation, starting one if none exists.
    pub(crate) fn update(node: &NodeHandle) -> BoxFuture<'static, TaskStatus> {
        let mut status = {
            let mut slot = node.tasks().in_flight.lock();
            match slot.as_ref() {
                Some(flight) => {
                    if flight.status() == TaskStatus::Running {
                        debug!(node = node.type_name(), "update already running; joining");
                    }
                    flight.status.clone()
                }
                None => {
                    let flight = InFlight::spawn(node.clone());
                    let status = flight.status.clone();
                    *slot = Some(flight);
                    status
                }
            }
        };

        async move {
            let settled = status.wait_for(|s| s.is_terminal()).await.map(|s| *s);
            // sender dropped without settling: the task was aborted by close()
            settled.unwrap_or(TaskStatus::Canceled)
        }
        .boxed()
    }

    /// Current task status.
    pub(crate) fn status(&self) -> TaskStatus {
        self.in_flight
            .lock()
            .as_ref()
            .map_or(TaskStatus::NotStarted, InFlight::status)
    }

    /// Fresh cancellation token, registered with every preceder.
    ///
    /// Leaves the signal alone while a computation is running: that
    /// computation keeps watching the token it started with.
    pub(crate) fn arm(node: &NodeHandle) {
        let slot = node.tasks().in_flight.lock();
        if slot.as_ref().is_some_and(|flight| flight.status() == TaskStatus::Running) {
            debug!(node = node.type_name(), "update running; keeping its signal");
            return;
        }
        Self::rearm_signal(node);
    }

    /// Clear a settled (or never started) task and re-arm the signal.
    ///
    /// Returns `false` and leaves everything untouched while a computation
    /// is still running.
    pub(crate) fn recycle(node: &NodeHandle) -> bool {
        // held until the signal is re-armed so no update can start in between
        let mut slot = node.tasks().in_flight.lock();
        let status = slot.as_ref().map_or(TaskStatus::NotStarted, InFlight::status);
        if !status.is_recyclable() {
            return false;
        }
        *slot = None;

        debug!(
            node = node.type_name(),
            status = status.as_label(),
            "resetting update task"
        );
        Self::rearm_signal(node);
        true
    }

    /// Lock order: `in_flight`, then `signal`, then the preceders' registries.
    fn rearm_signal(node: &NodeHandle) {
        let token = node.tasks().signal.lock().rearm();

        for preceder in node.preceders().iter() {
            if let Err(err) = preceder.tasks().insert_follower_signal(preceder, node, token.clone()) {
                error!(node = node.type_name(), label = err.as_label(), "{err}");
            }
        }

        debug!(node = node.type_name(), "cancellation signal armed");
    }

    /// Register `follower`'s current signal with `owner`, which must be this
    /// manager's node. Called when an edge is declared.
    pub(crate) fn register_follower(
        &self,
        owner: &NodeHandle,
        follower: &NodeHandle,
    ) -> Result<(), GraphError> {
        let token = follower.tasks().signal.lock().token();
        self.insert_follower_signal(owner, follower, token)
    }

    fn insert_follower_signal(
        &self,
        owner: &NodeHandle,
        follower: &NodeHandle,
        token: CancellationToken,
    ) -> Result<(), GraphError> {
        if !owner.followers().contains_id(follower.type_id()) {
            return Err(GraphError::NotAFollower {
                node: owner.type_name(),
                follower: follower.type_name(),
            });
        }
        self.follower_signals.insert(follower.type_id(), token);
        Ok(())
    }

    /// Cancel every signal registered with this node by its followers.
    pub(crate) fn cancel_followers(&self) {
        for entry in self.follower_signals.iter() {
            entry.value().cancel();
        }
    }

    /// Number of follower signals currently registered.
    pub(crate) fn follower_signal_count(&self) -> usize {
        self.follower_signals.len()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.signal.lock().is_cancelled()
    }

    /// Abort the in-flight computation, cancel the signal and forget all
    /// follower signals.
    pub(crate) fn close(&self) {
        if let Some(flight) = self.in_flight.lock().take() {
            flight.join.abort();
        }
        self.signal.lock().close();
        self.follower_signals.clear();
    }

    fn start_deadline(&self, node: &'static str) -> CancellationToken {
        self.signal.lock().start_deadline(node, self.update_deadline)
    }
}

/// One full update of `node`. Never panics out; failures map to `Faulted`.
async fn manage_value_update(node: &NodeHandle) -> TaskStatus {
    let name = node.type_name();
    debug!(node = name, "running update task");

    let token = node.tasks().start_deadline(name);

    if nullify_if_cancelled(node, &token) {
        return TaskStatus::Canceled;
    }

    let preceders: Vec<NodeHandle> = node.preceders().into_iter().collect();
    let fan_out = join_all(preceders.iter().map(|preceder| {
        debug!(node = name, preceder = preceder.type_name(), "requesting update from preceder");
        preceder.update()
    }));

    let statuses = tokio::select! {
        biased;
        _ = token.cancelled() => {
            nullify(node);
            return TaskStatus::Canceled;
        }
        statuses = fan_out => statuses,
    };

    let mut preceder_failed = false;
    for (preceder, status) in preceders.iter().zip(statuses) {
        if status == TaskStatus::Faulted {
            error!(node = name, preceder = preceder.type_name(), "preceder update failed");
            preceder_failed = true;
        }
    }
    if preceder_failed {
        return TaskStatus::Faulted;
    }

    if nullify_if_cancelled(node, &token) {
        return TaskStatus::Canceled;
    }

    let ctx = NodeContext::new(node.clone());
    let result = tokio::select! {
        biased;
        _ = token.cancelled() => {
            nullify(node);
            return TaskStatus::Canceled;
        }
        result = node.behavior().determine_value(&ctx) => result,
    };

    let value = match result {
        Ok(value) => value,
        Err(err) => {
            error!(node = name, label = err.as_label(), "{err}");
            return TaskStatus::Faulted;
        }
    };

    if nullify_if_cancelled(node, &token) {
        return TaskStatus::Canceled;
    }

    publish(node, value);
    TaskStatus::Completed
}

/// Write the value and cascade cancellation if it changed.
fn publish(node: &NodeHandle, value: Option<Value>) {
    let ledger = node.ledger();
    ledger.set(value);

    if !ledger.changed() {
        debug!(
            node = node.type_name(),
            previous = ?ledger.previous(),
            current = ?ledger.current(),
            "value was same"
        );
        return;
    }

    debug!(
        node = node.type_name(),
        previous = ?ledger.previous(),
        current = ?ledger.current(),
        "value changed"
    );

    if let Some(current) = ledger.current() {
        node.notify_value_change(&current);
    }
    cancel_followers_transitively(node);
}

fn nullify_if_cancelled(node: &NodeHandle, token: &CancellationToken) -> bool {
    if !token.is_cancelled() {
        return false;
    }
    nullify(node);
    true
}

fn nullify(node: &NodeHandle) {
    debug!(node = node.type_name(), "cancellation requested; nulling value");
    if node.ledger().nullify() {
        debug!(node = node.type_name(), previous = ?node.previous_value(), "value nulled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, StateProperty};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct Counter {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Node for Counter {
        async fn determine_value(&self, _ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Some(json!(n)))
        }
    }

    struct Failing;

    #[async_trait]
    impl Node for Failing {
        async fn determine_value(&self, _ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
            Err(NodeError::failed("boom"))
        }
    }

    struct Downstream;

    #[async_trait]
    impl Node for Downstream {
        fn state_property() -> Option<StateProperty> {
            Some(StateProperty::new(true, "Downstream"))
        }

        async fn determine_value(&self, _ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
            Ok(Some(json!("down")))
        }
    }

    struct Meltdown;

    #[async_trait]
    impl Node for Meltdown {
        async fn determine_value(&self, _ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
            Err(NodeError::failed("core breach"))
        }
    }

    /// Never returns.
    struct Hung;

    #[async_trait]
    impl Node for Hung {
        async fn determine_value(&self, _ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
            std::future::pending::<()>().await;
            Ok(None)
        }
    }

    struct Panicking;

    #[async_trait]
    impl Node for Panicking {
        async fn determine_value(&self, _ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
            panic!("computation blew up")
        }
    }

    fn handle<N: Node>(node: N) -> NodeHandle {
        NodeHandle::new(node, N::state_property(), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn concurrent_callers_join_one_computation() {
        let runs = Arc::new(AtomicUsize::new(0));
        let node = handle(Counter { runs: runs.clone() });

        let (a, b) = tokio::join!(node.update(), node.update());
        assert_eq!(a, TaskStatus::Completed);
        assert_eq!(b, TaskStatus::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // settled handles are kept until recycled
        assert_eq!(node.update().await, TaskStatus::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(UpdateTaskManager::recycle(&node));
        assert_eq!(node.task_status(), TaskStatus::NotStarted);
        assert_eq!(node.update().await, TaskStatus::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(node.value(), Some(json!(1)));
        assert_eq!(node.previous_value(), Some(json!(0)));
    }

    #[tokio::test]
    async fn cancelled_signal_nulls_without_computing() {
        let runs = Arc::new(AtomicUsize::new(0));
        let node = handle(Counter { runs: runs.clone() });
        node.ledger().set(Some(json!("stale")));
        node.tasks().signal.lock().close();

        assert_eq!(node.update().await, TaskStatus::Canceled);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(node.value(), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn computation_error_faults_and_keeps_value() {
        let node = handle(Failing);
        node.ledger().set(Some(json!("kept")));

        assert_eq!(node.update().await, TaskStatus::Faulted);
        assert_eq!(node.value(), Some(json!("kept")));
        assert!(logs_contain("computation failed: boom"));
    }

    #[tokio::test]
    async fn faulted_preceder_faults_follower() {
        let failing = handle(Failing);
        let down = handle(Downstream);
        failing.precedes(&[&down]).unwrap();

        assert_eq!(down.update().await, TaskStatus::Faulted);
        assert_eq!(down.value(), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn each_faulted_preceder_is_logged() {
        let failing = handle(Failing);
        let meltdown = handle(Meltdown);
        let down = handle(Downstream);
        down.follows(&[&failing, &meltdown]).unwrap();

        assert_eq!(down.update().await, TaskStatus::Faulted);
        assert_eq!(down.value(), None);

        logs_assert(|lines: &[&str]| {
            let failed: Vec<_> = lines
                .iter()
                .filter(|line| line.contains("preceder update failed"))
                .collect();
            if failed.len() != 2 {
                return Err(format!("expected 2 preceder failures, got {}", failed.len()));
            }
            for preceder in ["Failing", "Meltdown"] {
                if !failed.iter().any(|line| line.contains(preceder)) {
                    return Err(format!("no failure logged for {preceder}"));
                }
            }
            Ok(())
        });
    }

    #[tokio::test(start_paused = true)]
    async fn arm_keeps_the_signal_of_a_running_update() {
        let up = handle(Counter {
            runs: Arc::new(AtomicUsize::new(0)),
        });
        let hung = NodeHandle::new(Hung, None, Duration::from_secs(1));
        up.precedes(&[&hung]).unwrap();

        let pending = hung.update();
        tokio::task::yield_now().await;
        assert_eq!(hung.task_status(), TaskStatus::Running);

        UpdateTaskManager::arm(&hung);
        assert!(!UpdateTaskManager::recycle(&hung));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(pending.await, TaskStatus::Canceled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn update_racing_recycle_stays_reachable_by_preceder() {
        let up = handle(Counter {
            runs: Arc::new(AtomicUsize::new(0)),
        });
        let hung = NodeHandle::new(Hung, None, Duration::from_secs(600));
        up.precedes(&[&hung]).unwrap();

        for _ in 0..100 {
            let recycler = {
                let hung = hung.clone();
                tokio::spawn(async move { UpdateTaskManager::recycle(&hung) })
            };
            let updater = {
                let hung = hung.clone();
                tokio::spawn(async move { hung.update().await })
            };

            recycler.await.unwrap();
            // whichever computation is in flight watches the token the preceder holds
            up.tasks().cancel_followers();

            let status = tokio::time::timeout(Duration::from_secs(5), updater)
                .await
                .expect("update unreachable by its preceder")
                .unwrap();
            assert_ne!(status, TaskStatus::Completed);
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn panic_is_reported_as_faulted() {
        let node = handle(Panicking);
        assert_eq!(node.update().await, TaskStatus::Faulted);
        assert!(logs_contain("panicked"));
    }

    #[tokio::test]
    async fn edge_registers_follower_signal() {
        let runs = Arc::new(AtomicUsize::new(0));
        let up = handle(Counter { runs });
        let down = handle(Downstream);
        up.precedes(&[&down]).unwrap();

        assert_eq!(up.tasks().follower_signal_count(), 1);
        up.tasks().cancel_followers();
        assert!(down.tasks().is_cancelled());

        // re-arming hands the preceder a fresh, uncancelled signal
        UpdateTaskManager::arm(&down);
        assert!(!down.tasks().is_cancelled());
        assert_eq!(up.tasks().follower_signal_count(), 1);
    }

    #[test]
    fn status_predicates() {
        assert!(TaskStatus::NotStarted.is_recyclable());
        assert!(!TaskStatus::NotStarted.is_terminal());
        assert!(!TaskStatus::Running.is_recyclable());
        assert!(TaskStatus::Faulted.is_terminal());
        assert_eq!(TaskStatus::Canceled.as_label(), "canceled");
    }
}
