//! Scan Loop
//!
//! The driver that turns node values into published states. Each tick:
//!
//! 1. Request an update of every enabled node, concurrently.
//! 2. Wait until the first of those updates settles. Slower nodes keep
//!    running in the background and land in a later state.
//! 3. Build a [`State`] from the current ledger contents of enabled nodes.
//! 4. Hand the state to every observer, in registration order.
//! 5. Recycle every node whose update task is not running.
//!
//! Ticks are separated by [`GraphConfig::scan_interval`](crate::GraphConfig).

use std::sync::Arc;

use futures_util::future::select_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GraphError;
use crate::graph::{Graph, NodeCollection};
use crate::scheduler::UpdateTaskManager;
use crate::state::State;

type StateObserver = Arc<dyn Fn(&State) + Send + Sync>;

struct Shared {
    graph: Arc<Graph>,
    observers: RwLock<Vec<StateObserver>>,
}

struct Running {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Periodic driver publishing a [`State`] per tick.
pub struct ScanLoop {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl ScanLoop {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            shared: Arc::new(Shared {
                graph,
                observers: RwLock::new(Vec::new()),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.shared.graph
    }

    /// Register an observer called synchronously with every new state.
    ///
    /// Observers must return quickly. One registered from inside an
    /// observer is called from the next tick on.
    pub fn on_state<F>(&self, observer: F)
    where
        F: Fn(&State) + Send + Sync + 'static,
    {
        self.shared.observers.write().push(Arc::new(observer));
    }

    /// Run a single tick and return the state it published.
    pub async fn scan_once(&self) -> State {
        self.shared.tick().await
    }

    /// Spawn the periodic loop.
    pub fn start(&self) -> Result<(), GraphError> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.join.is_finished()) {
            return Err(GraphError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let shared = self.shared.clone();
        let loop_token = token.clone();
        let join = tokio::spawn(async move { shared.run(loop_token).await });

        *running = Some(Running { token, join });
        debug!("scan loop started");
        Ok(())
    }

    /// Stop the loop and wait for it to exit. No-op if not running.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        running.token.cancel();
        if let Err(err) = running.join.await {
            warn!(error = %err, "scan loop exited abnormally");
        }
        debug!("scan loop stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.join.is_finished())
    }
}

impl Drop for ScanLoop {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

impl Shared {
    async fn run(&self, token: CancellationToken) {
        let interval = self.graph.config().scan_interval_clamped();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = self.tick() => {}
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn tick(&self) -> State {
        let enabled = self.graph.enabled_nodes();
        debug!(count = enabled.len(), "starting update tasks for enabled nodes");

        let updates: Vec<_> = enabled.iter().map(|node| node.update()).collect();
        if !updates.is_empty() {
            let (status, index, _pending) = select_all(updates).await;
            if let Some(first) = enabled.iter().nth(index) {
                debug!(
                    node = first.type_name(),
                    status = status.as_label(),
                    "first update settled"
                );
            }
        }

        let state = build_state(&enabled);
        let observers = self.observers.read().clone();
        for observer in observers {
            observer(&state);
        }

        self.recycle_tasks();
        state
    }

    fn recycle_tasks(&self) {
        for node in self.graph.nodes().iter() {
            UpdateTaskManager::recycle(node);
        }
    }
}

/// Best-effort snapshot of every enabled, named node.
fn build_state(nodes: &NodeCollection) -> State {
    let mut state = State::new();
    for node in nodes.iter().filter(|n| n.is_enabled()) {
        if let Some(name) = node.name() {
            state.insert(name, node.value());
        }
    }
    state
}
