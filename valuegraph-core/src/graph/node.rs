//! Graph Nodes
//!
//! This module defines the node trait implemented by node authors and the
//! shared handle the graph hands out for each registered node.
//!
//! A node is identified by its concrete Rust type: the graph holds at most
//! one node per type, and edges are keyed by type as well. Each node owns
//! its value ledger, its preceder/follower edges and its update task
//! manager.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use super::collection::NodeCollection;
use super::ledger::ValueLedger;
use crate::error::{GraphError, NodeError};
use crate::scheduler::{TaskStatus, UpdateTaskManager};

/// Static per-type publication descriptor.
///
/// - `enabled`: the node's value is published in each [`State`](crate::State)
/// - `name`: the key it is published under; required once a descriptor is declared
/// - `strict`: null the node's value as soon as any ancestor's value changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateProperty {
    pub enabled: bool,
    pub name: Option<&'static str>,
    pub strict: bool,
}

impl StateProperty {
    /// Descriptor with a published name.
    pub const fn new(enabled: bool, name: &'static str) -> Self {
        Self {
            enabled,
            name: Some(name),
            strict: false,
        }
    }

    /// Descriptor without a name. Registration rejects it.
    pub const fn unnamed(enabled: bool) -> Self {
        Self {
            enabled,
            name: None,
            strict: false,
        }
    }

    /// Mark the descriptor strict.
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// A unit of computed value.
///
/// # Example
///
/// ```rust,ignore
/// struct MilkyWay;
///
/// #[async_trait]
/// impl Node for MilkyWay {
///     fn state_property() -> Option<StateProperty> {
///         Some(StateProperty::new(true, "MilkyWay"))
///     }
///
///     async fn determine_value(&self, _ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
///         Ok(Some(json!("a")))
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Publication descriptor, read once at registration. `None` keeps the
    /// node out of the published state.
    fn state_property() -> Option<StateProperty>
    where
        Self: Sized,
    {
        None
    }

    /// Compute this node's value. Preceders are up to date when this runs.
    ///
    /// The returned future is raced against the node's cancellation signal.
    /// Once the signal fires (an upstream change or the update deadline) the
    /// future is dropped at its current `.await`, so anything it holds is
    /// released without running to completion. A result produced after
    /// cancellation is discarded. Must be safe to call repeatedly.
    async fn determine_value(&self, ctx: &NodeContext) -> Result<Option<Value>, NodeError>;
}

type ValueListener = Arc<dyn Fn(&Value) + Send + Sync>;

pub(crate) struct NodeCell {
    type_id: TypeId,
    type_name: &'static str,
    state_property: Option<StateProperty>,
    ledger: ValueLedger,
    preceders: RwLock<NodeCollection>,
    followers: RwLock<NodeCollection>,
    tasks: UpdateTaskManager,
    behavior: Box<dyn Node>,
    listeners: RwLock<Vec<ValueListener>>,
    closed: AtomicBool,
}

/// Shared handle to a registered node.
///
/// Cloning is cheap; clones refer to the same node.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeCell>,
}

impl NodeHandle {
    pub(crate) fn new<N: Node>(
        node: N,
        state_property: Option<StateProperty>,
        update_deadline: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(NodeCell {
                type_id: TypeId::of::<N>(),
                type_name: type_name::<N>(),
                state_property,
                ledger: ValueLedger::new(),
                preceders: RwLock::new(NodeCollection::new()),
                followers: RwLock::new(NodeCollection::new()),
                tasks: UpdateTaskManager::new(update_deadline),
                behavior: Box::new(node),
                listeners: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Concrete type of the node; at most one node per type is registered.
    pub fn type_id(&self) -> TypeId {
        self.inner.type_id
    }

    /// Type name of the node, used in errors and logs.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Publication descriptor read at registration.
    pub fn state_property(&self) -> Option<StateProperty> {
        self.inner.state_property
    }

    /// Published name, if declared.
    pub fn name(&self) -> Option<&'static str> {
        self.inner.state_property.and_then(|p| p.name)
    }

    /// Whether the node's value is published in each state. `false` without a descriptor.
    pub fn is_enabled(&self) -> bool {
        self.inner.state_property.is_some_and(|p| p.enabled)
    }

    /// Whether the value is nulled as soon as an ancestor's value changes.
    pub fn is_strict(&self) -> bool {
        self.inner.state_property.is_some_and(|p| p.strict)
    }

    /// Current value.
    pub fn value(&self) -> Option<Value> {
        self.inner.ledger.current()
    }

    /// Previous value.
    pub fn previous_value(&self) -> Option<Value> {
        self.inner.ledger.previous()
    }

    /// Value `age` entries back (0 = current).
    pub fn value_at(&self, age: usize) -> Option<Value> {
        self.inner.ledger.get(age)
    }

    /// Whether the current value is non-null and differs from the previous one.
    pub fn value_changed(&self) -> bool {
        self.inner.ledger.changed()
    }

    /// Snapshot of this node's preceders.
    pub fn preceders(&self) -> NodeCollection {
        self.inner.preceders.read().clone()
    }

    /// Snapshot of this node's followers.
    pub fn followers(&self) -> NodeCollection {
        self.inner.followers.read().clone()
    }

    /// Whether any node precedes this one.
    pub fn has_preceders(&self) -> bool {
        !self.inner.preceders.read().is_empty()
    }

    /// Whether any node follows this one.
    pub fn has_followers(&self) -> bool {
        !self.inner.followers.read().is_empty()
    }

    /// Declare that this node precedes each of `others`.
    ///
    /// Fails if `others` is empty, names a node that is no longer registered,
    /// names a node of this node's own type, or repeats an existing edge.
    pub fn precedes(&self, others: &[&NodeHandle]) -> Result<(), GraphError> {
        self.validate_relatives("precedes", "precede", others)?;
        for other in others {
            link(self, other)?;
        }
        Ok(())
    }

    /// Declare that this node follows each of `others`. Mirror of [`precedes`](Self::precedes).
    pub fn follows(&self, others: &[&NodeHandle]) -> Result<(), GraphError> {
        self.validate_relatives("follows", "follow", others)?;
        for other in others {
            link(other, self)?;
        }
        Ok(())
    }

    /// Register a callback invoked with the new value whenever a published
    /// value differs from the previous one.
    ///
    /// Listeners run synchronously on the update task. A listener may
    /// register further listeners; those are called from the next change on.
    pub fn on_value_change<F>(&self, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Arc::new(listener));
    }

    /// Request an update of this node. Joins the in-flight computation if
    /// one exists. Resolves to the computation's terminal status.
    pub fn update(&self) -> BoxFuture<'static, TaskStatus> {
        UpdateTaskManager::update(self)
    }

    /// Status of this node's current update task.
    pub fn task_status(&self) -> TaskStatus {
        self.inner.tasks.status()
    }

    pub(crate) fn ledger(&self) -> &ValueLedger {
        &self.inner.ledger
    }

    pub(crate) fn tasks(&self) -> &UpdateTaskManager {
        &self.inner.tasks
    }

    pub(crate) fn behavior(&self) -> &dyn Node {
        self.inner.behavior.as_ref()
    }

    pub(crate) fn notify_value_change(&self, value: &Value) {
        let listeners = self.inner.listeners.read().clone();
        for listener in listeners {
            listener(value);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Tear down the node: stop its tasks and drop its edges, which breaks
    /// the `Arc` cycles between preceders and followers.
    pub(crate) fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.tasks.close();
        self.inner.preceders.write().clear();
        self.inner.followers.write().clear();
        self.inner.listeners.write().clear();
        debug!(node = self.type_name(), "closed");
    }

    fn validate_relatives(
        &self,
        call: &'static str,
        relation: &'static str,
        others: &[&NodeHandle],
    ) -> Result<(), GraphError> {
        if others.is_empty() {
            return Err(GraphError::InvalidArgument {
                call,
                reason: "no nodes given".to_string(),
            });
        }

        for node in std::iter::once(self).chain(others.iter().copied()) {
            if node.is_closed() {
                return Err(GraphError::InvalidArgument {
                    call,
                    reason: format!("{} is no longer registered", node.type_name()),
                });
            }
        }

        if let Some(other) = others.iter().find(|o| o.type_id() == self.type_id()) {
            return Err(GraphError::SelfRelationship {
                relation,
                node: other.type_name(),
            });
        }

        Ok(())
    }
}

/// Add the edge `preceder -> follower`.
///
/// A follower list is always locked before a preceder list so concurrent
/// declarations cannot deadlock.
fn link(preceder: &NodeHandle, follower: &NodeHandle) -> Result<(), GraphError> {
    {
        let mut followers = preceder.inner.followers.write();
        let mut preceders = follower.inner.preceders.write();

        if followers.contains_id(follower.type_id()) || preceders.contains_id(preceder.type_id()) {
            return Err(GraphError::DuplicateRelationship {
                preceder: preceder.type_name(),
                follower: follower.type_name(),
            });
        }

        followers.insert(follower.clone());
        preceders.insert(preceder.clone());
    }

    debug!(
        preceder = preceder.type_name(),
        follower = follower.type_name(),
        "edge declared"
    );

    preceder.tasks().register_follower(preceder, follower)
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for NodeHandle {}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("type", &self.type_name())
            .field("value", &self.value())
            .field("status", &self.task_status())
            .finish()
    }
}

/// Context handed to [`Node::determine_value`].
pub struct NodeContext {
    node: NodeHandle,
}

impl NodeContext {
    pub(crate) fn new(node: NodeHandle) -> Self {
        Self { node }
    }

    /// The node being computed.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    /// The preceder of concrete type `T`, if connected.
    pub fn preceder<T: Node>(&self) -> Option<NodeHandle> {
        self.node.preceders().get::<T>().cloned()
    }

    /// Current value of the preceder of type `T`.
    pub fn preceder_value<T: Node>(&self) -> Result<Option<Value>, NodeError> {
        self.preceder::<T>()
            .map(|p| p.value())
            .ok_or(NodeError::MissingPreceder {
                node: type_name::<T>(),
            })
    }

    /// All preceders of the node being computed.
    pub fn preceders(&self) -> NodeCollection {
        self.node.preceders()
    }
}
