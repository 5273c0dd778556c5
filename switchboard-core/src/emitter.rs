//! Action emitter
//!
//! A publish-subscribe bus connecting tool execution to agent turns. Tools
//! run in ambient contexts that do not know which agent they belong to; they
//! tag emissions with the originating agent, monitor, and request ids, and
//! each agent's bridge filters on its own ids. One shared instance serves
//! the whole process; tests construct fresh ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::actions::OsAction;

/// Origin tags attached to an emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionTags {
    /// Instance id of the agent whose turn produced the action.
    pub agent_id: Option<String>,
    /// Monitor the action belongs to.
    pub monitor_id: Option<String>,
    /// Client request the action answers.
    pub request_id: Option<String>,
}

impl ActionTags {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::default()
        }
    }

    pub fn with_monitor(mut self, monitor_id: impl Into<String>) -> Self {
        self.monitor_id = Some(monitor_id.into());
        self
    }
}

/// An action paired with its origin tags, as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct TaggedAction {
    pub action: OsAction,
    pub tags: ActionTags,
}

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Error from [`ActionEmitter::emit_and_wait`].
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("no feedback for key {0} within the timeout")]
    TimedOut(String),
    #[error("feedback channel closed for key {0}")]
    Closed(String),
}

type Subscriber = Arc<dyn Fn(&TaggedAction) + Send + Sync>;

/// Process-wide action bus.
///
/// Delivery is synchronous: `emit` calls every subscriber once, in
/// registration order, on the emitting task. Subscribers must not block.
pub struct ActionEmitter {
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
    pending_feedback: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl ActionEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            pending_feedback: Mutex::new(HashMap::new()),
        })
    }

    /// Register a subscriber; returns the id to unsubscribe with.
    pub fn subscribe(&self, callback: impl Fn(&TaggedAction) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().retain(|(sid, _)| *sid != id);
    }

    /// Publish an action to every current subscriber.
    pub fn emit(&self, action: OsAction, tags: ActionTags) {
        let delivery = TaggedAction { action, tags };
        // Snapshot so a subscriber can unsubscribe from inside its callback.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&delivery);
        }
    }

    /// Publish an action and wait for a consumer acknowledgment.
    ///
    /// Resolves when some consumer calls [`resolve_feedback`] with the same
    /// key; rejects when `timeout` elapses first. Used for rendering
    /// acknowledgments such as iframe-load success.
    ///
    /// [`resolve_feedback`]: ActionEmitter::resolve_feedback
    pub async fn emit_and_wait(
        &self,
        action: OsAction,
        key: &str,
        timeout: Duration,
    ) -> Result<Value, FeedbackError> {
        let (tx, rx) = oneshot::channel();
        self.pending_feedback.lock().insert(key.to_string(), tx);
        self.emit(action, ActionTags::default());

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(FeedbackError::Closed(key.to_string())),
            Err(_) => {
                self.pending_feedback.lock().remove(key);
                Err(FeedbackError::TimedOut(key.to_string()))
            }
        }
    }

    /// Resolve a pending [`emit_and_wait`]; returns whether a waiter existed.
    ///
    /// [`emit_and_wait`]: ActionEmitter::emit_and_wait
    pub fn resolve_feedback(&self, key: &str, result: Value) -> bool {
        match self.pending_feedback.lock().remove(key) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
