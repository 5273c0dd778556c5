//! Agent sessions
//!
//! An [`AgentSession`] is one live conversation with a model provider: it
//! owns a transport, carries a current role label, and runs turns end to
//! end, bridging tool-emitted actions to outbound server events. Instances
//! are classified by role: `main` (one per monitor), `task-<nonce>`
//! (short-lived, forked from a main agent), and `window-<id>` (bound to a
//! window).

mod bridge;
mod turn;
mod types;

pub use types::{
    AgentError, MessageSource, SlotPolicy, TurnOptions, TurnOutcome, TurnStatus,
};

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::emitter::ActionEmitter;
use crate::events::EventSink;
use crate::limiter::{AgentLimiter, SlotPermit};
use crate::transcript::Transcript;
use crate::transport::ProviderTransport;

/// Everything needed to construct an [`AgentSession`].
pub struct AgentSpec {
    pub session_id: String,
    pub monitor_id: Option<String>,
    pub role: String,
    pub transport: Arc<dyn ProviderTransport>,
    pub limiter: Arc<AgentLimiter>,
    pub emitter: Arc<ActionEmitter>,
    pub sink: Arc<dyn EventSink>,
    pub transcript: Arc<Transcript>,
}

/// A single long-lived agent instance.
pub struct AgentSession {
    id: String,
    session_id: String,
    monitor_id: Option<String>,
    role: RwLock<String>,
    pub(crate) transport: Arc<dyn ProviderTransport>,
    pub(crate) limiter: Arc<AgentLimiter>,
    pub(crate) emitter: Arc<ActionEmitter>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) transcript: Arc<Transcript>,
    provider_session_id: RwLock<Option<String>>,
    held_slot: Mutex<Option<SlotPermit>>,
    cancel: Mutex<CancellationToken>,
}

impl AgentSession {
    pub fn new(spec: AgentSpec) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: spec.session_id,
            monitor_id: spec.monitor_id,
            role: RwLock::new(spec.role),
            transport: spec.transport,
            limiter: spec.limiter,
            emitter: spec.emitter,
            sink: spec.sink,
            transcript: spec.transcript,
            provider_session_id: RwLock::new(None),
            held_slot: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Stable instance id, used for emitter filtering.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn monitor_id(&self) -> Option<&str> {
        self.monitor_id.as_deref()
    }

    /// Role label for the current turn (`main`, `task-…`, `window-…`).
    pub fn current_role(&self) -> String {
        self.role.read().clone()
    }

    /// The provider thread id, once learned from a stream.
    pub fn provider_session_id(&self) -> Option<String> {
        self.provider_session_id.read().clone()
    }

    /// Canonical name the provider thread id is persisted under.
    pub fn canonical_thread_name(&self) -> String {
        format!("{}:{}", self.session_id, self.current_role())
    }

    pub fn provider_name(&self) -> &str {
        self.transport.provider_name()
    }

    /// Attach a pre-acquired limiter slot (main agents hold one for life).
    pub fn hold_permit(&self, permit: SlotPermit) {
        *self.held_slot.lock() = Some(permit);
    }

    pub fn holds_slot(&self) -> bool {
        self.held_slot.lock().is_some()
    }

    /// Cancel the in-flight turn, if any. Safe to call from any task.
    pub fn interrupt(&self) {
        self.cancel.lock().cancel();
        self.transport.interrupt();
    }

    /// Tear the instance down: interrupt, dispose the transport, and return
    /// the limiter slot. Idempotent.
    pub async fn dispose(&self) {
        self.interrupt();
        self.transport.dispose().await;
        if let Some(permit) = self.held_slot.lock().take() {
            permit.release();
        }
    }

    pub(crate) fn set_role(&self, role: &str) {
        *self.role.write() = role.to_string();
    }

    pub(crate) fn set_provider_session_id(&self, thread_id: &str) {
        let mut guard = self.provider_session_id.write();
        if guard.as_deref() != Some(thread_id) {
            tracing::debug!(
                name = %self.canonical_thread_name(),
                thread_id,
                "bound provider thread"
            );
            *guard = Some(thread_id.to_string());
        }
    }

    /// Take from the held slot only when this turn acquired it.
    pub(crate) fn take_slot(&self) -> Option<SlotPermit> {
        self.held_slot.lock().take()
    }

    pub(crate) fn store_slot(&self, permit: SlotPermit) {
        *self.held_slot.lock() = Some(permit);
    }

    /// Install a fresh cancellation token for a new turn.
    pub(crate) fn fresh_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        token
    }
}
