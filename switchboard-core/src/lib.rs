//! # Switchboard
//!
//! A session broker for streaming AI agents behind a desktop UI.
//!
//! Switchboard multiplexes many client sessions onto a bounded population
//! of agent instances, each a live conversation with a model provider, and
//! translates provider token/tool-call streams into the OS-action protocol
//! the UI applies to its state.
//!
//! ## Architecture
//!
//! - [`limiter::AgentLimiter`] - a process-wide counted semaphore with FIFO
//!   waiters bounding the number of live agents.
//! - [`transport::ProviderTransport`] - the trait adapting a streaming
//!   model API into a uniform message iterator, with interrupt and
//!   fork/resume support.
//! - [`emitter::ActionEmitter`] - the process-wide bus tool invocations
//!   publish OS actions on, tagged with their originating agent.
//! - [`windows::WindowRegistry`] - the per-session authoritative window
//!   state, mutated only by applying actions in emission order.
//! - [`reload::ReloadCache`] - fingerprint-indexed recordings of prior
//!   action sequences, offered to the model for replay on similar requests.
//! - [`agent::AgentSession`] - one agent instance; runs turns end to end
//!   and bridges tool actions to outbound server events.
//! - [`pool::ContextPool`] - the per-session orchestrator of main, task,
//!   and window agents with per-monitor FIFO queues.
//!
//! ## Running a turn
//!
//! ```ignore
//! use switchboard_core::agent::TurnOptions;
//!
//! let outcome = pool.route_message("monitor-0", "open my notes", Vec::new()).await?;
//! println!("{} actions, {}", outcome.actions.len(), outcome.summary());
//! ```
//!
//! ## Feature Flags
//!
//! - `test-utils` - Mock transport and event recorder for tests

pub mod actions;
pub mod agent;
pub mod config;
pub mod emitter;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod limiter;
pub mod pool;
pub mod reload;
pub mod transcript;
pub mod transport;
pub mod windows;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use actions::{Bounds, ContentOp, ContentOpKind, OsAction, PermissionOptions, WindowContent};
pub use agent::{
    AgentError, AgentSession, AgentSpec, MessageSource, SlotPolicy, TurnOptions, TurnOutcome,
    TurnStatus,
};
pub use config::{Config, PoolConfig};
pub use emitter::{ActionEmitter, ActionTags, SubscriptionId, TaggedAction};
pub use error::{Error, Result};
pub use events::{
    ClientMessage, ConnectionState, EventSink, ImageAttachment, ServerEvent, ToolStatus,
    WindowAgentState,
};
pub use fingerprint::Fingerprint;
pub use limiter::{AcquireError, AgentLimiter, LimiterStats, SlotPermit, DEFAULT_AGENT_LIMIT};
pub use pool::{
    ContextPool, PoolSpec, TaskProfile, TaskReport, TaskRequest, TaskStatus, DEFAULT_MONITOR,
};
pub use reload::{CacheEntry, ReloadCache, ReloadMatch};
pub use transcript::{Transcript, TranscriptEntry, TranscriptKind};
pub use transport::{
    MessageStream, ProviderTransport, QueryOptions, StreamMessage, TransportError, TransportFactory,
    TransportPool,
};
pub use windows::{StateError, WindowRecord, WindowRegistry};
