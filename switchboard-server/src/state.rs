//! Application state for the switchboard server.

use std::path::PathBuf;
use std::sync::Arc;

use switchboard_core::config::Config;
use switchboard_core::emitter::ActionEmitter;
use switchboard_core::limiter::AgentLimiter;
use switchboard_core::transport::TransportFactory;

use crate::broadcast::BroadcastHub;
use crate::hub::SessionHub;

/// Shared application state, cloned into each handler.
///
/// The limiter and emitter are the process singletons: every session built
/// by the hub routes through these two instances.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: Arc<AgentLimiter>,
    pub emitter: Arc<ActionEmitter>,
    pub broadcast: Arc<BroadcastHub>,
    pub sessions: Arc<SessionHub>,
}

impl AppState {
    /// Build state with per-session files under the default config
    /// directory.
    pub fn new(config: Config, factory: TransportFactory) -> Self {
        let state_dir = switchboard_core::config::config_dir();
        Self::with_state_dir(config, factory, Some(state_dir))
    }

    /// Build state with an explicit state directory, or fully in memory
    /// with `None`.
    pub fn with_state_dir(
        config: Config,
        factory: TransportFactory,
        state_dir: Option<PathBuf>,
    ) -> Self {
        let config = Arc::new(config);
        let limiter = AgentLimiter::new(config.max_agents);
        let emitter = ActionEmitter::new();
        let broadcast = BroadcastHub::new();
        let sessions = SessionHub::new(
            config.clone(),
            limiter.clone(),
            emitter.clone(),
            broadcast.clone(),
            factory,
            state_dir,
        );
        Self {
            config,
            limiter,
            emitter,
            broadcast,
            sessions,
        }
    }

    /// Reject queued limiter waiters and retire every session.
    pub async fn shutdown(&self) {
        self.limiter.clear_waiters("server stopping");
        self.sessions.retire_all().await;
    }
}
