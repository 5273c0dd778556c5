//! Session hub
//!
//! The process-wide index from session id to live session. A session is
//! created on the first reference to an unknown id and retired once it has
//! had no connections for the configured idle period.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;

use switchboard_core::config::Config;
use switchboard_core::emitter::ActionEmitter;
use switchboard_core::limiter::AgentLimiter;
use switchboard_core::pool::{ContextPool, PoolSpec};
use switchboard_core::reload::ReloadCache;
use switchboard_core::transcript::Transcript;
use switchboard_core::transport::{TransportFactory, TransportPool};
use switchboard_core::windows::WindowRegistry;

use crate::broadcast::BroadcastHub;

/// One live session: context pool plus per-session state.
pub struct SessionHandle {
    pub id: String,
    pub pool: Arc<ContextPool>,
    pub windows: Arc<WindowRegistry>,
    pub reload: Arc<ReloadCache>,
    pub transcript: Arc<Transcript>,
    init: OnceCell<()>,
    last_activity: Mutex<Instant>,
}

impl SessionHandle {
    /// Create the default monitor's main agent, exactly once even under
    /// concurrent callers.
    pub async fn ensure_initialized(&self) -> switchboard_core::Result<()> {
        self.init
            .get_or_try_init(|| self.pool.initialize())
            .await
            .map(|_| ())
    }

    /// Record client activity; the idle sweep measures from here.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Process-wide `session id → session` index.
pub struct SessionHub {
    config: Arc<Config>,
    provider: String,
    limiter: Arc<AgentLimiter>,
    emitter: Arc<ActionEmitter>,
    broadcast: Arc<BroadcastHub>,
    factory: TransportFactory,
    /// Root for per-session files; `None` keeps everything in memory.
    state_dir: Option<PathBuf>,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionHub {
    pub fn new(
        config: Arc<Config>,
        limiter: Arc<AgentLimiter>,
        emitter: Arc<ActionEmitter>,
        broadcast: Arc<BroadcastHub>,
        factory: TransportFactory,
        state_dir: Option<PathBuf>,
    ) -> Arc<Self> {
        let provider = config
            .provider
            .clone()
            .unwrap_or_else(|| "claude".to_string());
        Arc::new(Self {
            config,
            provider,
            limiter,
            emitter,
            broadcast,
            factory,
            state_dir,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Look up a session, creating it on first reference.
    ///
    /// Concurrent calls with the same id return the same handle; the heavy
    /// initialization (main-agent creation) happens later in
    /// [`SessionHandle::ensure_initialized`], also exactly once.
    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionHandle> {
        if let Some(handle) = self.sessions.read().get(session_id) {
            handle.touch();
            return handle.clone();
        }

        let mut sessions = self.sessions.write();
        if let Some(handle) = sessions.get(session_id) {
            handle.touch();
            return handle.clone();
        }

        let handle = self.build_session(session_id);
        sessions.insert(session_id.to_string(), handle.clone());
        tracing::info!(session_id, "created session");
        handle
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Tear a session down: cancel its turns, release its slots, drop its
    /// connections. Returns whether the session existed.
    pub async fn retire(&self, session_id: &str) -> bool {
        let handle = self.sessions.write().remove(session_id);
        match handle {
            Some(handle) => {
                handle.pool.cleanup().await;
                self.broadcast.clear(session_id);
                tracing::info!(session_id, "retired session");
                true
            }
            None => false,
        }
    }

    /// Retire every session that has had no connections for the configured
    /// idle period. Returns the retired ids.
    pub async fn sweep_idle(&self) -> Vec<String> {
        let idle_timeout = self.config.session_idle_timeout;
        let candidates: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(id, handle)| {
                self.broadcast.session_connection_count(id) == 0
                    && handle.idle_for() >= idle_timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut retired = Vec::new();
        for id in candidates {
            if self.retire(&id).await {
                retired.push(id);
            }
        }
        retired
    }

    /// Run the idle sweep on an interval until the returned handle is
    /// aborted.
    pub fn spawn_idle_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let retired = hub.sweep_idle().await;
                if !retired.is_empty() {
                    tracing::debug!(count = retired.len(), "idle sweep retired sessions");
                }
            }
        })
    }

    /// Retire everything. Called at shutdown after the limiter queue is
    /// cleared.
    pub async fn retire_all(&self) {
        for session_id in self.session_ids() {
            self.retire(&session_id).await;
        }
    }

    fn build_session(&self, session_id: &str) -> Arc<SessionHandle> {
        let windows = Arc::new(WindowRegistry::new());
        let reload_path = self
            .state_dir
            .as_ref()
            .map(|dir| switchboard_core::config::reload_cache_path_in(dir, session_id));
        let reload = Arc::new(ReloadCache::new(reload_path, &self.config.pool));
        let transcript = Arc::new(match &self.state_dir {
            Some(dir) => Transcript::with_file(
                dir.join("transcripts").join(format!("{}.jsonl", session_id)),
            ),
            None => Transcript::new(),
        });

        let pool = ContextPool::new(PoolSpec {
            session_id: session_id.to_string(),
            provider: self.provider.clone(),
            config: self.config.pool.clone(),
            limiter: self.limiter.clone(),
            emitter: self.emitter.clone(),
            sink: self.broadcast.sink_for(session_id),
            transcript: transcript.clone(),
            windows: windows.clone(),
            reload: reload.clone(),
            transports: Arc::new(TransportPool::new(self.factory.clone())),
        });

        Arc::new(SessionHandle {
            id: session_id.to_string(),
            pool,
            windows,
            reload,
            transcript,
            init: OnceCell::new(),
            last_activity: Mutex::new(Instant::now()),
        })
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
