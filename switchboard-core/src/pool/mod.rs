//! Context pool
//!
//! The per-session orchestrator: one main agent per monitor, a FIFO work
//! queue per monitor (turns on the same monitor serialize; distinct
//! monitors run in parallel), forked task agents, window-scoped agents,
//! and the reload-cache fast path for repeated requests.

mod dispatch;

pub use dispatch::{TaskProfile, TaskReport, TaskRequest, TaskStatus};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::agent::{AgentSession, AgentSpec, TurnOptions, TurnOutcome, TurnStatus};
use crate::config::PoolConfig;
use crate::emitter::{ActionEmitter, SubscriptionId};
use crate::error::{Error, Result};
use crate::events::{EventSink, ImageAttachment, ServerEvent, WindowAgentState};
use crate::fingerprint::Fingerprint;
use crate::limiter::AgentLimiter;
use crate::reload::{ReloadCache, ReloadMatch};
use crate::transcript::Transcript;
use crate::transport::TransportPool;
use crate::windows::WindowRegistry;

/// Monitor created by [`ContextPool::initialize`].
pub const DEFAULT_MONITOR: &str = "monitor-0";

/// How many reload candidates an annotation lists.
const RELOAD_MATCH_LIMIT: usize = 3;

#[derive(Clone)]
struct MonitorLane {
    agent: Arc<AgentSession>,
    /// Fair queue: turns on this monitor run strictly in arrival order.
    queue: Arc<tokio::sync::Mutex<()>>,
}

/// Everything a [`ContextPool`] is built from.
pub struct PoolSpec {
    pub session_id: String,
    /// Provider identity used when checking transports out of the pool.
    pub provider: String,
    pub config: PoolConfig,
    pub limiter: Arc<AgentLimiter>,
    pub emitter: Arc<ActionEmitter>,
    pub sink: Arc<dyn EventSink>,
    pub transcript: Arc<Transcript>,
    pub windows: Arc<WindowRegistry>,
    pub reload: Arc<ReloadCache>,
    pub transports: Arc<TransportPool>,
}

/// Per-session orchestrator of agents, queues, and the reload fast path.
pub struct ContextPool {
    pub(crate) session_id: String,
    pub(crate) provider: String,
    config: PoolConfig,
    pub(crate) limiter: Arc<AgentLimiter>,
    pub(crate) emitter: Arc<ActionEmitter>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) transcript: Arc<Transcript>,
    windows: Arc<WindowRegistry>,
    reload: Arc<ReloadCache>,
    pub(crate) transports: Arc<TransportPool>,
    monitors: RwLock<HashMap<String, MonitorLane>>,
    window_agents: Mutex<HashMap<String, Arc<AgentSession>>>,
    /// Instance ids of every live agent in this session; the registry
    /// subscription filters emissions through it.
    agent_ids: Arc<RwLock<HashSet<String>>>,
    registry_subscription: SubscriptionId,
}

impl ContextPool {
    pub fn new(spec: PoolSpec) -> Arc<Self> {
        // Window-state invalidation: closing a window drops every cache
        // entry that requires it.
        let reload_for_close = spec.reload.clone();
        spec.windows.on_close(move |window_id| {
            let reload = reload_for_close.clone();
            let window_id = window_id.to_string();
            tokio::spawn(async move {
                reload.invalidate_window(&window_id).await;
            });
        });

        // The registry applies every action emitted by this session's
        // agents, in emission order.
        let agent_ids: Arc<RwLock<HashSet<String>>> = Arc::new(RwLock::new(HashSet::new()));
        let ids_for_apply = agent_ids.clone();
        let windows_for_apply = spec.windows.clone();
        let registry_subscription = spec.emitter.subscribe(move |tagged| {
            let Some(agent_id) = &tagged.tags.agent_id else {
                return;
            };
            if !ids_for_apply.read().contains(agent_id) {
                return;
            }
            if let Err(error) = windows_for_apply.apply(&tagged.action) {
                tracing::warn!(%error, "window mutation rejected");
            }
        });

        Arc::new(Self {
            session_id: spec.session_id,
            provider: spec.provider,
            config: spec.config,
            limiter: spec.limiter,
            emitter: spec.emitter,
            sink: spec.sink,
            transcript: spec.transcript,
            windows: spec.windows,
            reload: spec.reload,
            transports: spec.transports,
            monitors: RwLock::new(HashMap::new()),
            window_agents: Mutex::new(HashMap::new()),
            agent_ids,
            registry_subscription,
        })
    }

    /// Create the default monitor's main agent.
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_monitor_agent(DEFAULT_MONITOR).await?;
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn windows(&self) -> &Arc<WindowRegistry> {
        &self.windows
    }

    pub fn reload_cache(&self) -> &Arc<ReloadCache> {
        &self.reload
    }

    pub fn has_main_agent(&self, monitor_id: &str) -> bool {
        self.monitors.read().contains_key(monitor_id)
    }

    pub fn main_agent(&self, monitor_id: &str) -> Option<Arc<AgentSession>> {
        self.monitors.read().get(monitor_id).map(|l| l.agent.clone())
    }

    pub fn monitor_ids(&self) -> Vec<String> {
        self.monitors.read().keys().cloned().collect()
    }

    /// Create a monitor's main agent, waiting FIFO for a limiter slot.
    pub async fn create_monitor_agent(&self, monitor_id: &str) -> Result<()> {
        self.ensure_monitor_agent(monitor_id).await?;
        Ok(())
    }

    /// Remove a monitor and dispose its main agent. Returns whether the
    /// monitor existed.
    pub async fn remove_monitor_agent(&self, monitor_id: &str) -> bool {
        let lane = self.monitors.write().remove(monitor_id);
        match lane {
            Some(lane) => {
                self.unregister_agent(&lane.agent);
                lane.agent.dispose().await;
                true
            }
            None => false,
        }
    }

    /// Route a user prompt onto a monitor's main agent.
    ///
    /// Computes a fingerprint for the request, offers close-enough reload
    /// candidates to the model via a `<reload_options>` annotation, and
    /// records the turn's actions as a new cache entry when it produced
    /// any.
    pub async fn route_message(
        &self,
        monitor_id: &str,
        prompt: &str,
        images: Vec<ImageAttachment>,
    ) -> Result<TurnOutcome> {
        let agent = self.ensure_monitor_agent(monitor_id).await?;

        let lookup = Fingerprint::compute(prompt, &self.windows.snapshot());
        let mut matches = self.reload.find_matches(&lookup, RELOAD_MATCH_LIMIT).await;
        matches.retain(|m| {
            m.required_window_ids
                .iter()
                .all(|id| self.windows.is_open(id))
        });
        let annotated = match matches.first() {
            Some(best) if best.score >= self.config.reload_suggest_threshold => {
                Some(annotate_with_reload_options(prompt, &matches))
            }
            _ => None,
        };

        let queue = self
            .monitors
            .read()
            .get(monitor_id)
            .map(|l| l.queue.clone())
            .ok_or_else(|| Error::State(format!("monitor removed: {}", monitor_id)))?;

        let outcome = {
            // Held for the whole turn; released on every path including
            // panics, so a crashed turn cannot wedge the queue.
            let _in_line = queue.lock().await;
            let mut options = TurnOptions::main(monitor_id);
            options.images = images;
            agent
                .handle_message(annotated.as_deref().unwrap_or(prompt), options)
                .await
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                let error = Error::from(error);
                if error.is_user_visible() {
                    self.sink.send(ServerEvent::error(error.to_string()));
                }
                return Err(error);
            }
        };

        if outcome.status == TurnStatus::Completed && !outcome.actions.is_empty() {
            self.record_reload_entry(prompt, &outcome).await;
        }
        Ok(outcome)
    }

    /// Route a prompt to a window-scoped agent.
    pub async fn route_window_message(
        &self,
        window_id: &str,
        prompt: &str,
    ) -> Result<TurnOutcome> {
        let agent = self
            .window_agents
            .lock()
            .get(window_id)
            .cloned()
            .ok_or_else(|| Error::State(format!("no agent assigned to window {}", window_id)))?;
        let role = agent.current_role();

        self.sink.send(ServerEvent::WindowAgentStatus {
            window_id: window_id.to_string(),
            agent_id: role.clone(),
            status: WindowAgentState::Active,
        });

        let options = TurnOptions {
            role,
            monitor_id: None,
            ..TurnOptions::main(DEFAULT_MONITOR)
        };
        agent
            .handle_message(prompt, options)
            .await
            .map_err(Error::from)
    }

    /// Bind a dedicated agent to a window. Consumes its own limiter slot.
    pub async fn assign_window_agent(&self, window_id: &str) -> Result<()> {
        if !self.windows.is_open(window_id) {
            return Err(Error::State(format!("no such window: {}", window_id)));
        }
        if self.window_agents.lock().contains_key(window_id) {
            return Ok(());
        }

        let permit = self
            .limiter
            .try_acquire()
            .ok_or_else(|| Error::Capacity("agent limit reached".to_string()))?;

        let role = format!("window-{}", window_id);
        let agent = AgentSession::new(AgentSpec {
            session_id: self.session_id.clone(),
            monitor_id: None,
            role: role.clone(),
            transport: self.transports.checkout(&self.provider),
            limiter: self.limiter.clone(),
            emitter: self.emitter.clone(),
            sink: self.sink.clone(),
            transcript: self.transcript.clone(),
        });
        agent.hold_permit(permit);
        self.register_agent(&agent);
        self.window_agents
            .lock()
            .insert(window_id.to_string(), agent);

        self.sink.send(ServerEvent::WindowAgentStatus {
            window_id: window_id.to_string(),
            agent_id: role,
            status: WindowAgentState::Assigned,
        });
        Ok(())
    }

    /// Release a window's agent. Returns whether one was assigned.
    pub async fn release_window_agent(&self, window_id: &str) -> bool {
        let agent = self.window_agents.lock().remove(window_id);
        match agent {
            Some(agent) => {
                let role = agent.current_role();
                self.unregister_agent(&agent);
                agent.dispose().await;
                self.sink.send(ServerEvent::WindowAgentStatus {
                    window_id: window_id.to_string(),
                    agent_id: role,
                    status: WindowAgentState::Released,
                });
                true
            }
            None => false,
        }
    }

    /// Cancel all in-flight turns, dispose every agent, and release every
    /// slot this session holds.
    pub async fn cleanup(&self) {
        let lanes: Vec<MonitorLane> = {
            let mut monitors = self.monitors.write();
            monitors.drain().map(|(_, lane)| lane).collect()
        };
        let window_agents: Vec<(String, Arc<AgentSession>)> = {
            let mut agents = self.window_agents.lock();
            agents.drain().collect()
        };

        // Interrupt first so every running turn observes cancellation
        // promptly, then dispose.
        for lane in &lanes {
            lane.agent.interrupt();
        }
        for (_, agent) in &window_agents {
            agent.interrupt();
        }
        for lane in lanes {
            self.unregister_agent(&lane.agent);
            lane.agent.dispose().await;
        }
        for (window_id, agent) in window_agents {
            self.unregister_agent(&agent);
            agent.dispose().await;
            self.sink.send(ServerEvent::WindowAgentStatus {
                window_id,
                agent_id: agent.current_role(),
                status: WindowAgentState::Released,
            });
        }

        self.emitter.unsubscribe(self.registry_subscription);
        self.transports.dispose_all().await;
        self.reload.persist().await;
    }

    async fn ensure_monitor_agent(&self, monitor_id: &str) -> Result<Arc<AgentSession>> {
        if let Some(lane) = self.monitors.read().get(monitor_id) {
            return Ok(lane.agent.clone());
        }

        // Waits FIFO when the limiter is exhausted.
        let permit = self.limiter.acquire(None).await?;

        let mut monitors = self.monitors.write();
        if let Some(lane) = monitors.get(monitor_id) {
            drop(permit);
            return Ok(lane.agent.clone());
        }

        let agent = AgentSession::new(AgentSpec {
            session_id: self.session_id.clone(),
            monitor_id: Some(monitor_id.to_string()),
            role: "main".to_string(),
            transport: self.transports.checkout(&self.provider),
            limiter: self.limiter.clone(),
            emitter: self.emitter.clone(),
            sink: self.sink.clone(),
            transcript: self.transcript.clone(),
        });
        agent.hold_permit(permit);
        self.register_agent(&agent);
        monitors.insert(
            monitor_id.to_string(),
            MonitorLane {
                agent: agent.clone(),
                queue: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
        tracing::info!(
            session_id = %self.session_id,
            monitor_id,
            "created main agent"
        );
        Ok(agent)
    }

    async fn record_reload_entry(&self, prompt: &str, outcome: &TurnOutcome) {
        let referenced: BTreeSet<String> = outcome
            .actions
            .iter()
            .filter_map(|a| a.window_id().map(str::to_string))
            .collect();
        // An entry is only replayable while its windows exist; a turn that
        // closed one of its own windows records nothing.
        if !referenced.iter().all(|id| self.windows.is_open(id)) {
            return;
        }

        let fingerprint = Fingerprint::compute(prompt, &self.windows.snapshot());
        self.reload
            .record(
                fingerprint,
                outcome.actions.clone(),
                prompt,
                referenced.into_iter().collect(),
            )
            .await;
    }

    pub(crate) fn register_agent(&self, agent: &Arc<AgentSession>) {
        self.agent_ids.write().insert(agent.id().to_string());
    }

    pub(crate) fn unregister_agent(&self, agent: &Arc<AgentSession>) {
        self.agent_ids.write().remove(agent.id());
    }
}

fn annotate_with_reload_options(prompt: &str, matches: &[ReloadMatch]) -> String {
    let mut annotation = String::from("<reload_options>\n");
    for (index, candidate) in matches.iter().take(RELOAD_MATCH_LIMIT).enumerate() {
        annotation.push_str(&format!(
            "{}. \"{}\" (similarity {:.2})\n",
            index + 1,
            candidate.label,
            candidate.score
        ));
    }
    annotation.push_str("</reload_options>\n\n");
    annotation.push_str(prompt);
    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::actions::{Bounds, OsAction};
    use crate::emitter::ActionTags;
    use crate::test_utils::{EventRecorder, MockTransport};
    use crate::transport::{StreamMessage, TransportFactory};

    struct Fixture {
        pool: Arc<ContextPool>,
        transport: MockTransport,
        recorder: EventRecorder,
        limiter: Arc<AgentLimiter>,
        emitter: Arc<ActionEmitter>,
    }

    fn fixture(limit: usize) -> Fixture {
        let transport = MockTransport::new();
        let recorder = EventRecorder::new();
        let limiter = AgentLimiter::new(limit);
        let emitter = ActionEmitter::new();

        let shared = transport.clone();
        let factory: TransportFactory = Arc::new(move |_provider: &str| {
            Arc::new(shared.clone()) as Arc<dyn crate::transport::ProviderTransport>
        });

        let pool = ContextPool::new(PoolSpec {
            session_id: "sess-1".into(),
            provider: "mock".into(),
            config: PoolConfig::default(),
            limiter: limiter.clone(),
            emitter: emitter.clone(),
            sink: Arc::new(recorder.clone()),
            transcript: Arc::new(Transcript::new()),
            windows: Arc::new(WindowRegistry::new()),
            reload: Arc::new(ReloadCache::new(None, &PoolConfig::default())),
            transports: Arc::new(TransportPool::new(factory)),
        });

        Fixture {
            pool,
            transport,
            recorder,
            limiter,
            emitter,
        }
    }

    fn create_window_action(id: &str) -> OsAction {
        OsAction::WindowCreate {
            id: id.to_string(),
            title: "Notes".into(),
            bounds: Bounds::new(0, 0, 400, 300),
            content: None,
            app_protocol: None,
        }
    }

    fn response_texts(recorder: &EventRecorder) -> Vec<(String, bool)> {
        recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::AgentResponse {
                    content,
                    is_complete,
                    ..
                } => Some((content, is_complete)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_creates_default_monitor_agent() {
        let fx = fixture(4);
        fx.pool.initialize().await.unwrap();

        assert!(fx.pool.has_main_agent(DEFAULT_MONITOR));
        assert_eq!(fx.limiter.stats().current, 1);
    }

    #[tokio::test]
    async fn test_monitors_are_independent_agents() {
        let fx = fixture(4);
        fx.pool.initialize().await.unwrap();
        fx.pool.create_monitor_agent("monitor-1").await.unwrap();

        assert_eq!(fx.limiter.stats().current, 2);
        let a = fx.pool.main_agent(DEFAULT_MONITOR).unwrap();
        let b = fx.pool.main_agent("monitor-1").unwrap();
        assert_ne!(a.id(), b.id());

        assert!(fx.pool.remove_monitor_agent("monitor-1").await);
        assert_eq!(fx.limiter.stats().current, 1);
        assert!(!fx.pool.remove_monitor_agent("monitor-1").await);
    }

    #[tokio::test]
    async fn test_per_monitor_turns_serialize_while_monitors_run_parallel() {
        let fx = fixture(4);
        fx.pool.initialize().await.unwrap();
        fx.pool.create_monitor_agent("monitor-1").await.unwrap();

        // Turn A on monitor-0 is held open by the test; B queues behind it
        // on the same monitor; C on monitor-1 is free to finish first.
        let a_driver = fx.transport.push_streamed_turn();

        let pool = fx.pool.clone();
        let a = tokio::spawn(async move {
            pool.route_message(DEFAULT_MONITOR, "task A", Vec::new()).await
        });
        while fx.transport.query_count() == 0 {
            tokio::task::yield_now().await;
        }

        // C consumes the next script (B is still stuck behind A's lane).
        fx.transport.push_turn(vec![
            StreamMessage::Text {
                content: Some("C done".into()),
                session_id: None,
            },
            StreamMessage::Complete {
                session_id: "thread-c".into(),
            },
        ]);
        fx.transport.push_turn(vec![
            StreamMessage::Text {
                content: Some("B done".into()),
                session_id: None,
            },
            StreamMessage::Complete {
                session_id: "thread-b".into(),
            },
        ]);

        let pool = fx.pool.clone();
        let b = tokio::spawn(async move {
            pool.route_message(DEFAULT_MONITOR, "task B", Vec::new()).await
        });
        let pool = fx.pool.clone();
        let c = tokio::spawn(async move {
            pool.route_message("monitor-1", "task C", Vec::new()).await
        });

        // C completes while A is still streaming.
        c.await.unwrap().unwrap();
        assert_eq!(fx.transport.query_count(), 2);

        a_driver
            .send(StreamMessage::Text {
                content: Some("A done".into()),
                session_id: None,
            })
            .unwrap();
        a_driver
            .send(StreamMessage::Complete {
                session_id: "thread-a".into(),
            })
            .unwrap();
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // B's turn only started after A completed.
        let prompts: Vec<String> = fx
            .transport
            .queries()
            .into_iter()
            .map(|q| q.prompt)
            .collect();
        assert_eq!(prompts[0], "task A");
        assert_eq!(prompts[1], "task C");
        assert_eq!(prompts[2], "task B");

        // Outbound ordering: C finished while A was open, and A's terminal
        // event precedes any B event.
        let responses = response_texts(&fx.recorder);
        let position = |needle: &str| {
            responses
                .iter()
                .position(|(content, _)| content == needle)
                .unwrap()
        };
        let a_delta = position("A done");
        assert!(position("C done") < a_delta);
        let a_complete = a_delta
            + responses[a_delta..]
                .iter()
                .position(|(content, complete)| content.is_empty() && *complete)
                .unwrap();
        assert!(a_complete < position("B done"));
    }

    #[tokio::test]
    async fn test_reload_cycle_hit_and_invalidation() {
        let fx = fixture(4);
        fx.pool.initialize().await.unwrap();
        let main = fx.pool.main_agent(DEFAULT_MONITOR).unwrap();

        // First turn: the model "creates" w1 while the turn is open.
        let driver = fx.transport.push_streamed_turn();
        let pool = fx.pool.clone();
        let first = tokio::spawn(async move {
            pool.route_message(DEFAULT_MONITOR, "open notes", Vec::new())
                .await
        });
        while fx.transport.query_count() == 0 {
            tokio::task::yield_now().await;
        }
        fx.emitter.emit(
            create_window_action("w1"),
            ActionTags::for_agent(main.id()).with_monitor(DEFAULT_MONITOR),
        );
        driver
            .send(StreamMessage::Complete {
                session_id: "thread-1".into(),
            })
            .unwrap();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.actions.len(), 1);
        assert!(fx.pool.windows().is_open("w1"));
        assert_eq!(fx.pool.reload_cache().len().await, 1);

        // Second identical request: the prompt reaching the model carries
        // the reload annotation with a perfect score.
        fx.pool
            .route_message(DEFAULT_MONITOR, "open notes", Vec::new())
            .await
            .unwrap();
        let second_prompt = &fx.transport.queries()[1].prompt;
        assert!(second_prompt.starts_with("<reload_options>"));
        assert!(second_prompt.contains("\"open notes\" (similarity 1.00)"));
        assert!(second_prompt.ends_with("open notes"));

        // Closing w1 drops the entry; a third request gets a bare prompt.
        fx.pool
            .windows()
            .apply(&OsAction::WindowClose { id: "w1".into() })
            .unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while fx.pool.reload_cache().len().await > 0 {
            assert!(tokio::time::Instant::now() < deadline, "entry not dropped");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        fx.pool
            .route_message(DEFAULT_MONITOR, "open notes", Vec::new())
            .await
            .unwrap();
        let third_prompt = &fx.transport.queries()[2].prompt;
        assert_eq!(third_prompt, "open notes");
    }

    #[tokio::test]
    async fn test_dispatch_task_forks_parent_thread() {
        let fx = fixture(4);
        fx.pool.initialize().await.unwrap();

        // Give the main agent a provider thread to fork.
        fx.transport.push_turn(vec![StreamMessage::Complete {
            session_id: "thread-main".into(),
        }]);
        fx.pool
            .route_message(DEFAULT_MONITOR, "hello", Vec::new())
            .await
            .unwrap();

        let report = fx
            .pool
            .dispatch_task(TaskRequest {
                objective: Some("fetch https://example.org".into()),
                profile: TaskProfile::Web,
                hint: None,
                monitor_id: None,
                message_id: None,
            })
            .await;

        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.summary, "no actions taken");

        let queries = fx.transport.queries();
        let task_query = queries.last().unwrap();
        assert!(task_query.options.fork_session);
        assert_eq!(
            task_query.options.session_id.as_deref(),
            Some("thread-main")
        );
        assert!(task_query
            .options
            .allowed_tools
            .as_ref()
            .unwrap()
            .contains(&"fetch_url".to_string()));
        assert!(task_query.options.system_prompt.is_some());
        assert!(task_query
            .options
            .agent_id
            .as_deref()
            .is_some());

        // Only the main agent still holds a slot.
        assert_eq!(fx.limiter.stats().current, 1);
    }

    #[tokio::test]
    async fn test_dispatch_task_fails_cleanly_at_capacity() {
        let fx = fixture(1);
        fx.pool.initialize().await.unwrap();
        assert_eq!(fx.limiter.stats().current, 1);

        let report = fx
            .pool
            .dispatch_task(TaskRequest {
                objective: Some("anything".into()),
                profile: TaskProfile::Default,
                hint: None,
                monitor_id: None,
                message_id: None,
            })
            .await;

        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("agent limit reached"));
        assert!(report.actions.is_empty());
        assert_eq!(fx.limiter.stats().current, 1);
        assert_eq!(fx.limiter.stats().waiting, 0);
    }

    #[tokio::test]
    async fn test_window_agent_lifecycle() {
        let fx = fixture(4);
        fx.pool.initialize().await.unwrap();
        fx.pool.windows().apply(&create_window_action("w1")).unwrap();

        fx.pool.assign_window_agent("w1").await.unwrap();
        assert_eq!(fx.limiter.stats().current, 2);
        assert_eq!(fx.recorder.count_event("WINDOW_AGENT_STATUS"), 1);

        let outcome = fx.pool.route_window_message("w1", "summarize").await.unwrap();
        assert!(outcome.succeeded());

        assert!(fx.pool.release_window_agent("w1").await);
        assert_eq!(fx.limiter.stats().current, 1);
        let statuses: Vec<WindowAgentState> = fx
            .recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::WindowAgentStatus { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                WindowAgentState::Assigned,
                WindowAgentState::Active,
                WindowAgentState::Released
            ]
        );

        assert!(!fx.pool.release_window_agent("w1").await);
    }

    #[tokio::test]
    async fn test_assigning_agent_to_missing_window_is_a_state_error() {
        let fx = fixture(4);
        let err = fx.pool.assign_window_agent("ghost").await.unwrap_err();
        assert!(err.is_state());
    }

    #[tokio::test]
    async fn test_cleanup_interrupts_and_releases_everything() {
        let fx = fixture(4);
        fx.pool.initialize().await.unwrap();

        // Leave a turn hanging mid-stream.
        let _driver = fx.transport.push_streamed_turn();
        let pool = fx.pool.clone();
        let hanging = tokio::spawn(async move {
            pool.route_message(DEFAULT_MONITOR, "never ends", Vec::new())
                .await
        });
        while fx.transport.query_count() == 0 {
            tokio::task::yield_now().await;
        }

        fx.pool.cleanup().await;

        let outcome = hanging.await.unwrap().unwrap();
        assert_eq!(outcome.status, TurnStatus::Interrupted);
        assert_eq!(fx.limiter.stats().current, 0);
        assert!(!fx.pool.has_main_agent(DEFAULT_MONITOR));
        assert!(fx.transport.interrupt_count() >= 1);
    }
}
