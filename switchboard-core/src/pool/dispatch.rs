//! Task dispatch
//!
//! Forks a monitor's main agent into a short-lived task agent with a
//! restricted tool subset, runs one objective, and reports back. The task
//! agent consumes its own limiter slot and is torn down in the same turn on
//! every exit path.

use serde::{Deserialize, Serialize};

use crate::actions::OsAction;
use crate::agent::{
    AgentError, AgentSession, AgentSpec, MessageSource, SlotPolicy, TurnOptions, TurnStatus,
};
use crate::limiter::AcquireError;

use super::{ContextPool, DEFAULT_MONITOR};

/// Baseline tools every task profile may use.
const COMMON_TOOLS: &[&str] = &[
    "create_window",
    "update_window",
    "close_window",
    "show_notification",
    "show_toast",
    "confirm_dialog",
];

/// The closed set of task profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskProfile {
    Default,
    Web,
    Code,
    App,
}

impl TaskProfile {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::Default),
            "web" => Some(Self::Web),
            "code" => Some(Self::Code),
            "app" => Some(Self::App),
            _ => None,
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Default => {
                "You are a focused sub-agent. Complete the single objective \
                 you are given using the available OS tools, then stop."
            }
            Self::Web => {
                "You are a web sub-agent. Fetch and summarize web content for \
                 the objective you are given, presenting results in windows. \
                 Do not start unrelated work."
            }
            Self::Code => {
                "You are a code sub-agent. Write and run code to complete the \
                 objective, showing results in a window. Keep output minimal."
            }
            Self::App => {
                "You are an app sub-agent. Build the requested applet and \
                 present it in an iframe window. Report when it is rendered."
            }
        }
    }

    pub fn allowed_tools(&self) -> Vec<String> {
        let extra: &[&str] = match self {
            Self::Default => &[],
            Self::Web => &["fetch_url", "open_browser"],
            Self::Code => &["run_code"],
            Self::App => &["build_app", "render_iframe"],
        };
        COMMON_TOOLS
            .iter()
            .chain(extra)
            .map(|s| s.to_string())
            .collect()
    }
}

/// A task dispatch request from a main agent.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    /// What the task agent should do; the profile default applies if unset.
    #[serde(default)]
    pub objective: Option<String>,
    pub profile: TaskProfile,
    /// Optional steer for the task agent, appended to the objective.
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(rename = "monitorId", default)]
    pub monitor_id: Option<String>,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
}

/// Terminal state of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
    Interrupted,
}

/// What a dispatched task produced.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub status: TaskStatus,
    /// Deterministic join of the recorded action descriptions.
    pub summary: String,
    pub actions: Vec<OsAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskReport {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            summary: "no actions taken".to_string(),
            actions: Vec::new(),
            error: Some(error.into()),
        }
    }
}

impl ContextPool {
    /// Fork the requesting monitor's main agent into a one-shot task agent.
    ///
    /// On limiter exhaustion this returns a failed report with no side
    /// effects. In every other case the task agent runs exactly one turn,
    /// its slot is released, and its transport goes back to the warm pool.
    pub async fn dispatch_task(&self, request: TaskRequest) -> TaskReport {
        let monitor_id = request
            .monitor_id
            .clone()
            .unwrap_or_else(|| DEFAULT_MONITOR.to_string());

        let Some(main_agent) = self.main_agent(&monitor_id) else {
            return TaskReport::failed(format!("no main agent for {}", monitor_id));
        };
        let parent_session_id = main_agent.provider_session_id();

        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let role = format!("task-{}", &nonce[..8]);
        let transport = self.transports.checkout(&self.provider);

        let task_agent = AgentSession::new(AgentSpec {
            session_id: self.session_id.clone(),
            monitor_id: Some(monitor_id.clone()),
            role: role.clone(),
            transport: transport.clone(),
            limiter: self.limiter.clone(),
            emitter: self.emitter.clone(),
            sink: self.sink.clone(),
            transcript: self.transcript.clone(),
        });
        self.register_agent(&task_agent);

        let mut objective = request
            .objective
            .clone()
            .unwrap_or_else(|| "Complete the pending task for this monitor.".to_string());
        if let Some(hint) = &request.hint {
            objective = format!("{}\n\nHint: {}", objective, hint);
        }

        let options = TurnOptions {
            role: role.clone(),
            source: MessageSource::Main,
            monitor_id: Some(monitor_id),
            fork_session: parent_session_id.is_some(),
            parent_session_id,
            system_prompt_override: Some(request.profile.system_prompt().to_string()),
            allowed_tools: Some(request.profile.allowed_tools()),
            slot_policy: SlotPolicy::FailFast,
            images: Vec::new(),
        };

        let result = task_agent.handle_message(&objective, options).await;

        // Same-turn teardown on every path: the slot was already released
        // by the turn itself, the transport goes back to the warm pool.
        self.unregister_agent(&task_agent);
        self.transports.checkin(transport);

        match result {
            Ok(outcome) => TaskReport {
                status: match outcome.status {
                    TurnStatus::Completed => TaskStatus::Completed,
                    TurnStatus::Failed => TaskStatus::Failed,
                    TurnStatus::Interrupted => TaskStatus::Interrupted,
                },
                summary: outcome.summary(),
                actions: outcome.actions.clone(),
                error: outcome.error,
            },
            Err(AgentError::Capacity(AcquireError::Exhausted)) => {
                TaskReport::failed("agent limit reached")
            }
            Err(error) => TaskReport::failed(error.to_string()),
        }
    }
}
