//! Agent-related types

use std::time::Duration;

use thiserror::Error;

use crate::actions::OsAction;
use crate::limiter::AcquireError;
use crate::transport::TransportError;

/// Errors that can occur while running an agent turn
#[derive(Debug, Error)]
pub enum AgentError {
    /// The limiter refused a slot; the turn never ran
    #[error("capacity: {0}")]
    Capacity(#[from] AcquireError),

    /// The provider transport failed before streaming started
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The turn was interrupted before it could start
    #[error("interrupted")]
    Interrupted,
}

/// Who asked for this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// A human prompt from a client connection.
    User,
    /// A main agent dispatching sub-work.
    Main,
}

/// How to obtain a limiter slot when the instance does not already hold one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPolicy {
    /// Reject immediately when the limiter is full.
    #[default]
    FailFast,
    /// Queue FIFO until a slot frees.
    Wait,
    /// Queue with a deadline.
    WaitFor(Duration),
}

/// Per-turn options for [`AgentSession::handle_message`].
///
/// [`AgentSession::handle_message`]: super::AgentSession::handle_message
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Role label for this turn; also the outbound `agentId`.
    pub role: String,
    pub source: MessageSource,
    pub monitor_id: Option<String>,
    /// Fork `parent_session_id` into a distinct provider thread.
    pub fork_session: bool,
    pub parent_session_id: Option<String>,
    pub system_prompt_override: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
    pub slot_policy: SlotPolicy,
    pub images: Vec<crate::events::ImageAttachment>,
}

impl TurnOptions {
    /// Options for a user-facing main-agent turn.
    pub fn main(monitor_id: impl Into<String>) -> Self {
        Self {
            role: "main".to_string(),
            source: MessageSource::User,
            monitor_id: Some(monitor_id.into()),
            fork_session: false,
            parent_session_id: None,
            system_prompt_override: None,
            allowed_tools: None,
            slot_policy: SlotPolicy::FailFast,
            images: Vec::new(),
        }
    }
}

/// Terminal state of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Failed,
    Interrupted,
}

/// Result of one agent turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    /// Accumulated response text.
    pub response: String,
    /// Actions recorded by the bridge during the turn, in emission order.
    pub actions: Vec<OsAction>,
    pub error: Option<String>,
    /// Provider thread id after the turn, if known.
    pub provider_session_id: Option<String>,
}

impl TurnOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == TurnStatus::Completed
    }

    /// Deterministic human-readable join of the recorded actions.
    pub fn summary(&self) -> String {
        if self.actions.is_empty() {
            return "no actions taken".to_string();
        }
        self.actions
            .iter()
            .map(|a| a.describe())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Bounds, OsAction};

    #[test]
    fn test_turn_outcome_summary() {
        let outcome = TurnOutcome {
            status: TurnStatus::Completed,
            response: String::new(),
            actions: vec![
                OsAction::WindowCreate {
                    id: "w1".into(),
                    title: "Notes".into(),
                    bounds: Bounds::new(0, 0, 10, 10),
                    content: None,
                    app_protocol: None,
                },
                OsAction::WindowClose { id: "w1".into() },
            ],
            error: None,
            provider_session_id: None,
        };
        assert_eq!(
            outcome.summary(),
            "created window w1 (\"Notes\"); closed window w1"
        );

        let empty = TurnOutcome {
            actions: Vec::new(),
            ..outcome
        };
        assert_eq!(empty.summary(), "no actions taken");
    }
}
