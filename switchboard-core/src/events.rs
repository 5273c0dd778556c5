//! Client-facing protocol events.
//!
//! Server events are serialized with a `type` field in SCREAMING_SNAKE_CASE;
//! client frames use snake_case tags. Both travel as one JSON value per
//! WebSocket text message, which preserves message boundaries.

use serde::{Deserialize, Serialize};

use crate::actions::{OsAction, PermissionOptions};

/// Connection lifecycle status reported in [`ServerEvent::ConnectionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Error,
}

/// Progress state of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Complete,
    Error,
}

/// Lifecycle of a window-scoped agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowAgentState {
    Assigned,
    Active,
    Released,
}

/// Events pushed from the server to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// Channel status changed.
    ConnectionStatus {
        status: ConnectionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(
            rename = "sessionId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// One or more OS actions to apply, in order.
    Actions {
        actions: Vec<OsAction>,
        #[serde(rename = "agentId")]
        agent_id: String,
        #[serde(
            rename = "monitorId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        monitor_id: Option<String>,
    },

    /// Incremental model thinking.
    AgentThinking {
        #[serde(rename = "agentId")]
        agent_id: String,
        content: String,
    },

    /// Incremental (or final) model text.
    AgentResponse {
        #[serde(rename = "agentId")]
        agent_id: String,
        content: String,
        #[serde(rename = "isComplete")]
        is_complete: bool,
    },

    /// Tool invocation progress.
    ToolProgress {
        #[serde(rename = "agentId")]
        agent_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        status: ToolStatus,
    },

    /// Window-scoped agent lifecycle.
    WindowAgentStatus {
        #[serde(rename = "windowId")]
        window_id: String,
        #[serde(rename = "agentId")]
        agent_id: String,
        status: WindowAgentState,
    },

    /// A permission dialog that needs a user decision.
    ApprovalRequest {
        #[serde(rename = "dialogId")]
        dialog_id: String,
        title: String,
        message: String,
        #[serde(
            rename = "confirmText",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        confirm_text: Option<String>,
        #[serde(
            rename = "cancelText",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        cancel_text: Option<String>,
        #[serde(
            rename = "permissionOptions",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        permission_options: Option<PermissionOptions>,
        #[serde(rename = "agentId")]
        agent_id: String,
    },

    /// A turn-level failure surfaced to the user.
    Error { error: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn connected(provider: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::ConnectionStatus {
            status: ConnectionState::Connected,
            provider: Some(provider.into()),
            session_id: Some(session_id.into()),
            error: None,
        }
    }
}

/// Destination for outbound server events.
///
/// The broadcast hub implements this per session; the core emits through it
/// without knowing about connections. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn send(&self, event: ServerEvent);
}

/// Blanket implementation for closures, mirroring hook registration.
impl<F> EventSink for F
where
    F: Fn(ServerEvent) + Send + Sync,
{
    fn send(&self, event: ServerEvent) {
        self(event)
    }
}

/// An image attachment on a prompt, base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub data: String,
}

/// Frames sent from clients to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A natural-language prompt for a monitor's main agent.
    Prompt {
        content: String,
        #[serde(
            rename = "monitorId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        monitor_id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        images: Vec<ImageAttachment>,
    },

    /// Answer to a confirmation dialog or approval request.
    DialogResponse {
        #[serde(rename = "dialogId")]
        dialog_id: String,
        confirmed: bool,
        #[serde(
            rename = "rememberChoice",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        remember_choice: Option<bool>,
    },

    /// Ask the server to restore a previous session onto this connection.
    RestoreRequest {
        #[serde(
            rename = "sessionId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        session_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_event_tags() {
        let event = ServerEvent::AgentResponse {
            agent_id: "main".into(),
            content: "hello".into(),
            is_complete: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AGENT_RESPONSE");
        assert_eq!(json["agentId"], "main");
        assert_eq!(json["isComplete"], false);
    }

    #[test]
    fn test_approval_request_round_trip() {
        let event = ServerEvent::ApprovalRequest {
            dialog_id: "d1".into(),
            title: "Allow fetch".into(),
            message: "example.org".into(),
            confirm_text: None,
            cancel_text: None,
            permission_options: Some(PermissionOptions {
                show_remember_choice: true,
                grant_key: None,
            }),
            agent_id: "task-1".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("APPROVAL_REQUEST"));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_client_message_parse() {
        let frame = r#"{"type":"prompt","content":"open notes","monitorId":"monitor-0"}"#;
        let msg: ClientMessage = serde_json::from_str(frame).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Prompt { ref content, .. } if content == "open notes"
        ));

        let frame = r#"{"type":"dialog_response","dialogId":"d1","confirmed":true}"#;
        let msg: ClientMessage = serde_json::from_str(frame).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::DialogResponse { confirmed: true, .. }
        ));
    }
}
