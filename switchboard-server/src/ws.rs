//! WebSocket endpoint
//!
//! The bidirectional client channel: one JSON value per text frame. Inbound
//! frames are [`ClientMessage`]s; outbound events arrive through the
//! broadcast hub so every connection of a session sees the same stream.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use switchboard_core::actions::OsAction;
use switchboard_core::events::{ClientMessage, ConnectionState, ServerEvent};
use switchboard_core::pool::DEFAULT_MONITOR;

use crate::error::validate_session_id;
use crate::hub::SessionHandle;
use crate::state::AppState;

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    /// Session to bind this connection to; a fresh session is created when
    /// absent or unknown.
    pub session: Option<String>,
}

/// `GET /ws` - upgrade to the client channel.
///
/// A client-supplied session id is validated before any state is bound to
/// it; a bad id refuses the upgrade with a 400.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = match query.session {
        Some(id) => {
            if let Err(error) = validate_session_id(&id) {
                return error.into_response();
            }
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
        .into_response()
}

/// Per-connection loop: pump hub events out, parse client frames in.
async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let handle = state.sessions.get_or_create(&session_id);
    let mut events = state.broadcast.subscribe(&connection_id, &session_id);
    handle.touch();

    let (mut ws_tx, mut ws_rx) = socket.split();

    if let Err(error) = handle.ensure_initialized().await {
        tracing::warn!(%session_id, %error, "session initialization failed");
        let event = ServerEvent::ConnectionStatus {
            status: ConnectionState::Error,
            provider: None,
            session_id: Some(session_id.clone()),
            error: Some(error.to_string()),
        };
        let _ = ws_tx.send(Message::Text(serialize(&event))).await;
        state.broadcast.unsubscribe(&connection_id);
        return;
    }

    state.broadcast.publish_to_connection(
        ServerEvent::connected(state.sessions.provider(), session_id.clone()),
        &connection_id,
    );
    if let Some(restore) = restore_event(&handle) {
        state.broadcast.publish_to_connection(restore, &connection_id);
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if ws_tx.send(Message::Text(serialize(&event))).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => {
                                handle.touch();
                                handle_client_message(&state, &handle, &connection_id, message);
                            }
                            Err(error) => {
                                // Protocol errors are connection-scoped.
                                state.broadcast.publish_to_connection(
                                    ServerEvent::error(format!("malformed frame: {}", error)),
                                    &connection_id,
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.broadcast.unsubscribe(&connection_id);
    handle.touch();
    tracing::debug!(%session_id, %connection_id, "connection closed");
}

/// Dispatch one parsed client frame.
///
/// Prompts run on their own task so a long turn never blocks this
/// connection's read loop; results reach the client through the hub.
pub(crate) fn handle_client_message(
    state: &AppState,
    handle: &Arc<SessionHandle>,
    connection_id: &str,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Prompt {
            content,
            monitor_id,
            images,
        } => {
            let pool = handle.pool.clone();
            let monitor = monitor_id.unwrap_or_else(|| DEFAULT_MONITOR.to_string());
            tokio::spawn(async move {
                if let Err(error) = pool.route_message(&monitor, &content, images).await {
                    // User-visible failures were already published as
                    // ERROR events by the pool.
                    tracing::debug!(%error, %monitor, "turn ended with error");
                }
            });
        }

        ClientMessage::DialogResponse {
            dialog_id,
            confirmed,
            remember_choice,
        } => {
            let resolved = state.emitter.resolve_feedback(
                &dialog_id,
                json!({
                    "confirmed": confirmed,
                    "rememberChoice": remember_choice,
                }),
            );
            if !resolved {
                tracing::debug!(%dialog_id, "dialog response had no waiter");
            }
        }

        ClientMessage::RestoreRequest { .. } => {
            if let Some(event) = restore_event(handle) {
                state.broadcast.publish_to_connection(event, connection_id);
            }
        }
    }
}

/// The optional restore prompt a reconnecting client receives.
pub(crate) fn restore_event(handle: &Arc<SessionHandle>) -> Option<ServerEvent> {
    let last = handle.transcript.last_prompt()?;
    let summary = last
        .payload
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| last.payload.to_string());

    Some(ServerEvent::Actions {
        actions: vec![OsAction::DialogConfirm {
            dialog_id: format!("restore-{}", handle.id),
            title: "Restore session?".to_string(),
            message: format!("Last request: {}", summary),
            confirm_text: Some("Restore".to_string()),
            cancel_text: Some("Start fresh".to_string()),
            permission_options: None,
        }],
        agent_id: "system".to_string(),
        monitor_id: None,
    })
}

fn serialize(event: &ServerEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        json!({
            "type": "ERROR",
            "error": format!("failed to serialize event: {}", e),
        })
        .to_string()
    })
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
