//! Tests for client-frame handling and the restore prompt.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use switchboard_core::actions::OsAction;
use switchboard_core::config::Config;
use switchboard_core::events::{ClientMessage, ServerEvent};
use switchboard_core::test_utils::MockTransport;
use switchboard_core::transport::{ProviderTransport, TransportFactory};

use crate::state::AppState;
use crate::ws::{handle_client_message, restore_event};

fn app() -> (AppState, MockTransport) {
    let transport = MockTransport::new();
    let shared = transport.clone();
    let factory: TransportFactory =
        Arc::new(move |_provider: &str| Arc::new(shared.clone()) as Arc<dyn ProviderTransport>);
    (
        AppState::with_state_dir(Config::default(), factory, None),
        transport,
    )
}

#[tokio::test]
async fn test_prompt_frame_runs_a_turn() {
    let (state, transport) = app();
    let handle = state.sessions.get_or_create("s1");
    handle.ensure_initialized().await.unwrap();
    let mut rx = state.broadcast.subscribe("c1", "s1");

    transport.push_turn(vec![
        switchboard_core::transport::StreamMessage::Text {
            content: Some("On it".into()),
            session_id: None,
        },
        switchboard_core::transport::StreamMessage::Complete {
            session_id: "thread-1".into(),
        },
    ]);

    handle_client_message(
        &state,
        &handle,
        "c1",
        ClientMessage::Prompt {
            content: "open notes".into(),
            monitor_id: None,
            images: Vec::new(),
        },
    );

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        ServerEvent::AgentResponse { content, .. } => assert_eq!(content, "On it"),
        other => panic!("expected AGENT_RESPONSE, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dialog_response_resolves_pending_feedback() {
    let (state, _transport) = app();
    let handle = state.sessions.get_or_create("s1");

    let emitter = state.emitter.clone();
    let waiter = tokio::spawn(async move {
        emitter
            .emit_and_wait(
                OsAction::ToastShow {
                    message: "confirm?".into(),
                    variant: None,
                },
                "dialog-1",
                Duration::from_secs(1),
            )
            .await
    });
    // Let the waiter register its key.
    tokio::time::sleep(Duration::from_millis(10)).await;

    handle_client_message(
        &state,
        &handle,
        "c1",
        ClientMessage::DialogResponse {
            dialog_id: "dialog-1".into(),
            confirmed: true,
            remember_choice: Some(false),
        },
    );

    let value = waiter.await.unwrap().unwrap();
    assert_eq!(value, json!({"confirmed": true, "rememberChoice": false}));
}

#[tokio::test]
async fn test_restore_prompt_summarizes_last_session() {
    let (state, _transport) = app();
    let handle = state.sessions.get_or_create("s1");

    assert!(restore_event(&handle).is_none());

    handle.transcript.append(
        "main",
        switchboard_core::transcript::TranscriptKind::Prompt,
        json!("open notes"),
    );

    let event = restore_event(&handle).unwrap();
    match event {
        ServerEvent::Actions {
            actions, agent_id, ..
        } => {
            assert_eq!(agent_id, "system");
            match &actions[0] {
                OsAction::DialogConfirm {
                    dialog_id, message, ..
                } => {
                    assert_eq!(dialog_id, "restore-s1");
                    assert!(message.contains("open notes"));
                }
                other => panic!("expected a confirm dialog, got {:?}", other),
            }
        }
        other => panic!("expected ACTIONS, got {:?}", other),
    }
}

#[tokio::test]
async fn test_restore_request_publishes_to_requesting_connection() {
    let (state, _transport) = app();
    let handle = state.sessions.get_or_create("s1");
    handle.transcript.append(
        "main",
        switchboard_core::transcript::TranscriptKind::Prompt,
        json!("open notes"),
    );
    let mut rx_requester = state.broadcast.subscribe("c1", "s1");
    let mut rx_other = state.broadcast.subscribe("c2", "s1");

    handle_client_message(
        &state,
        &handle,
        "c1",
        ClientMessage::RestoreRequest { session_id: None },
    );

    assert!(rx_requester.try_recv().is_ok());
    assert!(rx_other.try_recv().is_err());
}
