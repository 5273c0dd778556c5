//! Tests for the session hub, including process-wide capacity gating.

use std::sync::Arc;
use std::time::Duration;

use switchboard_core::config::Config;
use switchboard_core::limiter::LimiterStats;
use switchboard_core::test_utils::MockTransport;
use switchboard_core::transport::{ProviderTransport, TransportFactory};

use crate::state::AppState;

fn mock_factory(transport: MockTransport) -> TransportFactory {
    Arc::new(move |_provider: &str| Arc::new(transport.clone()) as Arc<dyn ProviderTransport>)
}

fn app(max_agents: usize) -> (AppState, MockTransport) {
    let transport = MockTransport::new();
    let config = Config {
        max_agents,
        ..Config::default()
    };
    let state = AppState::with_state_dir(config, mock_factory(transport.clone()), None);
    (state, transport)
}

#[tokio::test]
async fn test_get_or_create_returns_same_instance() {
    let (state, _transport) = app(4);
    let a = state.sessions.get_or_create("s1");
    let b = state.sessions.get_or_create("s1");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(state.sessions.len(), 1);

    let c = state.sessions.get_or_create("s2");
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(state.sessions.len(), 2);
}

#[tokio::test]
async fn test_concurrent_get_or_create_initializes_once() {
    let (state, _transport) = app(4);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let sessions = state.sessions.clone();
            tokio::spawn(async move {
                let handle = sessions.get_or_create("s1");
                handle.ensure_initialized().await.unwrap();
                handle
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Eight concurrent initializations produced exactly one main agent.
    assert_eq!(state.limiter.stats().current, 1);
}

#[tokio::test]
async fn test_capacity_gating_across_sessions_is_fifo() {
    let (state, _transport) = app(2);

    let s1 = state.sessions.get_or_create("s1");
    let s2 = state.sessions.get_or_create("s2");
    let s3 = state.sessions.get_or_create("s3");

    s1.ensure_initialized().await.unwrap();
    s2.ensure_initialized().await.unwrap();

    // The third session's main agent waits FIFO for a slot.
    let third = tokio::spawn(async move { s3.ensure_initialized().await });
    while state.limiter.stats().waiting == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        state.limiter.stats(),
        LimiterStats {
            limit: 2,
            current: 2,
            waiting: 1
        }
    );

    // Retiring session 1 releases its slot straight to the waiter.
    assert!(state.sessions.retire("s1").await);
    third.await.unwrap().unwrap();
    assert_eq!(
        state.limiter.stats(),
        LimiterStats {
            limit: 2,
            current: 2,
            waiting: 0
        }
    );
}

#[tokio::test]
async fn test_retire_unknown_session_is_false() {
    let (state, _transport) = app(2);
    assert!(!state.sessions.retire("ghost").await);
}

#[tokio::test]
async fn test_idle_sweep_retires_disconnected_sessions() {
    let transport = MockTransport::new();
    let config = Config {
        max_agents: 4,
        session_idle_timeout: Duration::from_millis(0),
        ..Config::default()
    };
    let state = AppState::with_state_dir(config, mock_factory(transport), None);

    let idle = state.sessions.get_or_create("idle");
    idle.ensure_initialized().await.unwrap();

    // A session with a live connection is spared regardless of its age.
    let _rx = state.broadcast.subscribe("c1", "busy");
    let busy = state.sessions.get_or_create("busy");
    busy.ensure_initialized().await.unwrap();

    let retired = state.sessions.sweep_idle().await;
    assert_eq!(retired, vec!["idle".to_string()]);
    assert!(state.sessions.get("idle").is_none());
    assert!(state.sessions.get("busy").is_some());
    assert_eq!(state.limiter.stats().current, 1);
}

#[tokio::test]
async fn test_shutdown_rejects_waiters_and_retires_everything() {
    let (state, _transport) = app(1);

    let s1 = state.sessions.get_or_create("s1");
    s1.ensure_initialized().await.unwrap();

    let s2 = state.sessions.get_or_create("s2");
    let waiter = tokio::spawn(async move { s2.ensure_initialized().await });
    while state.limiter.stats().waiting == 0 {
        tokio::task::yield_now().await;
    }

    state.shutdown().await;

    let result = waiter.await.unwrap();
    assert!(result.is_err());
    assert!(state.sessions.is_empty());
    assert_eq!(state.limiter.stats().current, 0);
}
