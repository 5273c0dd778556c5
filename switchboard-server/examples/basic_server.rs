//! Basic switchboard server example.
//!
//! Runs the WebSocket endpoint over a scripted mock transport, since real
//! provider adapters live outside this workspace.
//!
//! Run with:
//! ```sh
//! cargo run -p switchboard-server --example basic_server
//! ```
//!
//! Connect with a WebSocket client:
//! ```sh
//! websocat "ws://localhost:8000/ws?session=demo"
//! {"type":"prompt","content":"open notes"}
//! ```

use std::sync::Arc;

use switchboard_core::config::Config;
use switchboard_core::test_utils::MockTransport;
use switchboard_core::transport::{ProviderTransport, TransportFactory};
use switchboard_server::{AppState, SwitchboardRouter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=debug,info".into()),
        )
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Every checkout gets a transport that answers each turn immediately.
    let factory: TransportFactory = Arc::new(|_provider: &str| {
        Arc::new(MockTransport::new()) as Arc<dyn ProviderTransport>
    });

    let state = AppState::new(config, factory);
    let _sweep = state.sessions.spawn_idle_sweep();

    let app = SwitchboardRouter::new(state).with_ws("/ws").build()?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    println!("Server running at http://localhost:{}", port);
    println!("WebSocket endpoint: ws://localhost:{}/ws", port);
    axum::serve(listener, app).await?;
    Ok(())
}
