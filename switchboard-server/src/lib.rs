//! WebSocket server surface for the switchboard session broker.
//!
//! This crate binds the broker core to the network: a WebSocket endpoint
//! for client channels, a broadcast hub fanning server events out to the
//! connections of each session, and a session hub indexing live sessions.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard_core::config::Config;
//! use switchboard_core::transport::TransportFactory;
//! use switchboard_server::{AppState, SwitchboardRouter};
//!
//! # async fn example(factory: TransportFactory) -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(Config::from_env(), factory);
//! let app = SwitchboardRouter::new(state.clone())
//!     .with_ws("/ws")
//!     .build()?;
//!
//! let addr = format!("0.0.0.0:{}", state.config.port);
//! let listener = tokio::net::TcpListener::bind(addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod hub;
pub mod router;
pub(crate) mod state;
pub mod ws;

// Re-exports
pub use broadcast::BroadcastHub;
pub use error::{BuildError, UpgradeError};
pub use hub::{SessionHandle, SessionHub};
pub use router::SwitchboardRouter;
pub use state::AppState;
