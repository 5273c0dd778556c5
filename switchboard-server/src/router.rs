//! Router builder for switchboard endpoints.

use axum::routing::get;
use axum::Router;

use crate::error::BuildError;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Builder for configuring switchboard endpoints.
///
/// # Example
///
/// ```rust,no_run
/// use switchboard_server::{AppState, SwitchboardRouter};
/// # async fn example(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
/// let app = SwitchboardRouter::new(state)
///     .with_ws("/ws")
///     .build()?;
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub struct SwitchboardRouter {
    state: AppState,
    ws_path: Option<String>,
}

impl SwitchboardRouter {
    /// Create a new router builder over shared application state.
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            ws_path: None,
        }
    }

    /// Enable the WebSocket client channel at the specified path.
    pub fn with_ws(mut self, path: impl Into<String>) -> Self {
        self.ws_path = Some(path.into());
        self
    }

    /// Build the router with all configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoEndpoints`] if no endpoints were configured.
    /// Call `.with_ws()` before `.build()`.
    pub fn build(self) -> Result<Router, BuildError> {
        let Some(ws_path) = self.ws_path else {
            return Err(BuildError::NoEndpoints);
        };

        let router = Router::new()
            .route(&ws_path, get(ws_handler))
            .layer(tower_http::trace::TraceLayer::new_for_http());
        Ok(router.with_state(self.state))
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoEndpoints`] if no endpoints were configured.
    pub fn build_nested(self, prefix: impl Into<String>) -> Result<Router, BuildError> {
        Ok(Router::new().nest(&prefix.into(), self.build()?))
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
