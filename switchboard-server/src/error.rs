//! Server-side error types.
//!
//! Once a channel is up, failures travel in-band: capacity and transport
//! problems reach the client as `ERROR` events, and protocol problems stay
//! scoped to their connection. The types here cover the two paths where no
//! channel exists yet: finishing a router with nothing on it, and refusing
//! a WebSocket upgrade.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Longest session id accepted on an upgrade request.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Router misconfiguration caught at build time.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The builder was finished without any endpoint; call `.with_ws()`
    /// before `.build()`.
    #[error("no endpoints configured; call .with_ws() first")]
    NoEndpoints,
}

/// Refusal of a WebSocket upgrade, before any channel exists.
///
/// Session ids become file stems for per-session state (reload caches,
/// transcripts) and keys in the session hub, so an upgrade carrying an id
/// that cannot serve as one is answered with a plain 400 instead of being
/// accepted and silently rewritten.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error("session id is empty")]
    EmptySessionId,

    #[error("session id exceeds {MAX_SESSION_ID_LEN} characters")]
    SessionIdTooLong,

    #[error("session id may only contain ASCII letters, digits, '-' and '_'")]
    SessionIdCharset,
}

impl IntoResponse for UpgradeError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Check a client-supplied session id before binding state to it.
pub fn validate_session_id(id: &str) -> Result<(), UpgradeError> {
    if id.is_empty() {
        return Err(UpgradeError::EmptySessionId);
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(UpgradeError::SessionIdTooLong);
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(UpgradeError::SessionIdCharset);
    }
    Ok(())
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
