//! Top-level error types for switchboard
//!
//! This module provides a flattened, user-facing error type over the
//! per-module error hierarchy, categorized by how callers handle them.

use thiserror::Error;

use crate::agent::AgentError;
use crate::limiter::AcquireError;
use crate::transport::TransportError;
use crate::windows::StateError;

/// Top-level error type for switchboard operations
///
/// - [`Error::Capacity`] - the agent limiter is exhausted; surface to the
///   user and end the turn
/// - [`Error::Transport`] - provider unreachable or stream failure; surface
///   and end the turn
/// - [`Error::Cancelled`] - expected during interrupt/shutdown; never
///   user-visible as an error
/// - [`Error::Protocol`] - malformed client frame; connection-scoped
/// - [`Error::State`] - invalid window mutation; returned to the invoking
///   tool as a structured result
/// - [`Error::Persistence`] - reload cache or transcript I/O; logged only
#[derive(Debug, Error)]
pub enum Error {
    /// Agent limit reached (and no wait allowed, or the wait timed out)
    #[error("agent limit reached: {0}")]
    Capacity(String),

    /// Provider unreachable, unauthenticated, or stream failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The turn was interrupted or the session is shutting down
    #[error("cancelled")]
    Cancelled,

    /// Malformed client frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid window-state mutation
    #[error("state error: {0}")]
    State(String),

    /// Cache or transcript read/write failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Capacity(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// True when the failure should reach the client as an `ERROR` event.
    ///
    /// Cancellation ends a turn silently; persistence failures are logged
    /// and never surfaced.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::Capacity(_) | Self::Transport(_) | Self::Protocol(_) | Self::Other(_)
        )
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<AcquireError> for Error {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Exhausted => Self::Capacity("agent limit reached".to_string()),
            AcquireError::TimedOut => Self::Capacity("timed out waiting for a slot".to_string()),
            AcquireError::Shutdown(_) => Self::Cancelled,
        }
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        Self::State(err.to_string())
    }
}

impl From<AgentError> for Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Capacity(e) => e.into(),
            AgentError::Transport(e) => e.into(),
            AgentError::Interrupted => Self::Cancelled,
        }
    }
}

/// Result type for switchboard operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visibility() {
        assert!(Error::Capacity("full".into()).is_user_visible());
        assert!(Error::Transport("down".into()).is_user_visible());
        assert!(!Error::Cancelled.is_user_visible());
        assert!(!Error::State("no such window".into()).is_user_visible());
        assert!(!Error::Persistence("disk".into()).is_user_visible());
    }

    #[test]
    fn test_from_acquire_error() {
        let err: Error = AcquireError::Exhausted.into();
        assert!(err.is_capacity());

        let err: Error = AcquireError::TimedOut.into();
        assert!(err.is_capacity());

        let err: Error = AcquireError::Shutdown("bye".into()).into();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_from_state_error() {
        let err: Error = StateError::UnknownWindow("w9".into()).into();
        assert!(err.is_state());
    }
}
