//! Tests for server error types and upgrade validation.

use axum::response::IntoResponse;

use crate::error::{validate_session_id, BuildError, UpgradeError, MAX_SESSION_ID_LEN};

#[test]
fn test_build_error_names_the_missing_call() {
    assert!(BuildError::NoEndpoints.to_string().contains(".with_ws()"));
}

#[test]
fn test_session_id_validation() {
    assert!(validate_session_id("demo-session_01").is_ok());
    assert!(validate_session_id(&"a".repeat(MAX_SESSION_ID_LEN)).is_ok());

    assert_eq!(
        validate_session_id(""),
        Err(UpgradeError::EmptySessionId)
    );
    assert_eq!(
        validate_session_id(&"a".repeat(MAX_SESSION_ID_LEN + 1)),
        Err(UpgradeError::SessionIdTooLong)
    );
    for bad in ["../etc", "sess ion", "sess.json", "sess\u{2764}"] {
        assert_eq!(
            validate_session_id(bad),
            Err(UpgradeError::SessionIdCharset),
            "accepted {:?}",
            bad
        );
    }
}

#[test]
fn test_upgrade_refusal_is_a_400() {
    let response = UpgradeError::SessionIdCharset.into_response();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}
