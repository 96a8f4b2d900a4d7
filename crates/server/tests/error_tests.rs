//! Error mapping tests.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use identity_broker::error::{FlowError, UpstreamError};

#[test]
fn test_status_mapping() {
    assert_eq!(
        FlowError::ClientInput("Missing state parameter").status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        FlowError::NotFound("Invalid code parameter").status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        FlowError::Internal("disk full".into()).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_public_message_hides_internal_detail() {
    let err = FlowError::Internal("relation \"user_token\" does not exist".into());
    assert_eq!(err.public_message(), "Internal server error");
    assert!(err.to_string().contains("user_token"));

    let err = FlowError::NotFound("Invalid session cookie");
    assert_eq!(err.public_message(), "Invalid session cookie");
}

#[test]
fn test_db_errors_become_internal() {
    let err: FlowError = sea_orm::DbErr::Custom("boom".into()).into();
    assert!(matches!(err, FlowError::Internal(_)));
}

#[test]
fn test_upstream_error_display() {
    let err = UpstreamError::Timeout(std::time::Duration::from_secs(10));
    assert!(err.to_string().contains("10s"));

    let err = UpstreamError::InvalidAssertion("missing email claim".into());
    assert_eq!(
        err.to_string(),
        "Invalid identity assertion: missing email claim"
    );
}

#[tokio::test]
async fn test_into_response_is_plain_text() {
    let response = FlowError::ClientInput("Mismatch state").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    assert_eq!(&body[..], b"Mismatch state");
}
