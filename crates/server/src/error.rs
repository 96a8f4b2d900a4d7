use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures talking to the upstream identity provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Timeout after {0:?} while exchanging upstream code")]
    Timeout(std::time::Duration),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP status {status} from upstream token endpoint")]
    Http { status: StatusCode },
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
    #[error("Invalid identity assertion: {0}")]
    InvalidAssertion(String),
}

/// Errors raised by a flow transition.
///
/// `ClientInput` and `NotFound` render identically so callers cannot tell an
/// expired or consumed record apart from one that never existed.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{0}")]
    ClientInput(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    pub fn status(&self) -> StatusCode {
        match self {
            FlowError::ClientInput(_) | FlowError::NotFound(_) => StatusCode::BAD_REQUEST,
            FlowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The text shown to the caller. Never carries internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            FlowError::ClientInput(msg) | FlowError::NotFound(msg) => msg,
            FlowError::Internal(_) => "Internal server error",
        }
    }
}

impl From<sea_orm::DbErr> for FlowError {
    fn from(err: sea_orm::DbErr) -> Self {
        FlowError::Internal(err.to_string())
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        match &self {
            FlowError::Internal(detail) => tracing::error!(error = %detail, "internal error"),
            _ => tracing::debug!(error = %self, "rejected request"),
        }
        (self.status(), self.public_message()).into_response()
    }
}
