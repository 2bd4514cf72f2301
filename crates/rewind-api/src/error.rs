//! Error types for the restore API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for API operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for API operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from the restore workflow
    #[error(transparent)]
    Restore(#[from] rewind_common::Error),

    /// Malformed request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Server could not start or stopped abnormally
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// HTTP status and Kubernetes-style reason for this error
    pub fn status(&self) -> (StatusCode, &'static str) {
        use rewind_common::Error as E;

        match self {
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            Error::Server(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            Error::Restore(e) => match e {
                E::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound"),
                E::OutOfRange { .. } => (StatusCode::BAD_REQUEST, "OutOfRange"),
                E::Validation { .. } => (StatusCode::BAD_REQUEST, "Invalid"),
                E::Conflict { .. } => (StatusCode::CONFLICT, "Conflict"),
                E::ExternalFailure { .. } => (StatusCode::BAD_GATEWAY, "ExternalFailure"),
                E::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, reason) = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, code = status.as_u16(), "request failed");
        }

        // Return K8s-style Status response
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": self.to_string(),
            "reason": reason,
            "code": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}
