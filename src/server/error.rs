//! API error types and response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No envelope with the requested id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An ingestion run is already in progress.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The upstream source could not be reached.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Storage or consistency failure.
    #[error("internal error: {0}")]
    Internal(crate::Error),
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Upstream { .. } | crate::Error::Http(_) => Self::Upstream(err.to_string()),
            crate::Error::IngestInProgress { .. } => Self::Conflict(err.to_string()),
            other => Self::Internal(other),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            Self::Upstream(msg) => {
                tracing::error!(error = %msg, "upstream error");
                (StatusCode::BAD_GATEWAY, "upstream_error", msg.clone())
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
