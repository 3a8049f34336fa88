//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_log::EventLogError;
use lifecycle::LifecycleError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Event log error.
    Log(EventLogError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Log(err) => log_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn log_error_to_response(err: EventLogError) -> (StatusCode, String) {
    match &err {
        EventLogError::InvalidEvent { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        EventLogError::AggregateNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        EventLogError::Serialization(_) => {
            tracing::error!(error = %err, "event serialization failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<EventLogError> for ApiError {
    fn from(err: EventLogError) -> Self {
        ApiError::Log(err)
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::UnknownAggregate(id) => {
                ApiError::NotFound(format!("No lifecycle for order {id}"))
            }
        }
    }
}
