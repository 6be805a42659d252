use crate::services::ServiceError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Map a service failure, logging server-side failures with their context.
    ///
    /// Missing avatars and missing blobs share one generic 404 body.
    pub fn from_service(err: ServiceError, operation: &'static str, identifier: &str) -> Self {
        let app_err = match &err {
            ServiceError::NotFound(_) | ServiceError::FileNotFound(_) => {
                Self::not_found("not found")
            }
            ServiceError::UploadSessionNotFound => Self::not_found(err.to_string()),
            ServiceError::InvalidCallback(_) => Self::bad_request(err.to_string()),
            ServiceError::AlreadyExists(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            ServiceError::Timeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "storage timed out")
            }
            ServiceError::Store(_) | ServiceError::Gateway(_) => {
                Self::internal("internal storage error")
            }
        };

        if app_err.status.is_server_error() {
            tracing::error!(operation, identifier, error = %err, "request failed");
        } else {
            tracing::debug!(operation, identifier, error = %err, "request rejected");
        }
        app_err
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
