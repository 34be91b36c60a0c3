//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use fulfillment::{ErrorKind, ServiceError};
use uuid::Uuid;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Error returned by a fulfillment service.
    Service(ServiceError),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Service(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                ErrorKind::InsufficientStock
                | ErrorKind::InvalidTransition
                | ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::ThirdParty => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal | ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if status.is_server_error() {
            // Server-side details stay in the log, keyed by the correlation id.
            let correlation_id = Uuid::new_v4();
            match &self {
                ApiError::Service(err) => tracing::error!(
                    %correlation_id,
                    error = %err,
                    source = ?std::error::Error::source(err),
                    "request failed"
                ),
                ApiError::Internal(msg) => {
                    tracing::error!(%correlation_id, error = %msg, "internal server error")
                }
                _ => {}
            }
            let message = if status == StatusCode::BAD_GATEWAY {
                "payment gateway error"
            } else {
                "internal server error"
            };
            serde_json::json!({ "error": message, "correlation_id": correlation_id })
        } else {
            let message = match self {
                ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
                ApiError::Service(err) => err.to_string(),
            };
            serde_json::json!({ "error": message })
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
