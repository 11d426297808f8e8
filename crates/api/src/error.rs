//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::MoneyError;
use services::ServiceError;

use crate::dto::Envelope;

/// API-level error type that maps to HTTP responses.
///
/// Every variant renders as the `{success: false, message}` envelope.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request or a business rule the request breaks.
    BadRequest(String),
    /// Missing, invalid or expired credentials.
    Unauthorized(String),
    /// Resource not found.
    NotFound(String),
    /// Invalid status transition or a concurrent modification.
    Conflict(String),
    /// Internal server error. The detail is logged, never returned.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg,
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                "Internal server error".to_string()
            }
        };

        (status, Envelope::<()>::failure(message)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::Validation(_)
            | ServiceError::InsufficientStock { .. }
            | ServiceError::InvalidQuantity(_)
            | ServiceError::CurrencyMismatch(_) => ApiError::BadRequest(err.to_string()),
            ServiceError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ServiceError::InvalidTransition(_) | ServiceError::Conflict(_) => {
                ApiError::Conflict(err.to_string())
            }
            ServiceError::Store(store) => ApiError::Internal(store.to_string()),
        }
    }
}

impl From<MoneyError> for ApiError {
    fn from(err: MoneyError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
