//! HTTP-facing error type
//!
//! Every error body has the shape
//! `{"error": {"code", "message", "details"?, "retryAfter"?}}`.

use crate::services::{ConfigurationError, ValidationError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Aggregated request validation failure (400)
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Provider configuration problem (422)
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Client exceeded its admission window (429)
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Configuration(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONFIGURATION_ERROR"),
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        };

        tracing::debug!(code, error = %message, "Request rejected");

        let mut error = json!({
            "code": code,
            "message": message,
        });
        match &self {
            ApiError::Validation(err) => {
                error["details"] = json!(err.errors);
            }
            ApiError::RateLimited { retry_after_secs } => {
                error["retryAfter"] = json!(retry_after_secs);
            }
            _ => {}
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
