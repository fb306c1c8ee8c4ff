//! Error types for the Reportgate service.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::http::ApiResponse;

/// Main error type for Reportgate operations.
#[derive(Error, Debug)]
pub enum ReportGateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The submitted email address is malformed
    #[error("Invalid email address: {0}")]
    Validation(String),

    /// The client has used up its quota for the current window
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// I/O errors from the state file or the download log
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Malformed persisted state
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Mail delivery errors
    #[error("Mail error: {0}")]
    Mail(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportGateError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReportGateError::Validation(_) => StatusCode::BAD_REQUEST,
            ReportGateError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Internal details never leave the process.
    pub fn public_message(&self) -> &'static str {
        match self {
            ReportGateError::Validation(_) => "Please provide a valid email address.",
            ReportGateError::RateLimited { .. } => {
                "Too many download requests. Please try again later."
            }
            _ => "An unexpected error occurred. Please try again later.",
        }
    }
}

impl IntoResponse for ReportGateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ApiResponse::failure(self.public_message());
        let mut response = (status, axum::Json(body)).into_response();

        if let ReportGateError::RateLimited { retry_after } = &self {
            // Round up so clients never retry a moment too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result type alias for Reportgate operations.
pub type Result<T> = std::result::Result<T, ReportGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ReportGateError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ReportGateError::RateLimited { retry_after: Duration::from_secs(1) }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ReportGateError::Mail("smtp down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_not_public() {
        let err = ReportGateError::Internal("database password wrong".into());
        assert!(!err.public_message().contains("password"));
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let err = ReportGateError::RateLimited {
            retry_after: Duration::from_millis(1500),
        };
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }
}
