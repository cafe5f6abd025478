//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **PipelineError**: everything that can go wrong while turning one uploaded
//!   WAV file into text. These never become HTTP error statuses; the ASR handler
//!   folds them into a `{ "success": false, ... }` payload.
//! - **AppError**: errors for the rest of the service (configuration, unknown
//!   routes). These implement actix's `ResponseError` and map to real status codes.
//!
//! ## Key Rust Concepts:
//! - **thiserror**: derives `Display` and `std::error::Error` from `#[error(...)]` attributes
//! - **ResponseError trait**: converts errors to HTTP responses
//! - **From trait**: lets `?` convert foreign errors automatically

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures of the upload → transcript pipeline.
///
/// ## Stable Codes:
/// The `Display` text is a human-readable diagnostic and may change between
/// releases. Clients that need to branch on the failure kind should use
/// [`PipelineError::code`], which is stable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The multipart body carried no file part at all.
    #[error("no audio file received")]
    EmptyUpload,

    /// The streamed upload grew past the configured ceiling.
    #[error("file too large: {received} bytes received, limit is {limit} bytes")]
    PayloadTooLarge { limit: usize, received: usize },

    /// The buffer is too short to hold a canonical WAV header.
    #[error("truncated WAV header: got {len} bytes, need at least {required}")]
    TruncatedHeader { len: usize, required: usize },

    /// The recognition engine reported an error.
    #[error("recognition failed: {0}")]
    RecognitionFailure(String),

    /// Anything unanticipated (broken upload stream, cancelled worker, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Machine-readable code for this failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::EmptyUpload => "empty_upload",
            PipelineError::PayloadTooLarge { .. } => "payload_too_large",
            PipelineError::TruncatedHeader { .. } => "truncated_header",
            PipelineError::RecognitionFailure(_) => "recognition_failure",
            PipelineError::Internal(_) => "internal_error",
        }
    }
}

/// Service-level errors that are answered with a real HTTP status.
///
/// ## Error Categories:
/// - **NotFound**: no route matched the request (404)
/// - **ConfigError**: configuration could not be loaded or failed validation (500)
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::ConfigError("Server port cannot be 0".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Requested route does not exist
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Lets `anyhow` wrap an `AppError` with `?` during startup.
impl std::error::Error for AppError {}

/// Implementation of the ResponseError trait for AppError.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "not_found",
///     "message": "GET /nope",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Automatic conversion from configuration errors to AppError.
///
/// ## When this happens:
/// - config.toml file has invalid syntax
/// - An environment variable cannot be parsed into the target field type
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use the service error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_pipeline_codes_are_stable() {
        assert_eq!(PipelineError::EmptyUpload.code(), "empty_upload");
        assert_eq!(
            PipelineError::PayloadTooLarge { limit: 1, received: 2 }.code(),
            "payload_too_large"
        );
        assert_eq!(
            PipelineError::TruncatedHeader { len: 40, required: 44 }.code(),
            "truncated_header"
        );
        assert_eq!(
            PipelineError::RecognitionFailure("boom".into()).code(),
            "recognition_failure"
        );
        assert_eq!(PipelineError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn test_pipeline_messages_are_readable() {
        let err = PipelineError::TruncatedHeader { len: 40, required: 44 };
        assert_eq!(
            err.to_string(),
            "truncated WAV header: got 40 bytes, need at least 44"
        );
    }

    #[actix_web::test]
    async fn test_not_found_response() {
        let response = AppError::NotFound("GET /nope".to_string()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "not_found");
        assert_eq!(json["error"]["message"], "GET /nope");
    }
}
