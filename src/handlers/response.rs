//! # ASR Response Payload
//!
//! Every `POST /asr` request ends in exactly one of these two JSON shapes:
//!
//! ```json
//! { "success": true, "text": "recognized text" }
//! { "success": false, "error": "file too large: ...", "code": "payload_too_large" }
//! ```
//!
//! `error` is diagnostic text for humans; `code` is the stable value to branch on.

use crate::error::PipelineError;
use serde::Serialize;

/// The success-or-failure payload. Fields are private so the two shapes can
/// only be produced through [`AsrResponse::success`] and [`AsrResponse::failure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsrResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl AsrResponse {
    pub fn success(text: String) -> Self {
        Self {
            success: true,
            text: Some(text),
            error: None,
            code: None,
        }
    }

    pub fn failure(err: &PipelineError) -> Self {
        Self {
            success: false,
            text: None,
            error: Some(err.to_string()),
            code: Some(err.code()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Fold a pipeline outcome into the response payload.
pub fn build(outcome: Result<String, PipelineError>) -> AsrResponse {
    match outcome {
        Ok(text) => AsrResponse::success(text),
        Err(err) => AsrResponse::failure(&err),
    }
}
