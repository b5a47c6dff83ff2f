//! # Generation Error Types Module
//!
//! Typed failures of an image generation request, as classified by the API
//! client from the HTTP status and the structured error payload.

use thiserror::Error;

/// Error payload returned by the images endpoint
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Custom error types for image generation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The API throttled the request (HTTP 429)
    #[error("Rate limited by the image API: {0}")]
    RateLimited(String),
    /// The API could not be reached or did not answer in time
    #[error("Connection to the image API failed: {0}")]
    ConnectionFailed(String),
    /// The prompt was refused by the provider's safety system
    #[error("Prompt rejected by content policy: {0}")]
    ContentPolicyViolation(String),
    /// Any other API failure
    #[error("Image API error ({code}): {message}")]
    Api {
        status: Option<u16>,
        code: String,
        message: String,
    },
}

impl GenerationError {
    /// Only connection failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::ConnectionFailed(_))
    }

    /// Classify a non-success response of the images endpoint.
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<ApiErrorBody>(body)
            .map(|parsed| parsed.error)
            .unwrap_or_default();
        let message = if detail.message.is_empty() {
            format!("HTTP {status}")
        } else {
            detail.message.clone()
        };

        match detail.code.as_deref() {
            Some("content_policy_violation") => GenerationError::ContentPolicyViolation(message),
            Some("insufficient_quota") => GenerationError::Api {
                status: Some(status),
                code: "insufficient_quota".to_string(),
                message,
            },
            _ if status == 429 => GenerationError::RateLimited(message),
            code => GenerationError::Api {
                status: Some(status),
                code: code
                    .map(str::to_string)
                    .or(detail.kind)
                    .unwrap_or_else(|| format!("http_{status}")),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        // A request that never produced a status failed at the transport level
        let transport = err.status().is_none() && (err.is_request() || err.is_body());
        if err.is_connect() || err.is_timeout() || transport {
            GenerationError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            GenerationError::Api {
                status: err.status().map(|status| status.as_u16()),
                code: "invalid_response".to_string(),
                message: err.to_string(),
            }
        } else {
            GenerationError::Api {
                status: err.status().map(|status| status.as_u16()),
                code: "request_failed".to_string(),
                message: err.to_string(),
            }
        }
    }
}
