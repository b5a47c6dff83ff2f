//! # Image Request Dispatcher
//!
//! Builds a generation request with the bot's fixed size and quality, runs it
//! through an [`ImageGenerator`] and retries connection failures a bounded
//! number of times with a fixed delay.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RecoveryConfig;
use crate::generation_errors::GenerationError;

/// Longest prompt the images endpoint accepts for DALL-E 3
pub const MAX_PROMPT_LENGTH: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    Square1024,
    #[serde(rename = "1792x1024")]
    Landscape,
    #[serde(rename = "1024x1792")]
    Portrait,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImageSize::Square1024 => "1024x1024",
            ImageSize::Landscape => "1792x1024",
            ImageSize::Portrait => "1024x1792",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Standard,
    Hd,
}

/// One prompt submitted to the generation API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub size: ImageSize,
    pub quality: ImageQuality,
}

impl GenerationRequest {
    /// Request with the bot's fixed parameters (1024x1024, standard quality)
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: ImageSize::Square1024,
            quality: ImageQuality::Standard,
        }
    }
}

/// Validates a free-text prompt before it is dispatched
pub fn validate_prompt(prompt: &str) -> Result<String, &'static str> {
    let trimmed = prompt.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > MAX_PROMPT_LENGTH {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}

/// Successful generation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    /// Model-rewritten version of the submitted prompt, when the model returns one
    pub revised_prompt: Option<String>,
}

/// Backend able to turn a prompt into an image URL
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerationError>;
}

/// Dispatches generation requests with bounded retry
pub struct GenerationDispatcher {
    generator: Arc<dyn ImageGenerator>,
    recovery: RecoveryConfig,
}

impl GenerationDispatcher {
    pub fn new(generator: Arc<dyn ImageGenerator>, recovery: RecoveryConfig) -> Self {
        Self {
            generator,
            recovery,
        }
    }

    /// Generate one image for `prompt`.
    ///
    /// Connection failures are retried until `max_attempts` calls have been
    /// made, sleeping `retry_delay` between attempts. Every other error is
    /// returned after the first attempt.
    pub async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let request = GenerationRequest::new(prompt);
        let max_attempts = self.recovery.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(attempt, max_attempts, size = %request.size, "Submitting image generation request");

            match self.generator.generate(&request).await {
                Ok(image) => {
                    if attempt > 1 {
                        info!(attempt, "Image generation succeeded after retry");
                    }
                    return Ok(image);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        delay_ms = self.recovery.retry_delay.as_millis() as u64,
                        "Image generation connection failed, retrying"
                    );
                    tokio::time::sleep(self.recovery.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Image generation failed");
                    return Err(e);
                }
            }
        }
    }
}
