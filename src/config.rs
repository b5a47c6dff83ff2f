//! # Configuration Module
//!
//! Runtime configuration for the bot: secrets and paths from the environment,
//! plus recovery settings for the generation call and image downloads.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// Constants for bot configuration
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_GENERATED_DIR: &str = "generated_images";
pub const DEFAULT_UPLOADED_DIR: &str = "uploaded_images";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Recovery configuration for external calls
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Total attempts for one generation request (first call included)
    pub max_attempts: u32,
    /// Fixed delay between attempts after a connection failure
    pub retry_delay: Duration,
    /// Connect timeout of the generation API client
    pub connect_timeout: Duration,
    /// Overall request timeout of the generation API client
    pub request_timeout: Duration,
    /// Timeout for fetching a generated image to archive it
    pub download_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            download_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set; add it to the environment or a .env file")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Configuration for the whole bot process
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub openai_api_key: String,
    pub api_base: String,
    pub image_model: String,
    pub generated_dir: PathBuf,
    pub uploaded_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_json: bool,
    pub cooldown: Duration,
    pub recovery: RecoveryConfig,
}

impl Config {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// `TELEGRAM_TOKEN` and `OPENAI_API_KEY` are required; blank values count
    /// as missing. Everything else falls back to a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let telegram_token =
            non_empty("TELEGRAM_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_TOKEN"))?;
        let openai_api_key =
            non_empty("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let cooldown = match non_empty("RATE_LIMIT_SECONDS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                    name: "RATE_LIMIT_SECONDS",
                    value: raw.clone(),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        };

        let log_json = non_empty("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            telegram_token,
            openai_api_key,
            api_base: non_empty("OPENAI_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            image_model: non_empty("IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            generated_dir: non_empty("GENERATED_IMAGES_DIR")
                .unwrap_or_else(|| DEFAULT_GENERATED_DIR.to_string())
                .into(),
            uploaded_dir: non_empty("UPLOADED_IMAGES_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOADED_DIR.to_string())
                .into(),
            log_dir: non_empty("LOG_DIR")
                .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
                .into(),
            log_json,
            cooldown,
            recovery: RecoveryConfig::default(),
        })
    }
}
