//! services/agent/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use uuid::Uuid;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub log_level: Level,
    /// The authenticated identity whose profile and tasks this agent manages.
    pub user_id: Uuid,
    pub graph_base_url: String,
    pub graph_access_token: String,
    pub openai_api_key: String,
    pub classifier_model: String,
    pub validator_model: String,
    pub tts_voice: String,
    pub watermark_path: PathBuf,
    pub poll_interval: Duration,
    pub message_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Database and Identity Settings ---
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let user_id_str = std::env::var("USER_ID")
            .map_err(|_| ConfigError::MissingVar("USER_ID".to_string()))?;
        let user_id = user_id_str
            .parse::<Uuid>()
            .map_err(|e| ConfigError::InvalidValue("USER_ID".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Message Source Settings ---
        let graph_base_url = std::env::var("GRAPH_BASE_URL")
            .unwrap_or_else(|_| "https://graph.microsoft.com/v1.0".to_string());
        let graph_access_token = std::env::var("GRAPH_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingVar("GRAPH_ACCESS_TOKEN".to_string()))?;

        // --- Load Model Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let classifier_model =
            std::env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let validator_model =
            std::env::var("VALIDATOR_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());

        // --- Load Pipeline Pacing Settings ---
        let watermark_path = std::env::var("WATERMARK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./watermark.json"));

        let poll_interval = parse_secs("POLL_INTERVAL_SECS", 300)?;
        let message_delay = parse_secs("MESSAGE_DELAY_SECS", 5)?;

        Ok(Self {
            database_url,
            log_level,
            user_id,
            graph_base_url,
            graph_access_token,
            openai_api_key,
            classifier_model,
            validator_model,
            tts_voice,
            watermark_path,
            poll_interval,
            message_delay,
        })
    }
}

fn parse_secs(var: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
