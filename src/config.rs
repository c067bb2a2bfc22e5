//! Environment configuration
//!
//! Everything is read once at startup. A missing API key is fatal; every
//! other setting has a default.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DB_PATH: &str = "memory.sqlite";
pub const DEFAULT_THREAD_ID: &str = "recipe-assistant-1";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("GENAI_API_KEY not set in environment or .env file")]
    MissingApiKey,
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidDuration { var: &'static str, value: String },
}

/// Credentials and model names for the Gemini API
#[derive(Debug, Clone)]
pub struct GenAiConfig {
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub base_url: String,
}

/// Deployment mode, selected by `ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Checkpoints and feedback go to SQLite
    Production,
    /// Everything stays in process memory
    Development,
}

impl Environment {
    fn from_value(value: Option<&str>) -> Self {
        match value {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_durable(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub genai: GenAiConfig,
    pub environment: Environment,
    pub db_path: PathBuf,
    pub thread_id: String,
    pub request_timeout: Duration,
    pub store_timeout: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary lookup, so tests need not touch the real environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("GENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            genai: GenAiConfig {
                api_key,
                model: non_empty("GENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                embedding_model: non_empty("GENAI_EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                base_url: non_empty("GENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
            environment: Environment::from_value(lookup("ENV").as_deref()),
            db_path: non_empty("RECIPE_DB_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from),
            thread_id: non_empty("RECIPE_THREAD_ID")
                .unwrap_or_else(|| DEFAULT_THREAD_ID.to_string()),
            request_timeout: parse_secs(
                "RECIPE_REQUEST_TIMEOUT_SECS",
                non_empty("RECIPE_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            store_timeout: parse_secs(
                "RECIPE_STORE_TIMEOUT_SECS",
                non_empty("RECIPE_STORE_TIMEOUT_SECS"),
                DEFAULT_STORE_TIMEOUT_SECS,
            )?,
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        })
    }

    /// Override the thread id, e.g. from the command line
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }
}

fn parse_secs(
    var: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidDuration { var, value: raw }),
        },
    }
}
