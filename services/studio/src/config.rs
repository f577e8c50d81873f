//! services/studio/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

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
    /// Backend origin, e.g. `https://studio.example.com`. The `/api/v1`
    /// prefix is added by the HTTP adapter.
    pub api_base_url: String,
    pub log_level: Level,
    pub session_path: PathBuf,
    pub request_timeout: Duration,
    pub generation_timeout: Duration,
    pub upload_timeout: Duration,
    pub cache_stale_time: Duration,
    pub refresh_check_interval: Duration,
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

        let api_base_url = std::env::var("STUDIO_API_URL")
            .map_err(|_| ConfigError::MissingVar("STUDIO_API_URL".to_string()))?;
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "STUDIO_API_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let session_path = std::env::var("STUDIO_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.studio-session.json"));

        // --- Timeouts & Cache Windows ---
        let request_timeout = seconds_var("STUDIO_REQUEST_TIMEOUT_SECS", 10)?;
        let generation_timeout = seconds_var("STUDIO_GENERATION_TIMEOUT_SECS", 30)?;
        let upload_timeout = seconds_var("STUDIO_UPLOAD_TIMEOUT_SECS", 60)?;
        let cache_stale_time = seconds_var("STUDIO_CACHE_STALE_SECS", 300)?;
        let refresh_check_interval = seconds_var("STUDIO_REFRESH_CHECK_SECS", 300)?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            log_level,
            session_path,
            request_timeout,
            generation_timeout,
            upload_timeout,
            cache_stale_time,
            refresh_check_interval,
        })
    }
}

fn seconds_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_var_falls_back_to_default() {
        let value = seconds_var("STUDIO_TEST_UNSET_TIMEOUT_SECS", 42).unwrap();
        assert_eq!(value, Duration::from_secs(42));
    }

    #[test]
    fn seconds_var_rejects_garbage() {
        std::env::set_var("STUDIO_TEST_BAD_TIMEOUT_SECS", "soon");
        let err = seconds_var("STUDIO_TEST_BAD_TIMEOUT_SECS", 5).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "STUDIO_TEST_BAD_TIMEOUT_SECS"));
    }
}
