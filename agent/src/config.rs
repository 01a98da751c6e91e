//! Configuration management for the agent.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Loopback API host address
    pub host: String,
    /// Loopback API port
    pub port: u16,
    /// Remote REST API base URL
    pub api_base_url: String,
    /// SQLite store location
    pub database_url: String,
    /// Bearer token to start with, if already signed in
    pub auth_token: Option<String>,
    /// Path probed on the remote to decide connectivity
    pub probe_path: String,
    pub probe_interval: Duration,
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_var("PORT", 4010u16)?;

        let api_base_url = env::var("API_BASE_URL").map_err(|_| ConfigError::MissingApiBaseUrl)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://fieldsync.db".to_string());

        let auth_token = env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());

        let probe_path = env::var("PROBE_PATH").unwrap_or_else(|_| "/health".to_string());

        let probe_interval = Duration::from_secs(parse_var("PROBE_INTERVAL_SECS", 15u64)?);
        let request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 30u64)?);

        Ok(Self {
            host,
            port,
            api_base_url,
            database_url,
            auth_token,
            probe_path,
            probe_interval,
            request_timeout,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API_BASE_URL environment variable is required")]
    MissingApiBaseUrl,

    #[error("Invalid {name} value: {value:?}")]
    Invalid { name: &'static str, value: String },
}
