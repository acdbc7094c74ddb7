//! Configuration module for the notification service.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file holding the watermarks
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Base URL of the alerting REST backend, without the `/api` suffix
    pub backend_url: String,
    /// Bearer token sent to the backend, if any
    pub backend_token: Option<String>,
    /// Interval between periodic reconciliation cycles
    pub poll_interval: Duration,
    /// Timeout applied to every backend request
    pub fetch_timeout: Duration,
    /// A dashboard nobody has read for this long is unmounted
    pub dashboard_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("ALERTE_API_PSK").ok().filter(|s| !s.is_empty());

        let db_path = env::var("ALERTE_DB_PATH")
            .unwrap_or_else(|_| "./data/alerte.sqlite".to_string())
            .into();

        let bind_addr = env::var("ALERTE_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid ALERTE_BIND_ADDR: {}", e)))?;

        let log_level = env::var("ALERTE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("ALERTE_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("text") | Err(_) => LogFormat::Text,
            Ok(other) => {
                return Err(AppError::Config(format!(
                    "Invalid ALERTE_LOG_FORMAT: {} (expected text or json)",
                    other
                )))
            }
        };

        let backend_url = env::var("ALERTE_BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        let backend_token = env::var("ALERTE_BACKEND_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());

        let poll_interval = Duration::from_secs(parse_secs("ALERTE_POLL_INTERVAL_SECS", 30)?);
        let fetch_timeout = Duration::from_secs(parse_secs("ALERTE_FETCH_TIMEOUT_SECS", 10)?);
        let dashboard_ttl = Duration::from_secs(parse_secs("ALERTE_DASHBOARD_TTL_SECS", 300)?);

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_format,
            backend_url,
            backend_token,
            poll_interval,
            fetch_timeout,
            dashboard_ttl,
        })
    }
}

/// Read a positive number of seconds from `var`, or `default` when unset.
fn parse_secs(var: &str, default: u64) -> Result<u64, AppError> {
    match env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(AppError::Config(format!("{} must be greater than 0", var))),
            Ok(secs) => Ok(secs),
            Err(e) => Err(AppError::Config(format!("Invalid {}: {}", var, e))),
        },
    }
}
