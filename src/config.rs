//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `BSCTL_URL`, `BSCTL_USERNAME`,
//!    `BSCTL_PASSWORD`, `BSCTL_LOG_PATH`
//! 2. **Config file** — path via `--config <path>`, or `bsctl.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! url = "http://127.0.0.1:55414"
//! endpoint = "x"
//! username = "admin"
//! password = "shared-secret"
//! connect_timeout_ms = 10000
//! request_timeout_ms = 30000
//!
//! [auth]
//! session_ttl_secs = 1800
//! salt_attempts = 3
//! salt_retry_delay_ms = 500
//!
//! [logs]
//! path = "/var/log/urbackup.log"
//! tail_lines = 200
//! pattern = "% finished"
//! timeout_ms = 5000
//!
//! [status]
//! online_window_secs = 600
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote control API location and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the backup server web interface.
    #[serde(default = "default_url")]
    pub url: String,
    /// Path of the single control endpoint, relative to `url` (default `x`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Account used for the salt/login handshake. Override with `BSCTL_USERNAME`.
    #[serde(default = "default_username")]
    pub username: String,
    /// Shared secret. Override with `BSCTL_PASSWORD`. Empty triggers a startup warning.
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound for a whole request including the body read.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Session handshake tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a cached session from acquisition (default 30 minutes).
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Salt requests before giving up with `AuthUnavailable` (default 3).
    #[serde(default = "default_salt_attempts")]
    pub salt_attempts: u32,
    #[serde(default = "default_salt_retry_delay_ms")]
    pub salt_retry_delay_ms: u64,
}

/// System log tail used for per-file transfer detail.
#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    /// Log file to tail. Override with `BSCTL_LOG_PATH`.
    #[serde(default = "default_log_path")]
    pub path: String,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Only lines containing this substring are considered.
    #[serde(default = "default_log_pattern")]
    pub pattern: String,
    #[serde(default = "default_log_timeout_ms")]
    pub timeout_ms: u64,
}

/// Client status classification.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// A client seen within this many seconds counts as online (default 600).
    #[serde(default = "default_online_window_secs")]
    pub online_window_secs: i64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Failure to read or parse a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

fn default_url() -> String {
    "http://127.0.0.1:55414".to_string()
}
fn default_endpoint() -> String {
    "x".to_string()
}
fn default_username() -> String {
    "admin".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_session_ttl_secs() -> u64 {
    30 * 60
}
fn default_salt_attempts() -> u32 {
    3
}
fn default_salt_retry_delay_ms() -> u64 {
    500
}
fn default_log_path() -> String {
    "/var/log/urbackup.log".to_string()
}
fn default_tail_lines() -> usize {
    200
}
fn default_log_pattern() -> String {
    "% finished".to_string()
}
fn default_log_timeout_ms() -> u64 {
    5000
}
fn default_online_window_secs() -> i64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            endpoint: default_endpoint(),
            username: default_username(),
            password: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            salt_attempts: default_salt_attempts(),
            salt_retry_delay_ms: default_salt_retry_delay_ms(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            tail_lines: default_tail_lines(),
            pattern: default_log_pattern(),
            timeout_ms: default_log_timeout_ms(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            online_window_secs: default_online_window_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `bsctl.toml` in the
    /// current directory is used when present, falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("bsctl.toml").exists() => Self::from_file("bsctl.toml")?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Apply env var overrides through `lookup`, so tests need not touch the process env.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("BSCTL_URL") {
            self.server.url = url;
        }
        if let Some(username) = lookup("BSCTL_USERNAME") {
            self.server.username = username;
        }
        if let Some(password) = lookup("BSCTL_PASSWORD") {
            self.server.password = password;
        }
        if let Some(path) = lookup("BSCTL_LOG_PATH") {
            self.logs.path = path;
        }
    }
}
