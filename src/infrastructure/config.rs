//! Configuration management for the reactor core
//!
//! Loads configuration from config.toml at startup.
//! Every field has a default so a partial (or missing) file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Dispatcher and worker settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Log sink settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Dispatcher and worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Worker threads in the pool
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Idle time before a connection is closed (milliseconds)
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Readiness events fetched per poll
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Capacity of the expired-descriptor queue between timer callbacks and the loop
    #[serde(default = "default_expired_queue_capacity")]
    pub expired_queue_capacity: usize,
}

/// Log rotation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Log sink configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Disable to skip installing the sink entirely
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,

    /// Directory for log files
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// File name prefix
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,

    /// Lines buffered between producers and the writer thread
    #[serde(default = "default_log_queue_capacity")]
    pub queue_capacity: usize,

    /// Start a new file after this many lines
    #[serde(default = "default_split_lines")]
    pub split_lines: u64,

    #[serde(default)]
    pub rotation: LogRotation,

    /// `EnvFilter` directive, e.g. "info" or "reactor_core=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            connection_timeout_ms: default_connection_timeout_ms(),
            max_events: default_max_events(),
            expired_queue_capacity: default_expired_queue_capacity(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            directory: default_log_directory(),
            file_prefix: default_log_prefix(),
            queue_capacity: default_log_queue_capacity(),
            split_lines: default_split_lines(),
            rotation: LogRotation::default(),
            level: default_log_level(),
        }
    }
}

fn default_worker_threads() -> usize {
    crate::infrastructure::thread_pool::DEFAULT_WORKERS
}

fn default_connection_timeout_ms() -> u64 {
    60_000
}

fn default_max_events() -> usize {
    1024
}

fn default_expired_queue_capacity() -> usize {
    1024
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_prefix() -> String {
    "server".to_string()
}

fn default_log_queue_capacity() -> usize {
    1024
}

fn default_split_lines() -> u64 {
    5_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from config.toml file
    ///
    /// The path comes from `CONFIG_PATH`, defaulting to `config.toml`.
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Connection idle timeout as a `Duration`
    #[inline]
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.server.connection_timeout_ms)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.worker_threads, 8);
        assert_eq!(config.server.max_events, 1024);
        assert_eq!(config.connection_timeout(), std::time::Duration::from_secs(60));
        assert_eq!(config.log.directory, PathBuf::from("logs"));
        assert_eq!(config.log.rotation, LogRotation::Daily);
        assert_eq!(config.log.split_lines, 5_000_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            worker_threads = 2

            [log]
            rotation = "hourly"
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.worker_threads, 2);
        assert_eq!(config.server.connection_timeout_ms, 60_000);
        assert_eq!(config.log.rotation, LogRotation::Hourly);
        assert_eq!(config.log.level, "debug");
        assert!(config.log.enabled);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[server]\nworker_threads = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
