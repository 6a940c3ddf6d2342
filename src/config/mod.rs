//! Configuration management for mongocursor
//!
//! This module handles loading, parsing, and validating configuration from:
//! - Configuration files (TOML format)
//! - Environment variables prefixed with `MONGOCURSOR_`
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::options::{CursorFlag, CursorOptions};

/// Prefix of every environment variable read by [`Config::apply_env`].
pub const ENV_PREFIX: &str = "MONGOCURSOR_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Cursor defaults
    #[serde(default)]
    pub cursor: CursorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Number of connection attempts before giving up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between connection attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Defaults applied to every cursor the binary opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Documents per batch (server default when unset)
    #[serde(default)]
    pub batch_size: Option<u32>,

    /// Server-side time limit for the initial command
    #[serde(default)]
    pub max_time_ms: Option<u64>,

    /// getMore wait time for tailable awaitData cursors
    #[serde(default)]
    pub max_await_time_ms: Option<u64>,

    /// Ask the server not to time out idle cursors
    #[serde(default = "default_no_cursor_timeout")]
    pub no_cursor_timeout: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_no_cursor_timeout() -> bool {
    false
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    false
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            max_time_ms: None,
            max_await_time_ms: None,
            no_cursor_timeout: default_no_cursor_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFormat(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load configuration from every source with proper precedence
    ///
    /// An explicit `path` must exist; the default path is optional.
    ///
    /// # Arguments
    /// * `path` - Configuration file to read instead of the default one
    ///
    /// # Returns
    /// * `Result<Config>` - Merged and validated configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override values from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(std::env::vars())
    }

    /// Override values from `MONGOCURSOR_*` variables
    ///
    /// Recognized: `URI`, `BATCH_SIZE`, `MAX_TIME_MS`, `LOG_LEVEL`.
    /// Other variables are ignored.
    pub fn apply_env_from<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();

            match name {
                "URI" => self.connection.uri = value.to_string(),
                "BATCH_SIZE" => self.cursor.batch_size = Some(parse_env(key.as_ref(), value)?),
                "MAX_TIME_MS" => self.cursor.max_time_ms = Some(parse_env(key.as_ref(), value)?),
                "LOG_LEVEL" => self.logging.level = parse_env(key.as_ref(), value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - `~/.mongocursor/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongocursor")
            .join("config.toml")
    }

    /// Save configuration to a file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        self.connection.validate_uri()?;

        if self.connection.retry_attempts == 0 {
            return Err(invalid("connection.retry_attempts", "0"));
        }
        if self.cursor.batch_size == Some(0) {
            return Err(invalid("cursor.batch_size", "0"));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(field: &str, value: &str) -> crate::error::CursorError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl ConnectionConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Get delay between connection attempts as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Check that the URI uses a MongoDB scheme and names a host
    ///
    /// # Returns
    /// * `Result<()>` - Ok if URI is valid, error otherwise
    pub fn validate_uri(&self) -> Result<()> {
        let rest = self
            .uri
            .strip_prefix("mongodb://")
            .or_else(|| self.uri.strip_prefix("mongodb+srv://"));

        match rest {
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
            _ => Err(invalid("connection.uri", &self.uri)),
        }
    }
}

impl From<&CursorConfig> for CursorOptions {
    fn from(config: &CursorConfig) -> Self {
        let mut options = CursorOptions::new();
        options.batch_size = config.batch_size;
        options.max_time_ms = config.max_time_ms;
        options.max_await_time_ms = config.max_await_time_ms;
        options
            .flags
            .set(CursorFlag::NoCursorTimeout, config.no_cursor_timeout);
        options
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CursorError;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.connection.retry_attempts, 3);
        assert_eq!(config.cursor.batch_size, None);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_durations() {
        let connection = ConnectionConfig {
            timeout: 5,
            retry_delay_ms: 250,
            ..ConnectionConfig::default()
        };
        assert_eq!(connection.connect_timeout(), Duration::from_secs(5));
        assert_eq!(connection.retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cursor]
            batch_size = 50

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.cursor.batch_size, Some(50));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_from([
                ("MONGOCURSOR_URI", "mongodb://db.internal:27018"),
                ("MONGOCURSOR_BATCH_SIZE", "25"),
                ("MONGOCURSOR_LOG_LEVEL", "TRACE"),
                ("HOME", "/root"),
            ])
            .unwrap();

        assert_eq!(config.connection.uri, "mongodb://db.internal:27018");
        assert_eq!(config.cursor.batch_size, Some(25));
        assert_eq!(config.logging.level, LogLevel::Trace);
    }

    #[test]
    fn test_env_rejects_bad_number() {
        let mut config = Config::default();
        let err = config
            .apply_env_from([("MONGOCURSOR_MAX_TIME_MS", "soon")])
            .unwrap_err();
        assert!(matches!(
            err,
            CursorError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.connection.uri = "http://localhost".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cursor.batch_size = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.uri = "mongodb+srv://cluster0.example.net".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("mongocursor-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.cursor.max_await_time_ms = Some(250);
        config.logging.timestamps = true;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/mongocursor.toml"))).unwrap_err();
        assert!(matches!(err, CursorError::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_cursor_options_from_config() {
        let config = CursorConfig {
            batch_size: Some(100),
            max_time_ms: Some(5000),
            max_await_time_ms: None,
            no_cursor_timeout: true,
        };
        let options = CursorOptions::from(&config);
        assert_eq!(options.batch_size, Some(100));
        assert_eq!(options.max_time_ms, Some(5000));
        assert!(options.flags.no_cursor_timeout);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
