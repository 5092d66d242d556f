//! Store configuration.
//!
//! # Responsibility
//! - Describe how the document store opens its database, retries conflicts
//!   and logs.
//! - Load that description from JSON and `EDSTORE_*` environment variables.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - `validate()` runs after every builder, so a returned config is usable.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_DATABASE_PATH: &str = "EDSTORE_DATABASE_PATH";
const ENV_POOL_SIZE: &str = "EDSTORE_POOL_SIZE";
const ENV_BUSY_TIMEOUT_MS: &str = "EDSTORE_BUSY_TIMEOUT_MS";
const ENV_CHECKOUT_TIMEOUT_MS: &str = "EDSTORE_CHECKOUT_TIMEOUT_MS";
const ENV_MAX_CONFLICT_RETRIES: &str = "EDSTORE_MAX_CONFLICT_RETRIES";
const ENV_RETRY_BACKOFF_MS: &str = "EDSTORE_RETRY_BACKOFF_MS";
const ENV_LOG_LEVEL: &str = "EDSTORE_LOG_LEVEL";
const ENV_LOG_DIR: &str = "EDSTORE_LOG_DIR";

const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config file `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Database file and connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file; created on first open.
    pub path: PathBuf,
    /// Number of connections opened eagerly by the pool.
    pub pool_size: usize,
    /// How long SQLite waits for the database write lock.
    pub busy_timeout_ms: u64,
    /// How long a unit of work waits for a free pooled connection.
    pub checkout_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("edstore.sqlite3"),
            pool_size: 8,
            busy_timeout_ms: 5_000,
            checkout_timeout_ms: 10_000,
        }
    }
}

/// Retry policy applied by the service layer to retryable write conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one (0 = no retries).
    pub max_conflict_retries: u32,
    /// Linear backoff step: attempt `n` sleeps `n * backoff_ms`.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            backoff_ms: 10,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_conflict_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files. `None` leaves logging to
    /// the embedding application.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            directory: None,
        }
    }
}

/// Top-level store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl StoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Overrides fields from `EDSTORE_*` process environment variables.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides fields from an arbitrary variable source.
    ///
    /// Unset variables leave the field untouched; unparsable values fail.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            self.database.pool_size = parse_number(ENV_POOL_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.database.busy_timeout_ms = parse_number(ENV_BUSY_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CHECKOUT_TIMEOUT_MS) {
            self.database.checkout_timeout_ms = parse_number(ENV_CHECKOUT_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_CONFLICT_RETRIES) {
            self.retry.max_conflict_retries = parse_number(ENV_MAX_CONFLICT_RETRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_BACKOFF_MS) {
            self.retry.backoff_ms = parse_number(ENV_RETRY_BACKOFF_MS, &raw)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.logging.directory = Some(PathBuf::from(dir));
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects configurations the store cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path cannot be empty".to_string()));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        let level = self.logging.level.trim().to_ascii_lowercase();
        if !KNOWN_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unsupported logging.level `{}`",
                self.logging.level
            )));
        }
        if let Some(dir) = &self.logging.directory {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.directory must be absolute, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a non-negative integer, got `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_object_yields_defaults() {
        let config = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.retry.max_conflict_retries, 3);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = StoreConfig::from_json_str(
            r#"{ "database": { "path": "/var/lib/edstore/docs.sqlite3", "pool_size": 2 },
                 "retry": { "backoff_ms": 25 } }"#,
        )
        .unwrap();

        assert_eq!(
            config.database.path,
            PathBuf::from("/var/lib/edstore/docs.sqlite3")
        );
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.retry.backoff_ms, 25);
        assert_eq!(config.retry.delay_for(3), Duration::from_millis(75));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let err = StoreConfig::from_json_str(r#"{ "database": { "pool_size": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("pool_size")));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = StoreConfig::from_json_str("{ database: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_replace_only_present_variables() {
        let vars = HashMap::from([
            ("EDSTORE_POOL_SIZE", "3"),
            ("EDSTORE_LOG_LEVEL", "warn"),
        ]);
        let config = StoreConfig::default()
            .apply_overrides(|key| vars.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.database.pool_size, 3);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.database.path, PathBuf::from("edstore.sqlite3"));
    }

    #[test]
    fn unparsable_override_is_rejected() {
        let err = StoreConfig::default()
            .apply_overrides(|key| (key == "EDSTORE_BUSY_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("EDSTORE_BUSY_TIMEOUT_MS"));
    }

    #[test]
    fn relative_log_directory_is_rejected() {
        let err =
            StoreConfig::from_json_str(r#"{ "logging": { "directory": "logs" } }"#).unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let err = StoreConfig::from_json_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("absent.json"));
    }
}
