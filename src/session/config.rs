//! Session configuration

use crate::error::{Result, StorageError};
use crate::progress::TASK_ID_DELIMITER;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 8;
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 64 * 1024;
pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TASK_PREFIX: &str = "task";

/// Log level applied when the session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}

/// Configuration for a [`StorageSession`](crate::StorageSession)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Log level (default: info)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// File transfers allowed to run at once (default: 8)
    #[serde(
        rename = "max-concurrent-downloads",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_concurrent_downloads: Option<usize>,

    /// Buffer size used when copying a content stream to disk (default: 64 KiB)
    #[serde(rename = "copy-buffer-size", skip_serializing_if = "Option::is_none")]
    pub copy_buffer_size: Option<usize>,

    /// Seconds allowed for resolving a CID in inspection calls (default: 30)
    #[serde(rename = "resolve-timeout", skip_serializing_if = "Option::is_none")]
    pub resolve_timeout: Option<u64>,

    /// Seconds allowed for listing a directory in inspection calls (default: 60)
    #[serde(rename = "list-timeout", skip_serializing_if = "Option::is_none")]
    pub list_timeout: Option<u64>,

    /// Label at the start of every task prefix (default: "task")
    #[serde(rename = "task-prefix", skip_serializing_if = "Option::is_none")]
    pub task_prefix: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_level: Some(LogLevel::Info),
            max_concurrent_downloads: Some(DEFAULT_MAX_CONCURRENT_DOWNLOADS),
            copy_buffer_size: Some(DEFAULT_COPY_BUFFER_SIZE),
            resolve_timeout: Some(DEFAULT_RESOLVE_TIMEOUT_SECS),
            list_timeout: Some(DEFAULT_LIST_TIMEOUT_SECS),
            task_prefix: Some(DEFAULT_TASK_PREFIX.to_string()),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with nothing set; defaults apply at use
    pub fn new() -> Self {
        Self {
            log_level: None,
            max_concurrent_downloads: None,
            copy_buffer_size: None,
            resolve_timeout: None,
            list_timeout: None,
            task_prefix: None,
        }
    }

    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set how many file transfers may run at once
    pub fn max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = Some(max);
        self
    }

    /// Set the copy buffer size in bytes
    pub fn copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = Some(size);
        self
    }

    /// Set the resolve timeout in seconds
    pub fn resolve_timeout(mut self, secs: u64) -> Self {
        self.resolve_timeout = Some(secs);
        self
    }

    /// Set the list timeout in seconds
    pub fn list_timeout(mut self, secs: u64) -> Self {
        self.list_timeout = Some(secs);
        self
    }

    /// Set the task prefix label
    pub fn task_prefix<S: Into<String>>(mut self, label: S) -> Self {
        self.task_prefix = Some(label.into());
        self
    }

    pub fn effective_max_concurrent_downloads(&self) -> usize {
        self.max_concurrent_downloads
            .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS)
    }

    pub fn effective_copy_buffer_size(&self) -> usize {
        self.copy_buffer_size.unwrap_or(DEFAULT_COPY_BUFFER_SIZE)
    }

    pub fn effective_resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout.unwrap_or(DEFAULT_RESOLVE_TIMEOUT_SECS))
    }

    pub fn effective_list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout.unwrap_or(DEFAULT_LIST_TIMEOUT_SECS))
    }

    pub fn effective_task_prefix(&self) -> &str {
        self.task_prefix.as_deref().unwrap_or(DEFAULT_TASK_PREFIX)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == Some(0) {
            return Err(StorageError::config_error(
                "max-concurrent-downloads must be greater than 0",
            ));
        }

        if self.copy_buffer_size == Some(0) {
            return Err(StorageError::config_error(
                "copy-buffer-size must be greater than 0",
            ));
        }

        if self.resolve_timeout == Some(0) || self.list_timeout == Some(0) {
            return Err(StorageError::config_error("timeouts must be greater than 0"));
        }

        if let Some(label) = &self.task_prefix {
            if label.is_empty() || label.contains(TASK_ID_DELIMITER) {
                return Err(StorageError::config_error(format!(
                    "task-prefix must be non-empty and must not contain '{}'",
                    TASK_ID_DELIMITER
                )));
            }
        }

        Ok(())
    }

    /// Convert the configuration to a JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(StorageError::from)
    }

    /// Create a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.log_level, Some(LogLevel::Info));
        assert_eq!(config.max_concurrent_downloads, Some(8));
        assert_eq!(config.copy_buffer_size, Some(64 * 1024));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SessionConfig::new();
        assert_eq!(config.effective_max_concurrent_downloads(), 8);
        assert_eq!(config.effective_resolve_timeout(), Duration::from_secs(30));
        assert_eq!(config.effective_list_timeout(), Duration::from_secs(60));
        assert_eq!(config.effective_task_prefix(), "task");
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .log_level(LogLevel::Debug)
            .max_concurrent_downloads(2)
            .copy_buffer_size(4096)
            .resolve_timeout(5)
            .list_timeout(10)
            .task_prefix("sync");

        assert_eq!(config.log_level, Some(LogLevel::Debug));
        assert_eq!(config.effective_max_concurrent_downloads(), 2);
        assert_eq!(config.effective_copy_buffer_size(), 4096);
        assert_eq!(config.effective_resolve_timeout(), Duration::from_secs(5));
        assert_eq!(config.effective_task_prefix(), "sync");
    }

    #[test]
    fn test_config_validation() {
        assert!(SessionConfig::new()
            .max_concurrent_downloads(0)
            .validate()
            .is_err());
        assert!(SessionConfig::new().copy_buffer_size(0).validate().is_err());
        assert!(SessionConfig::new().list_timeout(0).validate().is_err());
        assert!(SessionConfig::new().task_prefix("").validate().is_err());
        assert!(SessionConfig::new().task_prefix("a:b").validate().is_err());
    }

    #[test]
    fn test_config_json() {
        let config = SessionConfig::new()
            .log_level(LogLevel::Debug)
            .max_concurrent_downloads(3);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"max-concurrent-downloads\":3"));
        assert!(!json.contains("copy-buffer-size"));

        let parsed = SessionConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);

        let parsed = SessionConfig::from_json("{}").unwrap();
        assert_eq!(parsed, SessionConfig::new());
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Off.to_string(), "off");
        assert_eq!(LogLevel::Warn.to_level_filter(), log::LevelFilter::Warn);
    }
}
