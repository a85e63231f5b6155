//! Configuration management for invitekeeper
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote chat service configuration
    pub remote: RemoteConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Reconciliation loop configuration
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Owner notification configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Status server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote chat service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// REST API base URL
    pub api_url: String,

    /// Bot token
    pub token: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retries for transient failures (rate limits, 5xx, timeouts)
    pub max_retries: u32,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Reconciliation loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Wait after a handled server, in seconds
    pub wait_secs: u64,

    /// Wait after a skipped or failed server, in milliseconds
    pub fast_retry_ms: u64,

    /// Quiet interval between passes, in seconds
    pub quiet_interval_secs: u64,

    /// Watchdog polling interval, in seconds
    pub watchdog_poll_secs: u64,

    /// Time without progress before the watchdog restarts the loop, in seconds
    pub liveness_threshold_secs: u64,

    /// Delay before the first pass, in seconds
    pub startup_delay_secs: u64,

    /// Fixed seed for the pass shuffle (random when unset)
    pub shuffle_seed: Option<u64>,
}

/// Owner notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Days before the same owner may be asked again
    pub cooldown_days: i64,

    /// Listing site mentioned in the message
    pub site_url: String,

    /// Handlebars template overriding the built-in message
    pub template: Option<String>,
}

/// Status server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            wait_secs: 5,
            fast_retry_ms: 1,
            quiet_interval_secs: 30,
            watchdog_poll_secs: 5,
            liveness_threshold_secs: 360,
            startup_delay_secs: 0,
            shuffle_seed: None,
        }
    }
}

impl ManagerConfig {
    /// Wait after a handled server
    #[must_use]
    pub fn standard_wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    /// Wait after a skipped or failed server
    #[must_use]
    pub fn fast_retry(&self) -> Duration {
        Duration::from_millis(self.fast_retry_ms)
    }

    /// Quiet interval between passes
    #[must_use]
    pub fn quiet_interval(&self) -> Duration {
        Duration::from_secs(self.quiet_interval_secs)
    }

    /// Watchdog polling interval
    #[must_use]
    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_secs(self.watchdog_poll_secs)
    }

    /// Liveness threshold as a chrono duration
    #[must_use]
    pub fn liveness_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.liveness_threshold_secs as i64)
    }

    /// Delay before the first pass
    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            cooldown_days: 15,
            site_url: String::from("http://discordservers.com"),
            template: None,
        }
    }
}

impl NotificationConfig {
    /// Cooldown as a chrono duration
    #[must_use]
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::days(self.cooldown_days)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        Ok(config)
    }

    /// Override fields from `INVITEKEEPER_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("INVITEKEEPER_API_URL") {
            self.remote.api_url = url;
        }
        if let Ok(token) = std::env::var("INVITEKEEPER_TOKEN") {
            self.remote.token = token;
        }
        if let Some(v) = env_parse("INVITEKEEPER_REQUEST_TIMEOUT") {
            self.remote.timeout_secs = v;
        }
        if let Some(v) = env_parse("INVITEKEEPER_MAX_RETRIES") {
            self.remote.max_retries = v;
        }
        if let Ok(path) = std::env::var("INVITEKEEPER_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(path);
        }
        if let Some(v) = env_parse("INVITEKEEPER_WAIT_SECS") {
            self.manager.wait_secs = v;
        }
        if let Some(v) = env_parse("INVITEKEEPER_QUIET_INTERVAL_SECS") {
            self.manager.quiet_interval_secs = v;
        }
        if let Some(v) = env_parse("INVITEKEEPER_LIVENESS_THRESHOLD_SECS") {
            self.manager.liveness_threshold_secs = v;
        }
        if let Some(v) = env_parse("INVITEKEEPER_STARTUP_DELAY_SECS") {
            self.manager.startup_delay_secs = v;
        }
        if let Some(v) = env_parse("INVITEKEEPER_COOLDOWN_DAYS") {
            self.notifications.cooldown_days = v;
        }
        if let Ok(url) = std::env::var("INVITEKEEPER_SITE_URL") {
            self.notifications.site_url = url;
        }
        if let Ok(host) = std::env::var("INVITEKEEPER_HOST") {
            self.server.host = host;
        }
        if let Some(v) = env_parse("INVITEKEEPER_PORT") {
            self.server.port = v;
        }
        if let Ok(level) = std::env::var("INVITEKEEPER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("INVITEKEEPER_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.remote.api_url.starts_with("http://") && !self.remote.api_url.starts_with("https://")
        {
            anyhow::bail!("remote.api_url must start with http:// or https://");
        }

        if self.remote.timeout_secs == 0 {
            anyhow::bail!("remote.timeout_secs must be greater than 0");
        }

        if self.manager.watchdog_poll_secs == 0 {
            anyhow::bail!("manager.watchdog_poll_secs must be greater than 0");
        }

        if self.manager.liveness_threshold_secs <= self.manager.wait_secs {
            anyhow::bail!("manager.liveness_threshold_secs must exceed manager.wait_secs");
        }

        if self.notifications.cooldown_days <= 0 {
            anyhow::bail!("notifications.cooldown_days must be positive");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig {
                api_url: String::from("https://discord.com/api/v10"),
                token: String::new(),
                timeout_secs: 30,
                max_retries: 2,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/invitekeeper.db"),
            },
            manager: ManagerConfig::default(),
            notifications: NotificationConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_api_url() {
        let mut config = Config::default();
        config.remote.api_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_liveness_threshold_must_exceed_wait() {
        let mut config = Config::default();
        config.manager.liveness_threshold_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_manager_durations() {
        let manager = ManagerConfig::default();
        assert_eq!(manager.standard_wait(), Duration::from_secs(5));
        assert_eq!(manager.fast_retry(), Duration::from_millis(1));
        assert_eq!(manager.quiet_interval(), Duration::from_secs(30));
        assert_eq!(manager.liveness_threshold(), chrono::Duration::minutes(6));
    }

    #[test]
    fn test_cooldown_is_fifteen_days() {
        assert_eq!(
            NotificationConfig::default().cooldown(),
            chrono::Duration::days(15)
        );
    }
}
