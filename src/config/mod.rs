//! Configuration management for the Insider poller
//!
//! A config entry holds the account credentials and the polling options.
//! It can be loaded from environment variables or a TOML file:
//!
//! ```toml
//! [credentials]
//! username = "player@example.com"
//! password = "hunter2"
//!
//! [polling]
//! scan_interval_minutes = 60
//!
//! [notifications]
//! webhook_url = "https://hooks.example.com/pinball"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Production API root
pub const DEFAULT_BASE_URL: &str = "https://api.sternpinball.com";

/// Default poll interval in minutes
pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 30;

/// Shortest allowed poll interval in minutes
pub const MIN_SCAN_INTERVAL_MINUTES: u64 = 30;

/// Longest allowed poll interval in minutes (24 hours)
pub const MAX_SCAN_INTERVAL_MINUTES: u64 = 1440;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Required setting is absent
    #[error("Missing required setting: {0}")]
    Missing(String),

    /// Setting has an unusable value
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Main configuration structure, one per config entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account credentials
    pub credentials: Credentials,

    /// Poll scheduling options
    #[serde(default)]
    pub polling: PollingConfig,

    /// Upstream API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Insider account credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Key that identifies the account across config entries
    pub fn unique_id(&self) -> String {
        self.username.to_lowercase()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Poll scheduling options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Minutes between poll cycles, within [30, 1440]
    pub scan_interval_minutes: u64,

    /// Deadline for one whole cycle in seconds
    pub cycle_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: DEFAULT_SCAN_INTERVAL_MINUTES,
            cycle_timeout_secs: 120,
        }
    }
}

impl PollingConfig {
    /// Get the poll interval as Duration
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes * 60)
    }

    /// Get the cycle deadline as Duration
    #[must_use]
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

/// Upstream API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root URL
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            user_agent: format!("stern-insider/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Outbound notification settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook that receives new high score events
    pub webhook_url: Option<String>,

    /// Bearer token sent to the webhook
    pub webhook_auth_token: Option<String>,
}

impl Config {
    /// Create a config with default options for the given account
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            polling: PollingConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// `STERN_USERNAME` and `STERN_PASSWORD` are required; everything else
    /// falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = std::env::var("STERN_USERNAME")
            .map_err(|_| ConfigError::Missing("STERN_USERNAME".to_string()))?;
        let password = std::env::var("STERN_PASSWORD")
            .map_err(|_| ConfigError::Missing("STERN_PASSWORD".to_string()))?;

        let mut config = Self::new(Credentials::new(username, password));

        if let Some(minutes) = env_parse::<u64>("STERN_SCAN_INTERVAL")? {
            config.polling.scan_interval_minutes = minutes;
        }
        if let Some(secs) = env_parse::<u64>("STERN_CYCLE_TIMEOUT")? {
            config.polling.cycle_timeout_secs = secs;
        }
        if let Ok(base_url) = std::env::var("STERN_BASE_URL") {
            config.api.base_url = base_url;
        }
        if let Some(secs) = env_parse::<u64>("STERN_REQUEST_TIMEOUT")? {
            config.api.request_timeout_secs = secs;
        }
        if let Ok(level) = std::env::var("STERN_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("STERN_LOG_FORMAT") {
            config.logging.format = format;
        }
        config.notifications.webhook_url = std::env::var("STERN_WEBHOOK_URL").ok();
        config.notifications.webhook_auth_token = std::env::var("STERN_WEBHOOK_TOKEN").ok();

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.username.trim().is_empty() {
            return Err(ConfigError::invalid("credentials.username", "must not be empty"));
        }

        if self.credentials.password.is_empty() {
            return Err(ConfigError::invalid("credentials.password", "must not be empty"));
        }

        let interval = self.polling.scan_interval_minutes;
        if !(MIN_SCAN_INTERVAL_MINUTES..=MAX_SCAN_INTERVAL_MINUTES).contains(&interval) {
            return Err(ConfigError::invalid(
                "polling.scan_interval_minutes",
                format!(
                    "{interval} is outside [{MIN_SCAN_INTERVAL_MINUTES}, {MAX_SCAN_INTERVAL_MINUTES}]"
                ),
            ));
        }

        if self.polling.cycle_timeout_secs == 0 {
            return Err(ConfigError::invalid("polling.cycle_timeout_secs", "must be greater than 0"));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("api.request_timeout_secs", "must be greater than 0"));
        }

        if let Err(e) = url::Url::parse(&self.api.base_url) {
            return Err(ConfigError::invalid("api.base_url", e.to_string()));
        }

        if let Some(webhook) = &self.notifications.webhook_url {
            let parsed = url::Url::parse(webhook)
                .map_err(|e| ConfigError::invalid("notifications.webhook_url", e.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(
                    "notifications.webhook_url",
                    format!("unsupported scheme '{}'", parsed.scheme()),
                ));
            }
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new(Credentials::new("player", "secret"))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_scan_interval_bounds() {
        let mut config = config();

        config.polling.scan_interval_minutes = 29;
        assert!(config.validate().is_err());

        config.polling.scan_interval_minutes = 30;
        assert!(config.validate().is_ok());

        config.polling.scan_interval_minutes = 1440;
        assert!(config.validate().is_ok());

        config.polling.scan_interval_minutes = 1441;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let mut config = config();
        config.credentials.username = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_bad_webhook_rejected() {
        let mut config = config();

        config.notifications.webhook_url = Some("ftp://example.com".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'ftp'"));

        config.notifications.webhook_url = Some("https://".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.notifications.webhook_url = Some("https://hooks.example.com/pinball".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_conversions() {
        let config = config();
        assert_eq!(config.polling.scan_interval(), Duration::from_secs(1800));
        assert_eq!(config.api.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.polling.cycle_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let printed = format!("{:?}", Credentials::new("Player", "secret"));
        assert!(!printed.contains("secret"));
        assert_eq!(Credentials::new("Player", "x").unique_id(), "player");
    }

    #[test]
    fn test_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [credentials]
            username = "player"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert!(config.notifications.webhook_url.is_none());
    }
}
