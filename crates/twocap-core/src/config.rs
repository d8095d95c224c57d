//! Configuration management for twocap
//!
//! Client settings can be loaded from a TOML file; every field has a default
//! so a file only needs the values it overrides. The API key may also come
//! from the `TWOCAPTCHA_API_KEY` environment variable.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::{CaptchaError, Result};

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "TWOCAPTCHA_API_KEY";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 2captcha API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Use https instead of http
    #[serde(default)]
    pub use_ssl: bool,

    /// Service host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Transport-level retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Result polling defaults
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Delivery retry settings for the HTTP transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay; attempt n waits `backoff_factor * 2^(n-1)`
    #[serde(default = "default_backoff_factor_secs")]
    pub backoff_factor_secs: u64,

    /// Upper bound on a single delay
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

/// How the poller accounts for time spent waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElapsedMode {
    /// Sum of sleep intervals; ignores time spent in requests
    #[default]
    Stepped,
    /// Monotonic clock measured from the start of the wait
    WallClock,
}

/// Polling loop defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub mode: ElapsedMode,
}

fn default_host() -> String {
    "2captcha.com".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_factor_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    120
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_interval_secs() -> u64 {
    5
}

impl ClientConfig {
    /// Create a configuration for the given key with defaults elsewhere
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file, or use defaults if it doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                CaptchaError::Config(format!("Failed to parse config file: {}", e))
            })?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings that would make the client misbehave
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_secs == 0 {
            return Err(CaptchaError::Config(
                "polling.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Write this configuration as TOML
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CaptchaError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Base URL for all endpoints, e.g. `http://2captcha.com/`
    pub fn base_url(&self) -> String {
        let proto = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}/", proto, self.host)
    }

    /// Get the API key
    ///
    /// Priority:
    /// 1. `api_key` from the configuration
    /// 2. `TWOCAPTCHA_API_KEY` environment variable
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }

        if let Ok(key) = env::var(API_KEY_ENV) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", API_KEY_ENV);
                return Ok(key);
            }
        }

        Err(CaptchaError::Config(format!(
            "No API key found. Set `api_key` in the config file or export {}",
            API_KEY_ENV
        )))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            use_ssl: false,
            host: default_host(),
            retry: RetryConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_factor_secs: default_backoff_factor_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: default_max_wait_secs(),
            interval_secs: default_interval_secs(),
            mode: ElapsedMode::default(),
        }
    }
}
