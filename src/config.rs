//! Application configuration loaded from a JSON file at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decision attached to an access rule or used as the policy default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Allow,
    Deny,
}

/// A source address pattern paired with a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRule {
    pub origin: String,
    pub policy: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub default: AccessLevel,
    #[serde(default)]
    pub rules: Vec<AccessRule>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            default: AccessLevel::Allow,
            rules: Vec::new(),
        }
    }
}

/// Token bucket settings for the login and continuation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitSettings {
    pub per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AppConfig {
    pub address: String,
    pub port: u16,
    pub loglevel: String,
    pub cors_origin: String,
    /// Path to the SQLite database file.
    pub database: String,
    /// Sliding lifetime of a session, in minutes.
    pub session_expiry: i64,
    /// Sliding lifetime of a remember-me token, in minutes.
    pub remember_me_expiry: i64,
    pub access_policy: AccessPolicy,
    pub rate_limit: RateLimitSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 7534,
            loglevel: "info".to_string(),
            cors_origin: "*".to_string(),
            database: "shoptrac.db".to_string(),
            session_expiry: 30,
            remember_me_expiry: 30 * 24 * 60,
            access_policy: AccessPolicy::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

/// Upper bound for `session-expiry` and `remember-me-expiry`: one hundred
/// years, in minutes. Keeps every computed expiry a four digit year.
pub const MAX_EXPIRY_MINUTES: i64 = 100 * 366 * 24 * 60;

#[derive(Debug)]
pub enum ConfigError {
    Missing(String),
    Read(std::io::Error),
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(path) => write!(f, "file {path} does not exist"),
            ConfigError::Read(e) => write!(f, "failed to read file: {e}"),
            ConfigError::Parse(e) => write!(f, "failed to decode file: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    /// Parse a configuration from JSON text. Absent keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration file. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session_expiry <= 0 {
            return Err(ConfigError::Invalid("session-expiry must be positive"));
        }
        if self.session_expiry > MAX_EXPIRY_MINUTES {
            return Err(ConfigError::Invalid("session-expiry exceeds one hundred years"));
        }
        if self.remember_me_expiry <= 0 {
            return Err(ConfigError::Invalid("remember-me-expiry must be positive"));
        }
        if self.remember_me_expiry > MAX_EXPIRY_MINUTES {
            return Err(ConfigError::Invalid("remember-me-expiry exceeds one hundred years"));
        }
        if axum::http::HeaderValue::from_str(&self.cors_origin).is_err() {
            return Err(ConfigError::Invalid("cors-origin is not a valid header value"));
        }
        if self.rate_limit.per_second == 0 || self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid("rate-limit values must be positive"));
        }
        Ok(())
    }
}
