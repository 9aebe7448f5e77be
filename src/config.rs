//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiClientConfig;
use crate::location::{LocationGate, MIN_INTERVAL_SECS, MIN_MOVE_METERS};
use crate::realtime::RealtimeConfig;
use crate::session::FileSessionStore;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub realtime: RealtimeSettings,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// REST backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
}

fn default_api_url() -> String {
    "http://localhost:5001".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
        }
    }
}

impl ApiConfig {
    pub fn client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.base_url.clone(),
        }
    }
}

/// Socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeSettings {
    #[serde(default = "default_socket_url")]
    pub url: String,

    #[serde(default = "default_reconnection")]
    pub reconnection: bool,

    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,

    #[serde(default = "default_reconnection_delay")]
    pub reconnection_delay_ms: u64,
}

fn default_socket_url() -> String {
    "ws://localhost:5001/ws".to_string()
}

fn default_reconnection() -> bool {
    true
}

fn default_reconnection_attempts() -> u32 {
    5
}

fn default_reconnection_delay() -> u64 {
    1000
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: default_socket_url(),
            reconnection: default_reconnection(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay(),
        }
    }
}

impl RealtimeSettings {
    pub fn client_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            url: self.url.clone(),
            reconnection: self.reconnection,
            reconnection_attempts: self.reconnection_attempts,
            reconnection_delay: Duration::from_millis(self.reconnection_delay_ms),
        }
    }
}

/// Location update gating
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_min_move")]
    pub min_move_meters: f64,

    #[serde(default = "default_min_interval")]
    pub min_interval_secs: i64,
}

fn default_min_move() -> f64 {
    MIN_MOVE_METERS
}

fn default_min_interval() -> i64 {
    MIN_INTERVAL_SECS
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            min_move_meters: default_min_move(),
            min_interval_secs: default_min_interval(),
        }
    }
}

impl LocationConfig {
    pub fn gate(&self) -> LocationGate {
        LocationGate::new(
            self.min_move_meters,
            chrono::Duration::seconds(self.min_interval_secs),
        )
    }
}

/// Session persistence
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Session file; the platform data directory when unset
    pub file: Option<String>,
}

impl SessionConfig {
    pub fn path(&self) -> PathBuf {
        self.file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(FileSessionStore::default_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("campusconnect").join("config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CAMPUSCONNECT_API_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = lookup("CAMPUSCONNECT_SOCKET_URL") {
            self.realtime.url = url;
        }
        if let Some(file) = lookup("CAMPUSCONNECT_SESSION_FILE") {
            self.session.file = Some(file);
        }
        if let Some(level) = lookup("CAMPUSCONNECT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CAMPUSCONNECT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# CampusConnect Configuration
#
# Environment variables override these settings:
# - CAMPUSCONNECT_API_URL
# - CAMPUSCONNECT_SOCKET_URL
# - CAMPUSCONNECT_SESSION_FILE
# - CAMPUSCONNECT_LOG_LEVEL
# - CAMPUSCONNECT_LOG_FORMAT

[api]
# Backend REST base URL
base_url = "http://localhost:5001"

[realtime]
# Backend socket URL
url = "ws://localhost:5001/ws"

# Reconnect automatically after a dropped connection
reconnection = true

# Consecutive failed attempts before giving up
reconnection_attempts = 5

# Delay between attempts (ms)
reconnection_delay_ms = 1000

[location]
# Minimum movement before another update is sent (meters)
min_move_meters = 25.0

# Minimum time between updates when standing still (seconds)
min_interval_secs = 60

[session]
# Where the login token is kept (default: platform data directory)
# file = "~/.local/share/campusconnect/session.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:5001");
        assert_eq!(config.realtime.reconnection_attempts, 5);
        assert_eq!(
            config.realtime.client_config().reconnection_delay,
            Duration::from_millis(1000)
        );
        assert_eq!(config.location.min_move_meters, 25.0);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses_to_defaults() {
        let config = Config::parse(&generate_default_config()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.api.base_url, defaults.api.base_url);
        assert_eq!(config.realtime.url, defaults.realtime.url);
        assert_eq!(config.location.min_interval_secs, 60);
        assert!(config.session.file.is_none());
    }

    #[test]
    fn test_partial_file() {
        let config = Config::parse(
            r#"
            [realtime]
            reconnection = false
            "#,
        )
        .unwrap();
        assert!(!config.realtime.reconnection);
        assert_eq!(config.realtime.reconnection_attempts, 5);
        assert_eq!(config.api.base_url, "http://localhost:5001");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CAMPUSCONNECT_API_URL", "https://api.campus.edu"),
            ("CAMPUSCONNECT_SESSION_FILE", "/tmp/session.json"),
            ("CAMPUSCONNECT_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://api.campus.edu");
        assert_eq!(config.session.path(), PathBuf::from("/tmp/session.json"));
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = 1").unwrap();
        assert!(matches!(Config::load(&path).unwrap_err(), ConfigError::Parse { .. }));
    }
}
