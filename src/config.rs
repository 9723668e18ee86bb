//! Campus Parking Configuration
//!
//! Handles parsing and management of parking.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::registry::validate_slot_list;
use crate::store::RetryPolicy;

/// Name of the configuration file searched for on startup.
pub const CONFIG_FILE: &str = "parking.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching parking.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParkingConfig {
    /// Slot layout
    #[serde(default)]
    pub slots: SlotsConfig,

    /// Durable storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// QR tickets
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ParkingConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: ParkingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PARKING_LOG` and `PARKING_BIND` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(filter) = std::env::var("PARKING_LOG") {
            if !filter.trim().is_empty() {
                self.logging.filter = filter;
            }
        }
        if let Ok(bind) = std::env::var("PARKING_BIND") {
            if !bind.trim().is_empty() {
                self.server.bind = bind;
            }
        }
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_slot_list(&self.slots.ids).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.storage.backend == StorageBackend::Sqlite && self.storage.path.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid(
                "storage.path is required for the sqlite backend".into(),
            ));
        }
        if self.storage.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "storage.retry_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Nearest `parking.toml` at or above `start_dir`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Slot layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsConfig {
    /// Slot ids in display order
    #[serde(default = "default_slot_ids")]
    pub ids: Vec<String>,
}

fn default_slot_ids() -> Vec<String> {
    ["A1", "A2", "B1", "B2", "C1"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            ids: default_slot_ids(),
        }
    }
}

/// Which store backs the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Attempts per durable write, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Pause between attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("parking.db")
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25
}

impl StorageConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_db_path(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Origins allowed to call the JSON API from a browser
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// QR ticket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory tickets are written to
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("static/qr_codes")
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_artifact_dir(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info,campus_parking=debug`
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}
