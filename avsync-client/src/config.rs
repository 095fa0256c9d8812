//! Configuration loading for the sync client.
//!
//! Connection fields are required. Sync and telemetry sections fall back to
//! the documented defaults when omitted.

use avsync_core::FieldRoles;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub registry_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub reload_after_write: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval_ms: 600,
            reload_after_write: true,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives. `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "avsync_client=info,avsync_core=info".to_string(),
            json: false,
        }
    }
}

/// One attribute view the client reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(alias = "avID")]
    pub av_id: String,
    #[serde(default, alias = "viewID", skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    #[serde(flatten)]
    pub roles: FieldRoles,
}

impl SourceConfig {
    pub fn new(av_id: impl Into<String>) -> Self {
        Self {
            av_id: av_id.into(),
            view_id: None,
            roles: FieldRoles::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.av_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "source.av_id",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// A named source in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub id: String,
    pub name: String,
    #[serde(alias = "config")]
    pub source: SourceConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or AVSYNC_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if matches!(self.api_token.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "api_token",
                reason: "must not be blank when set".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.sync.poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.poll_attempts",
                reason: "must be > 0".to_string(),
            });
        }
        if self.telemetry.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "telemetry.filter",
                reason: "must not be empty".to_string(),
            });
        }
        if self.registry_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "registry_path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("AVSYNC_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
