//! Configuration loading for the AssetDesk client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use crate::cache::CacheLimits;
use assetdesk_core::{EntityIdType, Principal, UserId};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no `--config` path is given.
pub const CONFIG_ENV_VAR: &str = "ASSETDESK_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub jwt: Option<String>,
    /// The user writes are recorded as.
    pub principal_id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub max_staleness_ms: u64,
    /// Cached views older than this are dropped even if never invalidated.
    pub entry_ttl_ms: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    pub json: bool,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or ASSETDESK_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Load from the given path, falling back to `ASSETDESK_CONFIG`.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
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
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.entry_ttl_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.entry_ttl_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_entries",
                reason: "must be > 0".to_string(),
            });
        }
        if self.auth.api_key.is_none() && self.auth.jwt.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "auth",
                reason: "api_key or jwt must be provided".to_string(),
            });
        }
        if self.auth.principal_id.is_nil() {
            return Err(ConfigError::InvalidValue {
                field: "auth.principal_id",
                reason: "must not be the nil id".to_string(),
            });
        }
        if let Some(filter) = &self.telemetry.filter {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "telemetry.filter",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn max_staleness(&self) -> Duration {
        Duration::from_millis(self.cache.max_staleness_ms)
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            entry_ttl: Duration::from_millis(self.cache.entry_ttl_ms),
            max_entries: self.cache.max_entries,
        }
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.auth.principal_id)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}
