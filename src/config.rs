//! Coordinator configuration.
//!
//! Loaded from TOML. Every section and field has a default, so a partial
//! file (or none at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GrantflowError, Result};
use crate::retry::RetryPolicy;

/// Age after which a pending request is force-finalized as fully denied.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// Period of the expiry sweep while requests are pending.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub expiry: ExpiryConfig,
    pub retry: RetryPolicy,
    pub platform: PlatformConfig,
}

/// Expiry sweeper settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub request_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl ExpiryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Device description used by the default classifier and activation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Platform API level.
    pub version: u32,
    /// Application identity used in `package:` activation arguments.
    pub app_identity: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            version: 33,
            app_identity: "com.example.app".to_owned(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| GrantflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| GrantflowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/grantflow/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("grantflow").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("grantflow")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/grantflow-config/config.toml")
        }
    }

    /// Reject values the coordinator cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`GrantflowError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.expiry.request_timeout_ms == 0 {
            return Err(GrantflowError::Config(
                "expiry.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.expiry.sweep_interval_ms == 0 {
            return Err(GrantflowError::Config(
                "expiry.sweep_interval_ms must be greater than zero".into(),
            ));
        }
        if self.platform.app_identity.trim().is_empty() {
            return Err(GrantflowError::Config(
                "platform.app_identity must not be empty".into(),
            ));
        }
        Ok(())
    }
}
