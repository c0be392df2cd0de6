//! Sync settings
//!
//! Loaded from a TOML file; every field has a default so an empty or missing
//! file is valid. A few timing knobs can be overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::SettingsError;
use crate::local::{CONFIG_KEY, RESIDENTS_KEY};

pub const ENV_DEBOUNCE_MS: &str = "SIGA_DEBOUNCE_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "SIGA_POLL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Quiet window before local changes are pushed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Records per remote commit
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Remote path of the resident collection
    #[serde(default = "default_residents_path")]
    pub residents_path: String,

    /// Remote path of the config document
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// Poll interval for stores without push notifications
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Local store key for the resident collection
    #[serde(default = "default_residents_key")]
    pub residents_key: String,

    /// Local store key for the config singleton
    #[serde(default = "default_config_key")]
    pub config_key: String,
}

fn default_debounce_ms() -> u64 { 1500 }
fn default_max_batch_size() -> usize { 500 }
fn default_residents_path() -> String { "residents_db".to_string() }
fn default_config_path() -> String { "app_config/main".to_string() }
fn default_poll_interval_ms() -> u64 { 5000 }
fn default_request_timeout() -> u64 { 30 }
fn default_residents_key() -> String { RESIDENTS_KEY.to_string() }
fn default_config_key() -> String { CONFIG_KEY.to_string() }

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_batch_size: default_max_batch_size(),
            residents_path: default_residents_path(),
            config_path: default_config_path(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout(),
            residents_key: default_residents_key(),
            config_key: default_config_key(),
        }
    }
}

impl SyncSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: SyncSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path`, falling back to defaults when the file is missing,
    /// then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)?
        } else {
            info!(path = %path.display(), "Settings file not found, using defaults");
            Self::default()
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DEBOUNCE_MS) {
            self.debounce_ms = parse_millis(ENV_DEBOUNCE_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_millis(ENV_POLL_INTERVAL_MS, &value)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.max_batch_size == 0 {
            return Err(SettingsError::Invalid {
                key: "max_batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "poll_interval_ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
