//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, the active locale sent as `Accept-Language`, the response cache
//! lifetime and the request timeout.
//!
//! Configuration is stored at `~/.config/okrkit/config.json`.
//! `OKRKIT_API_BASE` and `OKRKIT_LOCALE` override the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
pub const APP_NAME: &str = "okrkit";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_API_BASE: &str = "http://localhost:8080";

pub const DEFAULT_LOCALE: &str = "vi";

/// Five minutes, matching how long list views stay fresh in the dashboard
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_BASE: &str = "OKRKIT_API_BASE";
pub const ENV_LOCALE: &str = "OKRKIT_LOCALE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub locale: String,
    pub cache_ttl_secs: i64,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent), then apply env overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_json(&contents)?
        } else {
            Self::default()
        };
        config.apply_overrides(
            std::env::var(ENV_API_BASE).ok(),
            std::env::var(ENV_LOCALE).ok(),
        );
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply non-empty overrides on top of the loaded values
    pub fn apply_overrides(&mut self, api_base: Option<String>, locale: Option<String>) {
        if let Some(base) = api_base.filter(|b| !b.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
        if let Some(locale) = locale.filter(|l| !l.trim().is_empty()) {
            self.locale = locale.trim().to_string();
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.max(0))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
