//! Application configuration management.
//!
//! Holds the auth service URL, request timeout, refresh skew and the
//! choice of persistence backend.
//!
//! Configuration is stored at `~/.config/sessionkeeper/config.json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
use crate::auth::lifecycle::REFRESH_SKEW_SECS;
use crate::storage::{FileStore, KeyValueStore, KeyringStore};

/// Application name used for config directory paths
const APP_NAME: &str = "sessionkeeper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const ENV_API_URL: &str = "SESSIONKEEPER_API_URL";

/// Environment variable overriding `storage` (`file` or `keyring`)
pub const ENV_STORAGE: &str = "SESSIONKEEPER_STORAGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

impl StorageBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(StorageBackend::File),
            "keyring" | "keychain" => Some(StorageBackend::Keyring),
            _ => None,
        }
    }

    pub fn open(self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(match self {
            StorageBackend::File => Arc::new(FileStore::in_cache_dir()?),
            StorageBackend::Keyring => Arc::new(KeyringStore::default()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub refresh_skew_secs: i64,
    pub storage: StorageBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            refresh_skew_secs: REFRESH_SKEW_SECS,
            storage: StorageBackend::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
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

    /// Apply overrides from the environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_STORAGE).ok(),
        )
    }

    fn apply_overrides(&mut self, api_url: Option<String>, storage: Option<String>) -> Result<()> {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(value) = storage {
            self.storage = StorageBackend::parse(&value).ok_or_else(|| {
                anyhow::anyhow!("Unknown storage backend '{}' (expected file or keyring)", value)
            })?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
