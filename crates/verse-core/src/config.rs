//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/verse/config.toml)
//! 3. Environment variables (VERSE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "VERSE";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Whether sync is enabled
    #[serde(default)]
    pub sync_enabled: bool,

    /// Seconds between background upload passes
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Synced tombstones older than this are purged
    #[serde(default = "default_tombstone_retention")]
    pub tombstone_retention_days: u32,

    /// An incremental sync whose watermark is older than this becomes full
    #[serde(default = "default_full_sync_after")]
    pub full_sync_after_days: u32,

    /// Documents requested per remote query page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Remote document store settings
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Cloud Firestore connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Firebase project id; sync is impossible without it
    #[serde(default)]
    pub project_id: Option<String>,

    /// Web API key, sent as the `key` query parameter
    #[serde(default)]
    pub api_key: Option<String>,

    /// OAuth / Firebase ID token, sent as a bearer token
    #[serde(default)]
    pub auth_token: Option<String>,

    /// REST endpoint (override for the local emulator)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Document path under which the collections live, e.g. `users/<uid>`
    #[serde(default)]
    pub root_path: Option<String>,

    /// Seconds between polls of the live change feed
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync_enabled: false,
            sync_interval_secs: default_sync_interval(),
            tombstone_retention_days: default_tombstone_retention(),
            full_sync_after_days: default_full_sync_after(),
            page_size: default_page_size(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            api_key: None,
            auth_token: None,
            base_url: default_base_url(),
            root_path: None,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl RemoteConfig {
    /// Whether enough is configured to talk to the remote store
    pub fn is_configured(&self) -> bool {
        self.project_id.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (VERSE_DATA_DIR, VERSE_SYNC_ENABLED, VERSE_PROJECT_ID, ...)
    /// 2. Config file (~/.config/verse/config.toml or VERSE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // VERSE_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // VERSE_SYNC_ENABLED
        if let Ok(val) = std::env::var(format!("{}_SYNC_ENABLED", ENV_PREFIX)) {
            self.sync_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // VERSE_PROJECT_ID, VERSE_API_KEY, VERSE_AUTH_TOKEN; empty clears
        let optional = |name: &str| {
            std::env::var(format!("{}_{}", ENV_PREFIX, name))
                .ok()
                .map(|val| if val.is_empty() { None } else { Some(val) })
        };
        if let Some(val) = optional("PROJECT_ID") {
            self.remote.project_id = val;
        }
        if let Some(val) = optional("API_KEY") {
            self.remote.api_key = val;
        }
        if let Some(val) = optional("AUTH_TOKEN") {
            self.remote.auth_token = val;
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with VERSE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("verse")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("verse.db")
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn tombstone_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.tombstone_retention_days))
    }

    pub fn full_sync_after(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.full_sync_after_days))
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("verse")
}

fn default_sync_interval() -> u64 {
    30
}

fn default_tombstone_retention() -> u32 {
    7
}

fn default_full_sync_after() -> u32 {
    30
}

fn default_page_size() -> usize {
    300
}

fn default_base_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_poll_interval() -> u64 {
    15
}
