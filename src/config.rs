use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub unsplash_access_key: Option<String>,
    pub pexels_api_key: Option<String>,

    /// Optional JSON file overriding the built-in per-category feed lists.
    pub feeds_file: Option<PathBuf>,

    #[serde(default = "default_full_ingest_minutes")]
    pub full_ingest_minutes: u64,

    #[serde(default = "default_quick_update_minutes")]
    pub quick_update_minutes: u64,

    #[serde(default = "default_stats_minutes")]
    pub stats_minutes: u64,

    #[serde(default = "default_cleanup_hour_utc")]
    pub cleanup_hour_utc: u32,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("techhub-ingest");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("news.db").to_string_lossy().to_string()
}

fn default_full_ingest_minutes() -> u64 {
    30
}

fn default_quick_update_minutes() -> u64 {
    10
}

fn default_stats_minutes() -> u64 {
    60
}

fn default_cleanup_hour_utc() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            unsplash_access_key: None,
            pexels_api_key: None,
            feeds_file: None,
            full_ingest_minutes: default_full_ingest_minutes(),
            quick_update_minutes: default_quick_update_minutes(),
            stats_minutes: default_stats_minutes(),
            cleanup_hour_utc: default_cleanup_hour_utc(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment takes precedence over the config file so deployments can
    /// inject credentials without writing them to disk.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TECHHUB_DB") {
            self.db_path = path;
        }
        if let Ok(key) = std::env::var("UNSPLASH_ACCESS_KEY") {
            self.unsplash_access_key = Some(key);
        }
        if let Ok(key) = std::env::var("PEXELS_API_KEY") {
            self.pexels_api_key = Some(key);
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("techhub-ingest")
            .join("config.toml")
    }

    /// Load the per-environment feed-list override, if one is configured.
    /// The file maps category ids to feed URL lists.
    pub fn feed_overrides(&self) -> Result<Option<HashMap<Category, Vec<String>>>> {
        let Some(path) = &self.feeds_file else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path)?;
        let overrides: HashMap<Category, Vec<String>> = serde_json::from_str(&content)?;
        Ok(Some(overrides))
    }
}
