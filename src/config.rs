//! Configuration Management
//!
//! Handles persistent configuration storage for blastscan.

use crate::discovery::adapter::DEFAULT_MAX_PARALLEL;
use crate::discovery::cache::{TtlPolicy, DEFAULT_CACHE_TTL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of cached results, in seconds
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Per item type overrides, e.g. hours for rate limited IAM lookups
    #[serde(default)]
    pub adapter_ttl_secs: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            adapter_ttl_secs: HashMap::new(),
        }
    }
}

/// User configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default project ID
    #[serde(default)]
    pub project_id: Option<String>,
    /// Default zone
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Concurrent per-item calls during a list
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            zone: None,
            cache: CacheConfig::default(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("blastscan").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`, falling back to defaults when it is
    /// missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                tracing::warn!("Ignoring invalid config {:?}: {}", path, err);
                Self::default()
            }),
            Err(err) => {
                tracing::warn!("Failed to read config {:?}: {}", path, err);
                Self::default()
            },
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).context("Failed to write config")?;

        Ok(())
    }

    /// Get effective project (config > gcloud default)
    pub fn effective_project(&self) -> Option<String> {
        self.project_id.clone().or_else(crate::gcp::auth::get_default_project)
    }

    /// Get effective zone (config > gcloud default)
    pub fn effective_zone(&self) -> String {
        self.zone
            .clone()
            .or_else(crate::gcp::auth::get_default_zone)
            .unwrap_or_else(|| "us-central1-a".to_string())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    /// Per item type TTL overrides for the result cache
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::new(
            self.cache
                .adapter_ttl_secs
                .iter()
                .map(|(item_type, secs)| (item_type.clone(), Duration::from_secs(*secs)))
                .collect(),
        )
    }
}
