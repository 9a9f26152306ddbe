//! JSON configuration (`~/.gerrit-stats/config.json`).
//!
//! Every field has a default, so an empty object (or no file at the default
//! location) is a working configuration for the REST source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::Database;
use crate::window::FilterWindow;

/// Which provider serves raw review data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Gerrit REST API.
    #[default]
    Api,
    /// SQLite copy of the review database.
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GerritConfig {
    /// Base URL of the Gerrit instance, e.g. `https://review.example.com`.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound on in-flight reviewer requests during a fan-out.
    pub max_concurrent_requests: usize,
}

impl Default for GerritConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            timeout_secs: 30,
            max_concurrent_requests: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Database::default_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Origins allowed by CORS. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub default_filter: FilterWindow,
    /// `null` returns full lists.
    pub default_limit: Option<usize>,
    /// Reviewer names dropped from `topReviewers` (bots, CI accounts).
    pub excluded_usernames: Vec<String>,
    /// Accounts whose messages never count as review activity.
    pub excluded_account_ids: Vec<i64>,
    /// Projects containing any of these substrings are left out of the
    /// duration averages.
    pub excluded_projects: Vec<String>,
}

fn default_limit() -> Option<usize> {
    Some(10)
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_filter: FilterWindow::ThisMonth,
            default_limit: default_limit(),
            excluded_usernames: Vec::new(),
            excluded_account_ids: Vec::new(),
            excluded_projects: vec!["Onboarding".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
    /// Per-metric overrides keyed by metric name (`topReviewers`, ...).
    pub ttl_secs: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 600,
            ttl_secs: HashMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, metric: &str) -> Duration {
        let secs = self
            .ttl_secs
            .get(metric)
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceKind,
    pub gerrit: GerritConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub filters: FilterConfig,
    pub cache: CacheConfig,
    /// Deadline for each concurrent group of metric computations.
    pub fan_out_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            gerrit: GerritConfig::default(),
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            filters: FilterConfig::default(),
            cache: CacheConfig::default(),
            fan_out_timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".gerrit-stats");
        Ok(dir.join("config.json"))
    }

    /// Load from `path`, or from the default location when `None`. A missing
    /// file is only tolerated at the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    log::debug!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn fan_out_timeout(&self) -> Duration {
        Duration::from_secs(self.fan_out_timeout_secs)
    }
}
