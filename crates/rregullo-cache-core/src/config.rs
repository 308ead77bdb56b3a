//! Configuration management.
//!
//! The configuration names the site origin, the cache manifest, the
//! cross-origin hosts the cache may handle and the report endpoint the
//! background sync delivers to. Missing fields fall back to the site
//! defaults.
//!
//! Configuration is stored at `~/.config/rregullo-cache/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use crate::manifest::{AssetManifest, DEFAULT_ASSETS};
use crate::net::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "rregullo-cache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "RREGULLO_CACHE_CONFIG";

const DEFAULT_ORIGIN: &str = "http://localhost:8080";
const DEFAULT_PRODUCTION_ORIGIN: &str = "https://rregullotiranen.al";
const DEFAULT_CACHE_PREFIX: &str = "rregullo-tiranen";
const DEFAULT_API_MARKER: &str = "/api/";
const DEFAULT_OFFLINE_PAGE: &str = "/offline.html";
const DEFAULT_REPORT_ENDPOINT: &str = "/api/reports";
const DEFAULT_CROSS_ORIGIN_HOSTS: &[&str] = &["fonts.googleapis.com", "unpkg.com"];

/// Attempts before a queued report that keeps failing is abandoned.
const DEFAULT_MAX_SYNC_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin the worker is registered for.
    pub origin: String,
    /// Declared production origin, trusted for cross-context messages.
    pub production_origin: Option<String>,
    pub cache_prefix: String,
    /// Literal bucket name. When unset the name is derived from the manifest hash.
    pub cache_version: Option<String>,
    pub assets: Vec<String>,
    /// Cross-origin hosts whose requests the cache may handle.
    pub cross_origin_hosts: Vec<String>,
    /// URLs containing this substring are never stored.
    pub api_marker: String,
    pub offline_page: String,
    pub skip_waiting_on_install: bool,
    pub request_timeout_secs: u64,
    pub report_endpoint: String,
    pub max_sync_attempts: u32,
    pub cache_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            production_origin: Some(DEFAULT_PRODUCTION_ORIGIN.to_string()),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            cache_version: None,
            assets: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
            cross_origin_hosts: DEFAULT_CROSS_ORIGIN_HOSTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            api_marker: DEFAULT_API_MARKER.to_string(),
            offline_page: DEFAULT_OFFLINE_PAGE.to_string(),
            skip_waiting_on_install: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            report_endpoint: DEFAULT_REPORT_ENDPOINT.to_string(),
            max_sync_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
            cache_dir: None,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load from `RREGULLO_CACHE_CONFIG` if set, else the default location.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::config_path()?,
        };
        Self::load_from(&path)
    }

    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn manifest(&self) -> AssetManifest {
        AssetManifest::new(self.assets.iter().cloned())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate and convert into the settings the worker runs with.
    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        let origin = parse_origin(&self.origin).context("Invalid origin")?;

        let mut trusted_origins = vec![origin.origin()];
        if let Some(ref production) = self.production_origin {
            let production = parse_origin(production).context("Invalid production_origin")?;
            trusted_origins.push(production.origin());
        }

        let offline_page = origin
            .join(&self.offline_page)
            .with_context(|| format!("Invalid offline_page: {}", self.offline_page))?;

        let report_endpoint = origin
            .join(&self.report_endpoint)
            .with_context(|| format!("Invalid report_endpoint: {}", self.report_endpoint))?;

        Ok(WorkerSettings {
            origin,
            trusted_origins,
            cross_origin_hosts: self
                .cross_origin_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            api_marker: self.api_marker.clone(),
            offline_page,
            cache_prefix: self.cache_prefix.clone(),
            cache_version: self.cache_version.clone(),
            skip_waiting_on_install: self.skip_waiting_on_install,
            report_endpoint,
            max_sync_attempts: self.max_sync_attempts.max(1),
        })
    }
}

fn parse_origin(origin: &str) -> Result<Url> {
    let url = Url::parse(origin).with_context(|| format!("Not a URL: {}", origin))?;
    if !url.origin().is_tuple() {
        anyhow::bail!("Not a network origin: {}", origin);
    }
    Ok(url)
}

/// Validated settings the worker runs with.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub origin: Url,
    pub trusted_origins: Vec<Origin>,
    pub cross_origin_hosts: Vec<String>,
    pub api_marker: String,
    pub offline_page: Url,
    pub cache_prefix: String,
    pub cache_version: Option<String>,
    pub skip_waiting_on_install: bool,
    pub report_endpoint: Url,
    pub max_sync_attempts: u32,
}

impl WorkerSettings {
    /// Settings for `origin` with every other field at its default.
    pub fn for_origin(origin: &str) -> Result<Self> {
        Config {
            origin: origin.to_string(),
            ..Config::default()
        }
        .worker_settings()
    }
}
