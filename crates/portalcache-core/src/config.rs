//! Client runtime configuration.
//!
//! Configuration is stored at `~/.config/portalcache/config.json`; any value
//! can be overridden from the environment (a `.env` file is honored).

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/storage directory paths
const APP_NAME: &str = "portalcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";

/// Redirect requests whose path starts with `prefix` to another base URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOverride {
    pub prefix: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: crate::api::retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: crate::api::retry::DEFAULT_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub key_prefix: String,
    pub sweep_interval_secs: u64,
    pub remote_enabled: bool,
    pub remote_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 300,
            key_prefix: "portal_sabercon:".to_string(),
            sweep_interval_secs: 300,
            remote_enabled: true,
            remote_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub route_overrides: Vec<RouteOverride>,
    pub request_timeout_ms: u64,
    pub retry: RetrySettings,
    pub cache: CacheSettings,
    pub storage: StorageBackend,
    /// Where file-backed auth state lives; defaults to the user cache dir.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            route_overrides: Vec::new(),
            request_timeout_ms: 30_000,
            retry: RetrySettings::default(),
            cache: CacheSettings::default(),
            storage: StorageBackend::default(),
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.api_base_url = normalize_base_url(&config.api_base_url);
        Ok(config)
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply `PORTAL_*` overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key = key, value = %raw, "Ignoring invalid environment override");
                    None
                }
            }
        }

        if let Some(url) = lookup("PORTAL_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(ms) = parsed("PORTAL_REQUEST_TIMEOUT_MS", lookup("PORTAL_REQUEST_TIMEOUT_MS")) {
            self.request_timeout_ms = ms;
        }
        if let Some(n) = parsed("PORTAL_RETRY_MAX_ATTEMPTS", lookup("PORTAL_RETRY_MAX_ATTEMPTS")) {
            self.retry.max_attempts = n;
        }
        if let Some(enabled) = parsed("PORTAL_CACHE_ENABLED", lookup("PORTAL_CACHE_ENABLED")) {
            self.cache.enabled = enabled;
        }
        if let Some(ttl) = parsed("PORTAL_CACHE_TTL_SECS", lookup("PORTAL_CACHE_TTL_SECS")) {
            self.cache.default_ttl_secs = ttl;
        }
        if let Some(prefix) = lookup("PORTAL_CACHE_PREFIX") {
            self.cache.key_prefix = prefix;
        }
        if let Some(storage) = lookup("PORTAL_STORAGE") {
            match storage.trim().to_ascii_lowercase().as_str() {
                "memory" => self.storage = StorageBackend::Memory,
                "file" => self.storage = StorageBackend::File,
                "keyring" => self.storage = StorageBackend::Keyring,
                other => warn!(value = other, "Unknown PORTAL_STORAGE backend"),
            }
        }
    }
}

/// Trim trailing slashes and make sure the base ends in `/api`.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_BASE_URL.to_string();
    }
    if trimmed.ends_with("/api") {
        trimmed.to_string()
    } else {
        format!("{}/api", trimmed)
    }
}
