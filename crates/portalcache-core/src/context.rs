//! The runtime context built once at application start.
//!
//! `PortalContext` owns the token store, the API client, the two-tier cache
//! and the job queue client, and keeps the cache sweep task alive. Service
//! modules receive it (or clones of its parts) instead of reaching for
//! globals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::auth::{CookieJar, FileStore, KeyValueStore, KeyringStore, MemoryStore, TokenStore};
use crate::cache::{CacheCoordinator, HttpRemoteTier, MemoryCacheTier, RemoteTier};
use crate::config::{ClientConfig, StorageBackend};
use crate::jobs::JobQueue;

/// Auth storage file name in the storage directory
const AUTH_STORE_FILE: &str = "auth.json";

/// Cookie jar file name in the storage directory
const COOKIE_FILE: &str = "cookies.json";

pub struct PortalContext {
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    api: ApiClient,
    cache: Arc<CacheCoordinator>,
    jobs: JobQueue,
    sweeper: Option<JoinHandle<()>>,
}

impl PortalContext {
    /// Build the context with the storage backends named in `config`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let (primary, cookies): (Arc<dyn KeyValueStore>, CookieJar) = match config.storage {
            StorageBackend::Memory => (Arc::new(MemoryStore::new()), CookieJar::in_memory()),
            StorageBackend::File => {
                let dir = config.storage_dir()?;
                (
                    Arc::new(FileStore::new(dir.join(AUTH_STORE_FILE))),
                    CookieJar::persistent(dir.join(COOKIE_FILE))?,
                )
            }
            StorageBackend::Keyring => {
                let dir = config.storage_dir()?;
                (
                    Arc::new(KeyringStore::default()),
                    CookieJar::persistent(dir.join(COOKIE_FILE))?,
                )
            }
        };
        let tokens = Arc::new(TokenStore::new(primary, Arc::new(cookies)));
        Self::with_token_store(config, tokens)
    }

    /// Build the context around an existing token store.
    ///
    /// The cache sweep task is started when called inside a tokio runtime.
    pub fn with_token_store(config: ClientConfig, tokens: Arc<TokenStore>) -> Result<Self> {
        let api = ApiClient::new(&config, tokens.clone()).context("Failed to build API client")?;

        let memory = Arc::new(MemoryCacheTier::new());
        let remote: Option<Arc<dyn RemoteTier>> = if config.cache.remote_enabled {
            Some(Arc::new(HttpRemoteTier::new(
                api.clone(),
                Duration::from_millis(config.cache.remote_timeout_ms),
            )))
        } else {
            None
        };
        let cache = Arc::new(CacheCoordinator::new(memory.clone(), remote, &config.cache));

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(memory.spawn_sweeper(Duration::from_secs(
                config.cache.sweep_interval_secs.max(1),
            ))),
            Err(_) => {
                warn!("No tokio runtime, cache sweeper not started");
                None
            }
        };

        info!(api = %config.api_base_url, storage = ?config.storage, "Portal context ready");

        Ok(Self {
            jobs: JobQueue::new(api.clone()),
            config,
            tokens,
            api,
            cache,
            sweeper,
        })
    }

    /// Load configuration from file and environment, then build.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::load()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator> {
        &self.cache
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PortalContext {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}
