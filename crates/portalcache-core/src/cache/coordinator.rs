use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::memory::MemoryCacheTier;
use super::remote::RemoteTier;
use crate::config::CacheSettings;

/// Snapshot of cache counters and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub memory_entries: usize,
    pub memory_size: usize,
    pub memory_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
}

/// One key to pre-populate with [`CacheCoordinator::warmup`].
pub struct WarmupEntry {
    pub key: String,
    pub ttl: Option<Duration>,
    pub fetcher: BoxFuture<'static, anyhow::Result<serde_json::Value>>,
}

/// Two-tier cache: memory first, remote second; writes go to both.
///
/// Keys are namespaced with the configured prefix before reaching either
/// tier. Concurrent `get_or_set` calls on a cold key may each run their
/// fetcher; fetchers are expected to be idempotent reads.
pub struct CacheCoordinator {
    memory: Arc<MemoryCacheTier>,
    remote: Option<Arc<dyn RemoteTier>>,
    key_prefix: String,
    enabled: AtomicBool,
    default_ttl_ms: AtomicU64,
    memory_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCoordinator {
    pub fn new(
        memory: Arc<MemoryCacheTier>,
        remote: Option<Arc<dyn RemoteTier>>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            memory,
            remote,
            key_prefix: settings.key_prefix.clone(),
            enabled: AtomicBool::new(settings.enabled),
            default_ttl_ms: AtomicU64::new(settings.default_ttl_secs.saturating_mul(1000)),
            memory_hits: AtomicU64::new(0),
            remote_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryCacheTier> {
        &self.memory
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Disabling also drops everything held in memory.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.memory.clear();
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms.load(Ordering::Relaxed))
    }

    pub fn set_default_ttl(&self, ttl: Duration) {
        self.default_ttl_ms
            .store(ttl.as_millis() as u64, Ordering::Relaxed);
    }

    /// Look a key up in memory, then remote. A remote hit is copied into
    /// memory. `None` means not cached anywhere.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }
        let full_key = self.full_key(key);

        if let Some(value) = self.memory.get(&full_key) {
            match serde_json::from_value(value) {
                Ok(v) => {
                    self.memory_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(v);
                }
                Err(e) => debug!(key = %full_key, error = %e, "Cached value has unexpected shape"),
            }
        }

        if let Some(ref remote) = self.remote {
            if let Some(hit) = remote.get(&full_key).await {
                let ttl = hit.ttl.unwrap_or_else(|| self.default_ttl());
                match serde_json::from_value(hit.value.clone()) {
                    Ok(v) => {
                        self.memory.set(&full_key, hit.value, ttl);
                        self.remote_hits.fetch_add(1, Ordering::Relaxed);
                        debug!(key = %full_key, "Remote cache hit, backfilled memory");
                        return Some(v);
                    }
                    Err(e) => {
                        debug!(key = %full_key, error = %e, "Remote value has unexpected shape")
                    }
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write to memory, then through to the remote tier. A missing or zero
    /// `ttl` means the configured default.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if !self.is_enabled() {
            return;
        }
        let full_key = self.full_key(key);
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Value cannot be cached");
                return;
            }
        };
        let ttl = ttl
            .filter(|t| !t.is_zero())
            .unwrap_or_else(|| self.default_ttl());

        self.memory.set(&full_key, value.clone(), ttl);
        if let Some(ref remote) = self.remote {
            remote.set(&full_key, &value, ttl).await;
        }
    }

    /// Cache-aside: return the cached value, or run `fetcher`, cache its
    /// result and return it. Fetch errors are returned and nothing is cached.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }
        let value = fetcher().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn delete(&self, key: &str) {
        let full_key = self.full_key(key);
        self.memory.delete(&full_key);
        if let Some(ref remote) = self.remote {
            remote.delete(&full_key).await;
        }
    }

    /// Drop every key containing `pattern` (plain substring match).
    pub async fn invalidate_pattern(&self, pattern: &str) {
        let removed = self.memory.invalidate_pattern(pattern);
        debug!(pattern = pattern, removed = removed, "Invalidated cache pattern");
        if let Some(ref remote) = self.remote {
            remote.invalidate(&self.full_key(pattern)).await;
        }
    }

    /// Drop everything under this cache's prefix in both tiers.
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(ref remote) = self.remote {
            remote.clear(&format!("{}*", self.key_prefix)).await;
        }
    }

    /// Fetch and store several keys concurrently. Failures are logged and
    /// skipped. Returns how many keys were populated.
    pub async fn warmup(&self, entries: Vec<WarmupEntry>) -> usize {
        let tasks = entries.into_iter().map(|entry| async move {
            match entry.fetcher.await {
                Ok(value) => {
                    self.set(&entry.key, &value, entry.ttl).await;
                    true
                }
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Cache warmup fetch failed");
                    false
                }
            }
        });
        join_all(tasks).await.into_iter().filter(|ok| *ok).count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            default_ttl_secs: self.default_ttl().as_secs(),
            memory_entries: self.memory.len(),
            memory_size: self.memory.approximate_size(),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
