use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub written_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(key: String, value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            key,
            value,
            written_at: Instant::now(),
            ttl,
        }
    }

    pub fn age(&self) -> Duration {
        self.written_at.elapsed()
    }

    /// Valid while `now - written_at < ttl`.
    pub fn is_valid(&self) -> bool {
        self.age() < self.ttl
    }

    /// Time left before the entry expires.
    pub fn remaining_ttl(&self) -> Duration {
        self.ttl.saturating_sub(self.age())
    }
}

/// In-process tier. Reads never mutate; expired entries linger until the
/// next sweep, overwrite or delete.
#[derive(Debug, Default)]
pub struct MemoryCacheTier {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|e| e.is_valid())
            .map(|e| e.value.clone())
    }

    /// Like `get`, but returns the whole entry.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).filter(|e| e.is_valid()).cloned()
    }

    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), CacheEntry::new(key.to_string(), value, ttl));
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Remove every key containing `pattern`. Returns how many were removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        before - entries.len()
    }

    /// Evict every expired entry. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.is_valid());
        before - entries.len()
    }

    /// Entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialized size of keys and values, in bytes.
    pub fn approximate_size(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .map(|e| e.key.len() + e.value.to_string().len())
            .sum()
    }

    /// Run `sweep` every `interval` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let tier = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(tier) = tier.upgrade() else {
                    break;
                };
                let evicted = tier.sweep();
                if evicted > 0 {
                    debug!(
                        evicted = evicted,
                        remaining = tier.len(),
                        "Swept expired cache entries"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let tier = MemoryCacheTier::new();
        tier.set("k", json!("v"), Duration::from_secs(1));
        assert_eq!(tier.get("k"), Some(json!("v")));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(tier.get("k"), Some(json!("v")));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(tier.get("k"), None);
        // Reads do not evict.
        assert_eq!(tier.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_resets_clock() {
        let tier = MemoryCacheTier::new();
        tier.set("k", json!(1), Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(1)).await;
        tier.set("k", json!(2), Duration::from_secs(2));
        tokio::time::advance(Duration::from_millis(1500)).await;

        let entry = tier.entry("k").unwrap();
        assert_eq!(entry.value, json!(2));
        assert_eq!(entry.remaining_ttl(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_expired() {
        let tier = MemoryCacheTier::new();
        tier.set("short", json!(1), Duration::from_secs(1));
        tier.set("long", json!(2), Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(tier.sweep(), 1);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("long"), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_runs_on_interval() {
        let tier = Arc::new(MemoryCacheTier::new());
        tier.set("k", json!(1), Duration::from_secs(1));
        let handle = tier.spawn_sweeper(Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(tier.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tier.len(), 0);
        handle.abort();
    }

    #[test]
    fn test_invalidate_pattern_is_substring_match() {
        let tier = MemoryCacheTier::new();
        let ttl = Duration::from_secs(60);
        tier.set("p:users:list:a", json!(1), ttl);
        tier.set("p:users:list:b", json!(2), ttl);
        tier.set("p:roles:1", json!(3), ttl);

        assert_eq!(tier.invalidate_pattern("users:list:"), 2);
        assert_eq!(tier.get("p:roles:1"), Some(json!(3)));
        assert_eq!(tier.invalidate_pattern("users:*"), 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let tier = MemoryCacheTier::new();
        tier.set("a", json!(1), Duration::from_secs(60));
        tier.set("b", json!(2), Duration::from_secs(60));
        assert!(tier.delete("a"));
        assert!(!tier.delete("a"));
        assert!(tier.approximate_size() > 0);
        tier.clear();
        assert!(tier.is_empty());
    }
}
