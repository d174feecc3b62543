//! Two-tier caching module.
//!
//! This module provides the `CacheCoordinator`, which serves values from an
//! in-process `MemoryCacheTier` first and a backend-held `RemoteTier`
//! second. Entries carry a TTL and are never served once it has elapsed.
//!
//! Also included:
//! - `CacheKeys` / `CacheTtl`: key builders and TTL presets per data type
//! - Domain invalidation helpers (users, roles, institutions, courses)

pub mod coordinator;
pub mod keys;
pub mod memory;
pub mod remote;

pub use coordinator::{CacheCoordinator, CacheStats, WarmupEntry};
pub use keys::{CacheKeys, CacheTtl};
pub use memory::{CacheEntry, MemoryCacheTier};
pub use remote::{HttpRemoteTier, RemoteHit, RemoteTier};
