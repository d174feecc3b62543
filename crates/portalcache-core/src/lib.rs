//! Portalcache core - the resilient API/cache runtime shared by the portal's
//! service modules.
//!
//! It attaches and transparently refreshes bearer tokens, retries transient
//! failures with exponential backoff, and keeps a two-tier (memory + remote)
//! cache with TTL expiry and pattern invalidation.
//!
//! Build a [`PortalContext`] once at startup and hand it to consumers.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod jobs;

pub use api::{
    ApiClient, ApiError, ApiResponse, RequestDescriptor, ResourceService, RetryPolicy,
};
pub use auth::{AuthRefreshCoordinator, Credentials, TokenStore};
pub use cache::{CacheCoordinator, CacheKeys, CacheTtl};
pub use config::ClientConfig;
pub use context::PortalContext;
pub use jobs::{JobOptions, JobQueue};
