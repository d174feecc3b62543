#![allow(dead_code)]

use std::sync::Arc;

use portalcache_core::api::ApiClient;
use portalcache_core::auth::{CookieJar, MemoryStore, TokenStore};
use portalcache_core::config::{ClientConfig, RetrySettings, StorageBackend};
use wiremock::MockServer;

/// Config pointing at the mock server's `/api`, with a fast backoff.
pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        api_base_url: format!("{}/api", server.uri()),
        request_timeout_ms: 2_000,
        retry: RetrySettings {
            max_attempts: 3,
            base_delay_ms: 1,
        },
        storage: StorageBackend::Memory,
        ..ClientConfig::default()
    }
}

pub fn tokens() -> Arc<TokenStore> {
    Arc::new(TokenStore::new(
        Arc::new(MemoryStore::new()),
        Arc::new(CookieJar::in_memory()),
    ))
}

pub fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&config(server), tokens()).unwrap()
}
