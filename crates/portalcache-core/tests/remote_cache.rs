mod common;

use std::sync::Arc;
use std::time::Duration;

use portalcache_core::cache::{CacheCoordinator, HttpRemoteTier, MemoryCacheTier, RemoteTier};
use portalcache_core::config::CacheSettings;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn coordinator(server: &MockServer) -> CacheCoordinator {
    let remote: Arc<dyn RemoteTier> = Arc::new(HttpRemoteTier::new(
        common::client(server),
        Duration::from_millis(500),
    ));
    CacheCoordinator::new(
        Arc::new(MemoryCacheTier::new()),
        Some(remote),
        &CacheSettings::default(),
    )
}

#[tokio::test]
async fn test_remote_hit_backfills_memory_with_remote_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cache/get"))
        .and(query_param("key", "portal_sabercon:user:1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"value": {"name": "Ana"}, "exists": true, "ttl": 120}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = coordinator(&server);
    let first: Option<serde_json::Value> = cache.get("user:1").await;
    assert_eq!(first, Some(json!({"name": "Ana"})));

    // Second read is served from memory.
    let second: Option<serde_json::Value> = cache.get("user:1").await;
    assert_eq!(second, first);

    let entry = cache.memory().entry("portal_sabercon:user:1").unwrap();
    assert_eq!(entry.ttl, Duration::from_secs(120));
    let stats = cache.stats();
    assert_eq!(stats.remote_hits, 1);
    assert_eq!(stats.memory_hits, 1);
    server.verify().await;
}

#[tokio::test]
async fn test_remote_failure_is_a_miss() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cache/get"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let cache = coordinator(&server);
    let value: Option<String> = cache.get("missing").await;
    assert_eq!(value, None);
    assert_eq!(cache.stats().misses, 1);
    server.verify().await;
}

#[tokio::test]
async fn test_remote_not_found_is_a_miss() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cache/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Cache key not found"
        })))
        .mount(&server)
        .await;

    let cache = coordinator(&server);
    assert_eq!(cache.get::<String>("nope").await, None);
}

#[tokio::test]
async fn test_set_writes_through_and_survives_remote_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cache/set"))
        .and(body_json(json!({
            "key": "portal_sabercon:roles:active",
            "value": ["admin"],
            "ttl": 60
        })))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let cache = coordinator(&server);
    cache
        .set("roles:active", &vec!["admin"], Some(Duration::from_secs(60)))
        .await;

    // Remote calls are never retried, and memory still holds the value.
    assert_eq!(
        cache.get::<Vec<String>>("roles:active").await,
        Some(vec!["admin".to_string()])
    );
    server.verify().await;
}

#[tokio::test]
async fn test_invalidate_and_clear_reach_remote_with_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cache/invalidate"))
        .and(body_json(json!({"pattern": "portal_sabercon:users:list:"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/cache/clear"))
        .and(body_json(json!({"pattern": "portal_sabercon:*"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let cache = CacheCoordinator::new(
        Arc::new(MemoryCacheTier::new()),
        Some(Arc::new(HttpRemoteTier::new(
            common::client(&server),
            Duration::from_millis(500),
        ))),
        &CacheSettings::default(),
    );
    cache.invalidate_pattern("users:list:").await;
    cache.clear().await;
    server.verify().await;
}
