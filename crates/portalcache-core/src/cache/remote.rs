//! Backend-held cache tier.
//!
//! Strictly best-effort: every failure is logged and turned into a miss or a
//! no-op so the remote tier can never fail a cache operation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, RequestDescriptor};

const GET_PATH: &str = "/cache/get";
const SET_PATH: &str = "/cache/set";
const DELETE_PATH: &str = "/cache/delete";
const CLEAR_PATH: &str = "/cache/clear";
const INVALIDATE_PATH: &str = "/cache/invalidate";

/// A value found in the remote tier.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHit {
    pub value: serde_json::Value,
    /// Remaining lifetime, when the backend reports it.
    pub ttl: Option<Duration>,
}

#[async_trait]
pub trait RemoteTier: Send + Sync {
    async fn get(&self, key: &str) -> Option<RemoteHit>;
    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration);
    async fn delete(&self, key: &str);
    /// Remove everything matching `pattern` (`prefix*` clears a namespace).
    async fn clear(&self, pattern: &str);
    async fn invalidate(&self, pattern: &str);
}

#[derive(Debug, Deserialize)]
struct GetPayload {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    exists: bool,
    #[serde(default)]
    ttl: Option<u64>,
}

#[derive(Serialize)]
struct SetRequest<'a> {
    key: &'a str,
    value: &'a serde_json::Value,
    ttl: u64,
}

#[derive(Serialize)]
struct PatternRequest<'a> {
    pattern: &'a str,
}

/// Remote tier backed by the `/cache/*` endpoints.
pub struct HttpRemoteTier {
    client: ApiClient,
    timeout: Duration,
}

impl HttpRemoteTier {
    pub fn new(client: ApiClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Remote calls are never retried and use their own short deadline.
    fn descriptor(&self, desc: RequestDescriptor) -> RequestDescriptor {
        desc.no_retry().timeout(self.timeout)
    }

    async fn fetch(&self, key: &str) -> Result<Option<RemoteHit>, ApiError> {
        let desc = self.descriptor(RequestDescriptor::get(GET_PATH).query("key", key));
        let payload: GetPayload = match self.client.fetch(&desc).await {
            Ok(payload) => payload,
            // "Cache key not found" comes back as a rejected envelope or a 404.
            Err(ApiError::Rejected { .. }) => return Ok(None),
            Err(ApiError::Http { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !payload.exists {
            return Ok(None);
        }
        Ok(payload.value.map(|value| RemoteHit {
            value,
            ttl: payload.ttl.map(Duration::from_secs),
        }))
    }

    async fn fire(&self, op: &'static str, desc: Result<RequestDescriptor, ApiError>) {
        let result = match desc {
            Ok(desc) => self.client.send(&self.descriptor(desc)).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(op = op, error = %e, "Remote cache call failed");
        }
    }
}

#[async_trait]
impl RemoteTier for HttpRemoteTier {
    async fn get(&self, key: &str) -> Option<RemoteHit> {
        match self.fetch(key).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!(key = key, error = %e, "Remote cache get failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) {
        let desc = RequestDescriptor::post(SET_PATH).json(&SetRequest {
            key,
            value,
            ttl: ttl.as_secs(),
        });
        self.fire("set", desc).await;
    }

    async fn delete(&self, key: &str) {
        self.fire("delete", Ok(RequestDescriptor::delete(DELETE_PATH).query("key", key)))
            .await;
    }

    async fn clear(&self, pattern: &str) {
        let desc = RequestDescriptor::post(CLEAR_PATH).json(&PatternRequest { pattern });
        self.fire("clear", desc).await;
    }

    async fn invalidate(&self, pattern: &str) {
        let desc = RequestDescriptor::post(INVALIDATE_PATH).json(&PatternRequest { pattern });
        self.fire("invalidate", desc).await;
    }
}
