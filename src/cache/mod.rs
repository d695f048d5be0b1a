//! Namespaced cache layer with TTL, atomic rate-limit counters, and batched
//! pattern-scan deletion.
//!
//! Grounded on `redis_service.py`'s `_build_key` prefix/namespace/key joining,
//! its `pipeline.incr`/`pipeline.expire` atomic rate-limit pairing, and its
//! `scan_iter(pattern, count=100)` batched pattern deletion. Backed here by
//! `moka::sync::Cache` for general storage and a `parking_lot`-guarded
//! fixed-window counter map for rate limiting — `governor` (also available in
//! this stack) implements token-bucket/GCRA, not the literal INCR+EXPIRE
//! fixed-window semantics this layer must emulate, so it is not used here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::errors::PromptsmithResult;

mod in_process;
pub use in_process::InProcessCacheClient;

#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub count: u64,
}

/// Namespaced cache + rate-limit contract consumed by the classifier and
/// orchestrator. All operations are fallible but callers apply the
/// fail-open (rate limit) / fail-to-miss (read) / no-op (write) policy at
/// the call site, never propagating cache errors as hard failures.
#[async_trait::async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> PromptsmithResult<Option<Vec<u8>>>;
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> PromptsmithResult<()>;
    async fn delete(&self, namespace: &str, key: &str) -> PromptsmithResult<bool>;
    async fn delete_by_pattern(&self, namespace: &str, pattern: &str) -> PromptsmithResult<u64>;
    async fn exists(&self, namespace: &str, key: &str) -> PromptsmithResult<bool>;
    async fn set_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> PromptsmithResult<bool>;
    async fn get_many(
        &self,
        namespace: &str,
        keys: &[String],
    ) -> PromptsmithResult<Vec<Option<Vec<u8>>>>;
    async fn set_many(
        &self,
        namespace: &str,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> PromptsmithResult<()>;

    /// Atomically increments `identifier`'s counter, setting TTL=`window` the
    /// first time it is created, and reports whether the running count is
    /// still within `limit`.
    async fn check_rate_limit(
        &self,
        identifier: &str,
        limit: u64,
        window: Duration,
    ) -> PromptsmithResult<RateLimitResult>;

    async fn get_rate_limit_info(&self, identifier: &str) -> PromptsmithResult<Option<(u64, Duration)>>;
}

/// Convenience helpers layered over the raw `CacheClient` contract, grounded
/// on `redis_service.py`'s `cache_session`/`cache_response`/`cache_prediction`
/// sugar methods. Implemented generically over any `CacheClient`.
pub struct CacheFacade<'a> {
    client: &'a dyn CacheClient,
}

impl<'a> CacheFacade<'a> {
    pub fn new(client: &'a dyn CacheClient) -> Self {
        CacheFacade { client }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> PromptsmithResult<Option<T>> {
        match self.client.get(namespace, key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("cache value for {namespace}:{key} failed to decode: {e}");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("cache read failed for {namespace}:{key}, treating as miss: {e}");
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize + Sync>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                if let Err(e) = self.client.set(namespace, key, bytes, ttl).await {
                    warn!("cache write failed for {namespace}:{key}, continuing: {e}");
                }
            }
            Err(e) => warn!("cache value for {namespace}:{key} failed to encode: {e}"),
        }
    }

    pub async fn cache_session<T: Serialize + Sync>(&self, session_id: &str, value: &T, ttl: Duration) {
        self.set_json("session", session_id, value, ttl).await;
    }

    pub async fn get_session<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        self.get_json("session", session_id).await.ok().flatten()
    }

    pub async fn cache_response<T: Serialize + Sync>(&self, fingerprint: &str, value: &T, ttl: Duration) {
        self.set_json("response", fingerprint, value, ttl).await;
    }

    pub async fn get_cached_response<T: DeserializeOwned>(&self, fingerprint: &str) -> Option<T> {
        self.get_json("response", fingerprint).await.ok().flatten()
    }

    pub async fn cache_prediction<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        self.set_json("prediction", key, value, ttl).await;
    }

    pub async fn get_cached_prediction<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_json("prediction", key).await.ok().flatten()
    }
}

/// Fixed-window counter map used by `InProcessCacheClient::check_rate_limit`.
/// A single mutex guards increment + TTL-install so both steps act as one
/// atomic submission, matching the "single atomic submission of INCR+EXPIRE"
/// requirement without a real pipelined backend.
#[derive(Default)]
pub(crate) struct RateLimitCounters {
    inner: Mutex<HashMap<String, CounterEntry>>,
}

struct CounterEntry {
    count: u64,
    resets_at: Instant,
    window: Duration,
}

impl RateLimitCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(RateLimitCounters::default())
    }

    pub fn check(&self, identifier: &str, limit: u64, window: Duration) -> RateLimitResult {
        let now = Instant::now();
        let mut map = self.inner.lock();
        let entry = map.entry(identifier.to_string()).or_insert_with(|| CounterEntry {
            count: 0,
            resets_at: now + window,
            window,
        });
        if now >= entry.resets_at {
            entry.count = 0;
            entry.resets_at = now + window;
            entry.window = window;
        }
        entry.count += 1;
        RateLimitResult {
            allowed: entry.count <= limit,
            count: entry.count,
        }
    }

    pub fn info(&self, identifier: &str) -> Option<(u64, Duration)> {
        let now = Instant::now();
        let map = self.inner.lock();
        map.get(identifier).and_then(|e| {
            if now >= e.resets_at {
                None
            } else {
                Some((e.count, e.resets_at - now))
            }
        })
    }
}
