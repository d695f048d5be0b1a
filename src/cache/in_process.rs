use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

use crate::config::CacheConfig;
use crate::errors::PromptsmithResult;

use super::{CacheClient, RateLimitCounters, RateLimitResult};

/// Stored alongside each value so the per-entry `Expiry` policy below can
/// honor the TTL each `set`/`set_if_absent` call supplies, since moka's
/// cache-wide builder only configures a single uniform policy.
#[derive(Clone)]
struct Entry {
    bytes: Vec<u8>,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process `CacheClient` backed by `moka::sync::Cache` for general
/// namespaced storage. `moka` is declared in the teacher's dependency table
/// but never wired up there; this is its first real use in this codebase.
///
/// Since `moka::sync::Cache` has no native pattern-scan, `delete_by_pattern`
/// iterates a snapshot of keys in batches of `scan_batch_size`, matching the
/// "non-blocking, small batches" contract without requiring a real server.
pub struct InProcessCacheClient {
    prefix: String,
    scan_batch_size: usize,
    store: Cache<String, Entry>,
    rate_limits: Arc<RateLimitCounters>,
}

impl InProcessCacheClient {
    pub fn new(config: &CacheConfig) -> Self {
        InProcessCacheClient {
            prefix: config.key_prefix.clone(),
            scan_batch_size: config.scan_batch_size,
            store: Cache::builder()
                .max_capacity(config.max_entries)
                .expire_after(PerEntryExpiry)
                .build(),
            rate_limits: RateLimitCounters::new(),
        }
    }

    fn full_key(&self, namespace: &str, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, namespace, key)
    }

    fn namespace_prefix(&self, namespace: &str) -> String {
        format!("{}:{}:", self.prefix, namespace)
    }
}

#[async_trait::async_trait]
impl CacheClient for InProcessCacheClient {
    async fn get(&self, namespace: &str, key: &str) -> PromptsmithResult<Option<Vec<u8>>> {
        Ok(self.store.get(&self.full_key(namespace, key)).map(|e| e.bytes))
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> PromptsmithResult<()> {
        self.store.insert(self.full_key(namespace, key), Entry { bytes: value, ttl });
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> PromptsmithResult<bool> {
        let full = self.full_key(namespace, key);
        let existed = self.store.contains_key(&full);
        self.store.invalidate(&full);
        Ok(existed)
    }

    async fn delete_by_pattern(&self, namespace: &str, pattern: &str) -> PromptsmithResult<u64> {
        let prefix = self.namespace_prefix(namespace);
        let glob = glob_to_regex(pattern);
        let matches: Vec<String> = self
            .store
            .iter()
            .filter_map(|(k, _)| {
                let key = k.as_str();
                key.strip_prefix(prefix.as_str())
                    .filter(|rest| glob.is_match(rest))
                    .map(|_| key.to_string())
            })
            .collect();

        let mut removed = 0u64;
        for chunk in matches.chunks(self.scan_batch_size) {
            for key in chunk {
                self.store.invalidate(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, namespace: &str, key: &str) -> PromptsmithResult<bool> {
        Ok(self.store.contains_key(&self.full_key(namespace, key)))
    }

    async fn set_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> PromptsmithResult<bool> {
        let full = self.full_key(namespace, key);
        let entry = self.store.entry(full).or_insert_with(|| Entry { bytes: value, ttl });
        Ok(entry.is_fresh())
    }

    async fn get_many(
        &self,
        namespace: &str,
        keys: &[String],
    ) -> PromptsmithResult<Vec<Option<Vec<u8>>>> {
        Ok(keys
            .iter()
            .map(|k| self.store.get(&self.full_key(namespace, k)).map(|e| e.bytes))
            .collect())
    }

    async fn set_many(
        &self,
        namespace: &str,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> PromptsmithResult<()> {
        for (key, value) in entries {
            self.set(namespace, key, value.clone(), ttl).await?;
        }
        Ok(())
    }

    async fn check_rate_limit(
        &self,
        identifier: &str,
        limit: u64,
        window: Duration,
    ) -> PromptsmithResult<RateLimitResult> {
        Ok(self.rate_limits.check(identifier, limit, window))
    }

    async fn get_rate_limit_info(&self, identifier: &str) -> PromptsmithResult<Option<(u64, Duration)>> {
        Ok(self.rate_limits.info(identifier))
    }
}

/// Translates a small `*`/`?` glob subset into a regex, sufficient for the
/// pattern shapes the orchestrator/classifier issue (e.g. `intent:*`).
fn glob_to_regex(pattern: &str) -> regex::Regex {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('$');
    regex::Regex::new(&out).unwrap_or_else(|_| regex::Regex::new("$^").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> InProcessCacheClient {
        InProcessCacheClient::new(&CacheConfig::default())
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let c = client();
        c.set("intent", "k1", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let got = c.get("intent", "k1").await.unwrap();
        assert_eq!(got, Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn get_miss_returns_none_not_error() {
        let c = client();
        let got = c.get("intent", "missing").await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn set_if_absent_succeeds_once() {
        let c = client();
        let first = c
            .set_if_absent("session", "s1", b"a".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        let second = c
            .set_if_absent("session", "s1", b"b".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(c.get("session", "s1").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn delete_by_pattern_removes_matching_only() {
        let c = client();
        c.set("response", "a:1", b"x".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        c.set("response", "a:2", b"x".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        c.set("response", "b:1", b"x".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let removed = c.delete_by_pattern("response", "a:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(c.exists("response", "b:1").await.unwrap());
    }

    #[tokio::test]
    async fn rate_limit_boundary() {
        let c = client();
        for _ in 0..2 {
            let r = c
                .check_rate_limit("ip-1", 2, Duration::from_secs(60))
                .await
                .unwrap();
            assert!(r.allowed);
        }
        let third = c
            .check_rate_limit("ip-1", 2, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!third.allowed);
    }
}
