//! TTL lookup cache for reference tables and per-entity media lists.
//!
//! A single in-memory map guarded by a mutex. The cache is built once per
//! run and handed to adapters and the enrichment stage as an
//! `Arc<LookupCache>`; nothing survives a process restart.
//!
//! Reads at or after an entry's expiry behave as a miss. Writes always reset
//! the expiry from "now". Two workers missing the same key may both fetch;
//! the later write wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

struct Entry {
    value: Value,
    expires_at: Instant,
}

pub struct LookupCache {
    entries: Mutex<HashMap<String, Entry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// Lookup as of `now`.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let found = {
            let entries = self.lock();
            entries
                .get(key)
                .filter(|e| now < e.expires_at)
                .map(|e| e.value.clone())
        };
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store `value` so that it expires at `now + ttl`.
    pub fn set_at(&self, key: &str, value: Value, ttl: Duration, now: Instant) {
        let expires_at = now + ttl;
        self.lock()
            .insert(key.to_string(), Entry { value, expires_at });
    }

    /// Typed read. A value that no longer deserializes as `T` is a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl),
            Err(e) => tracing::warn!(key = %key, error = %e, "value not cacheable"),
        }
    }

    /// Return the cached `T` for `key`, or run `fetch`, cache its result for
    /// `ttl`, and return it. Fetch errors are returned and not cached.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_as::<T>(key) {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.set_as(key, &value, ttl);
        Ok(value)
    }

    /// Drop every entry that has expired as of now. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_hit_before_ttl_miss_at_and_after() {
        let cache = LookupCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        let ttl = Duration::from_secs(10);
        cache.set_at("k", json!(1), ttl, t0);

        assert_eq!(cache.get_at("k", t0), Some(json!(1)));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(9)), Some(json!(1)));
        assert_eq!(cache.get_at("k", t0 + ttl), None);
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(11)), None);
    }

    #[test]
    fn test_write_resets_expiry() {
        let cache = LookupCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        let ttl = Duration::from_secs(10);
        cache.set_at("k", json!("a"), ttl, t0);
        cache.set_at("k", json!("b"), ttl, t0 + Duration::from_secs(8));

        let later = t0 + Duration::from_secs(15);
        assert_eq!(cache.get_at("k", later), Some(json!("b")));
    }

    #[test]
    fn test_cold_cache_misses_and_counts() {
        let cache = LookupCache::new(Duration::from_secs(60));
        assert!(cache.get("anything").is_none());
        cache.set("x", json!({"a": 1}), Duration::from_secs(60));
        assert!(cache.get("x").is_some());
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_typed_roundtrip_and_shape_mismatch_is_miss() {
        let cache = LookupCache::new(Duration::from_secs(60));
        cache.set_as("names", &vec!["a".to_string()], Duration::from_secs(60));
        assert_eq!(cache.get_as::<Vec<String>>("names"), Some(vec!["a".to_string()]));
        assert_eq!(cache.get_as::<u32>("names"), None);
    }

    #[test]
    fn test_purge_expired() {
        let cache = LookupCache::new(Duration::from_secs(60));
        cache.set("gone", json!(1), Duration::ZERO);
        cache.set("kept", json!(2), Duration::from_secs(60));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_fetches_once() {
        let cache = LookupCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v: Result<Vec<u32>, String> = cache
                .get_or_fetch("table", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(v.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_does_not_cache_errors() {
        let cache = LookupCache::new(Duration::from_secs(60));
        let r: Result<u32, String> = cache
            .get_or_fetch("k", Duration::from_secs(60), || async { Err("down".to_string()) })
            .await;
        assert!(r.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_corrupt() {
        let cache = Arc::new(LookupCache::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.set(&format!("k{}", i % 4), json!(i), Duration::from_secs(60));
                cache.get(&format!("k{}", i % 4))
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_some());
        }
        assert_eq!(cache.len(), 4);
    }
}
