//! Production cache built on `moka`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ::moka::Expiry;
use ::moka::future::Cache;

use super::{CacheError, InventoryCache, pattern_matches};

/// Upper bound on entries; eviction beyond this is moka's LFU policy.
const MAX_CAPACITY: u64 = 10_000;

#[derive(Clone)]
struct CachedEntry {
    value: serde_json::Value,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Cache backed by `moka::future::Cache` with per-entry TTL and
/// closure-based pattern invalidation.
pub struct MokaCache {
    cache: Cache<String, CachedEntry>,
}

impl MokaCache {
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CAPACITY)
            .expire_after(PerEntryTtl)
            .support_invalidation_closures()
            .build();

        Self { cache }
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryCache for MokaCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_string(), CachedEntry { value, ttl })
            .await;
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        // Collect matching keys first so we can report a count; each
        // removal is atomic per key.
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| pattern_matches(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        let removed = keys.len() as u64;
        for key in keys {
            self.cache.invalidate(&key).await;
        }
        self.cache.run_pending_tasks().await;

        Ok(removed)
    }

    async fn flush(&self, pattern: &str) -> Result<(), CacheError> {
        let pattern = pattern.to_string();
        self.cache
            .invalidate_entries_if(move |key, _| pattern_matches(&pattern, key))
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = MokaCache::new();
        cache
            .set("listing:7", json!({"artist": "Alice Coltrane"}), Duration::from_secs(300))
            .await
            .expect("set");

        let hit = cache.get("listing:7").await.expect("get");
        assert_eq!(hit, Some(json!({"artist": "Alice Coltrane"})));
        assert!(cache.get("listing:8").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern() {
        let cache = MokaCache::new();
        cache
            .set("inventory:1:12", json!(1), Duration::from_secs(300))
            .await
            .expect("set");
        cache
            .set("inventory:2:12", json!(2), Duration::from_secs(300))
            .await
            .expect("set");
        cache
            .set("listing:5", json!(5), Duration::from_secs(300))
            .await
            .expect("set");

        let removed = cache.invalidate("inventory:*").await.expect("invalidate");
        assert_eq!(removed, 2);
        assert!(cache.get("inventory:1:12").await.expect("get").is_none());
        assert!(cache.get("listing:5").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_flush_removes_matches() {
        let cache = MokaCache::new();
        cache
            .set("release:1", json!("a"), Duration::from_secs(300))
            .await
            .expect("set");
        cache.flush("release:*").await.expect("flush");
        assert!(cache.get("release:1").await.expect("get").is_none());
    }
}
