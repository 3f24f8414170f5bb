//! Deterministic in-memory cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CacheError, InventoryCache, pattern_matches};

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-memory cache keyed by string with per-entry expiry.
///
/// Uses `tokio::time::Instant` so TTL behavior is exact under a paused
/// test clock. Suitable for tests and single-instance deployments.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    /// Whether the cache holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|e| CacheError::Backend(format!("cache lock poisoned: {e}")))
    }
}

#[async_trait]
impl InventoryCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Expired reads are misses; drop the entry on the way out.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !pattern_matches(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn flush(&self, pattern: &str) -> Result<(), CacheError> {
        self.invalidate(pattern).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_after_set_within_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("listing:1", json!({"title": "Kind of Blue"}), Duration::from_secs(60))
            .await
            .expect("set");

        let hit = cache.get("listing:1").await.expect("get");
        assert_eq!(hit, Some(json!({"title": "Kind of Blue"})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_expiry_is_miss() {
        let cache = MemoryCache::new();
        cache
            .set("listing:1", json!(1), Duration::from_secs(30))
            .await
            .expect("set");

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("listing:1").await.expect("get").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("listing:1").await.expect("get").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_pattern_returns_count() {
        let cache = MemoryCache::new();
        for page in 1..=3 {
            cache
                .set(&format!("inventory:{page}"), json!(page), Duration::from_secs(60))
                .await
                .expect("set");
        }
        cache
            .set("release:9", json!("release"), Duration::from_secs(60))
            .await
            .expect("set");

        let removed = cache.invalidate("inventory:*").await.expect("invalidate");
        assert_eq!(removed, 3);

        assert!(cache.get("inventory:1").await.expect("get").is_none());
        assert!(cache.get("release:9").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_set_overwrites_atomically_per_key() {
        let cache = MemoryCache::new();
        cache
            .set("listing:1", json!("old"), Duration::from_secs(60))
            .await
            .expect("set");
        cache
            .set("listing:1", json!("new"), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(cache.get("listing:1").await.expect("get"), Some(json!("new")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_set_after_flush_survives() {
        let cache = MemoryCache::new();
        cache
            .set("inventory:1", json!("a"), Duration::from_secs(60))
            .await
            .expect("set");
        cache.flush("inventory:*").await.expect("flush");
        cache
            .set("inventory:1", json!("b"), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(cache.get("inventory:1").await.expect("get"), Some(json!("b")));
    }
}
