//! Cache layer fronting the marketplace API.
//!
//! The cache is a capability interface ([`InventoryCache`]) so the
//! marketplace client can be tested against a deterministic in-memory
//! store. Two implementations:
//!
//! - [`MemoryCache`] - deterministic, used in tests and single-instance
//!   deployments
//! - [`MokaCache`] - production store built on `moka`
//!
//! The cache is a performance layer, never a correctness dependency:
//! callers treat a failed `get` as a miss and a failed `set`/`invalidate`
//! as a no-op with a warning.

mod memory;
mod moka;

pub use memory::MemoryCache;
pub use self::moka::MokaCache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a cache backend.
///
/// These never propagate past the marketplace client; they degrade to
/// miss/no-op behavior there.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store is unreachable or failed.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key/value cache with per-entry TTL and glob-pattern invalidation.
///
/// Keys follow an internal grammar shared with the marketplace client:
/// `inventory:*`, `listing:{id}`, `release:{id}`. Values are opaque
/// serialized payloads. Writes are atomic per key; `invalidate` and
/// `flush` are best-effort and eventually consistent - a concurrent
/// `set` may survive a flush.
#[async_trait]
pub trait InventoryCache: Send + Sync {
    /// Look up a key. Entries past their expiry are misses.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Store a value under a key with a time-to-live.
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Remove all entries whose key matches a glob pattern.
    ///
    /// Returns the number of entries removed.
    async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Like [`InventoryCache::invalidate`] but without reporting a count;
    /// backends may defer the actual removal.
    async fn flush(&self, pattern: &str) -> Result<(), CacheError>;
}

/// Glob match with `*` wildcards, e.g. `inventory:*` or `*:42`.
///
/// `*` matches any run of characters (including empty); everything else
/// matches literally.
#[must_use]
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    fn matches(p: &[u8], k: &[u8]) -> bool {
        match p.split_first() {
            None => k.is_empty(),
            Some((b'*', rest)) => {
                // Try consuming zero or more key bytes for this star.
                (0..=k.len()).any(|i| matches(rest, k.get(i..).unwrap_or(&[])))
            }
            Some((c, rest)) => k.split_first().is_some_and(|(kc, krest)| kc == c && matches(rest, krest)),
        }
    }
    matches(pattern.as_bytes(), key.as_bytes())
}
