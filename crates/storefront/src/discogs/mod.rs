//! Marketplace API client.
//!
//! # Architecture
//!
//! - The marketplace is the source of truth for listings - no local
//!   sync, direct REST calls with cache-aside reads
//! - Caching goes through the injected [`InventoryCache`] capability;
//!   cache failures degrade to misses/no-ops, never errors
//! - Release enrichment is coalesced through a [`BatchProcessor`] so
//!   per-listing secondary fetches respect upstream rate limits
//!
//! # Example
//!
//! ```rust,ignore
//! use spindle_storefront::discogs::{DiscogsClient, InventoryQuery, InventoryOptions};
//!
//! let client = DiscogsClient::new(&config.discogs, cache);
//! let page = client
//!     .get_inventory(&InventoryQuery { page: 1, per_page: 12, ..Default::default() },
//!                    InventoryOptions::default())
//!     .await?;
//! ```

mod conversions;
pub mod types;

pub use types::{InventoryOptions, InventoryPage, InventoryQuery, Listing, Release, SortKey, SortOrder};

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use spindle_core::{CurrencyCode, ListingId, ReleaseId};

use crate::batch::{BatchConfig, BatchError, BatchProcessor, BoxError};
use crate::cache::InventoryCache;
use crate::config::DiscogsConfig;
use crate::retry::RetryPolicy;
use conversions::{convert_inventory, convert_listing, convert_release};
use types::{RawInventoryResponse, RawListing, RawRelease};

/// Outbound request timeout for marketplace calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when talking to the marketplace API.
#[derive(Debug, Error)]
pub enum DiscogsError {
    /// HTTP transport failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the API.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found (not retried).
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials rejected (not retried).
    #[error("marketplace rejected credentials")]
    Unauthorized,

    /// Rate limited; retry after the given number of seconds.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Transient failures exhausted the retry budget.
    #[error("marketplace unavailable after {attempts} attempts")]
    Unavailable {
        attempts: usize,
        #[source]
        source: Box<DiscogsError>,
    },

    /// Response body did not parse.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A coalesced release fetch failed.
    #[error("release batch failed: {0}")]
    Batch(#[from] BatchError),
}

impl DiscogsError {
    /// Whether a retry may succeed: transport failures, 5xx, and rate
    /// limits. 4xx responses are permanent and surface immediately.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided wait hint, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

struct ClientCore {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    cache: Arc<dyn InventoryCache>,
    cache_ttl: Duration,
}

/// Client for the marketplace seller API.
///
/// Cheap to clone; all clones share the HTTP connection pool, cache
/// handle, and release batcher.
#[derive(Clone)]
pub struct DiscogsClient {
    core: Arc<ClientCore>,
    seller: String,
    currency: CurrencyCode,
    releases: BatchProcessor<ReleaseId, Release>,
}

impl DiscogsClient {
    /// Create a new marketplace client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never
    /// happen under normal circumstances as we use standard TLS
    /// configuration.
    #[must_use]
    pub fn new(config: &DiscogsConfig, cache: Arc<dyn InventoryCache>) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Discogs token={}", config.token.expose_secret());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth)
                .expect("marketplace token contains invalid header characters"),
        );

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to create HTTP client");

        let core = Arc::new(ClientCore {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::marketplace(),
            cache,
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
        });

        let releases = release_batcher(Arc::clone(&core), BatchConfig::default());

        Self {
            core,
            seller: config.seller.clone(),
            currency: config.currency,
            releases,
        }
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    /// Fetch one page of the seller's inventory.
    ///
    /// Reads are cache-aside unless `options.cache_buster` is set.
    /// Zero-quantity listings never appear in the result. With
    /// `options.fetch_full_release_data`, listings are enriched with
    /// release metadata through the coalescing batcher; a failed
    /// enrichment degrades to the bare listing.
    ///
    /// # Errors
    ///
    /// Returns [`DiscogsError::Unavailable`] once transient failures
    /// exhaust the retry budget; permanent API errors surface as typed
    /// variants without retry.
    #[instrument(skip(self, query, options), fields(page = query.page, per_page = query.per_page))]
    pub async fn get_inventory(
        &self,
        query: &InventoryQuery,
        options: InventoryOptions,
    ) -> Result<InventoryPage, DiscogsError> {
        let cache_key = inventory_cache_key(query, options.fetch_full_release_data);

        if !options.cache_buster
            && let Some(page) = self.core.cache_get_as::<InventoryPage>(&cache_key).await
        {
            debug!("cache hit for inventory page");
            return Ok(page);
        }

        let mut params = vec![
            ("status".to_string(), "For Sale".to_string()),
            ("page".to_string(), query.page.max(1).to_string()),
            ("per_page".to_string(), query.per_page.to_string()),
            ("sort".to_string(), query.sort.as_str().to_string()),
            ("sort_order".to_string(), query.sort_order.as_str().to_string()),
        ];
        if let Some(q) = query.query.as_ref().filter(|q| !q.is_empty()) {
            params.push(("q".to_string(), q.clone()));
        }

        let raw: RawInventoryResponse = self
            .core
            .get_json(&format!("/users/{}/inventory", self.seller), &params)
            .await?;

        let mut page = convert_inventory(raw, self.currency);

        if options.fetch_full_release_data {
            self.enrich_listings(&mut page.listings).await;
        }

        self.core.cache_set(&cache_key, &page).await;

        Ok(page)
    }

    /// Get a single listing by its marketplace id.
    ///
    /// # Errors
    ///
    /// Returns [`DiscogsError::NotFound`] if the listing no longer
    /// exists, or other variants for API failures.
    #[instrument(skip(self), fields(listing_id = %id))]
    pub async fn get_listing(&self, id: ListingId) -> Result<Listing, DiscogsError> {
        let cache_key = format!("listing:{id}");

        if let Some(listing) = self.core.cache_get_as::<Listing>(&cache_key).await {
            debug!("cache hit for listing");
            return Ok(listing);
        }

        let raw: RawListing = self
            .core
            .get_json(&format!("/marketplace/listings/{id}"), &[])
            .await?;
        let listing = convert_listing(raw, self.currency);

        self.core.cache_set(&cache_key, &listing).await;

        Ok(listing)
    }

    /// Get full release metadata, coalesced through the batcher.
    ///
    /// # Errors
    ///
    /// Returns [`DiscogsError::Batch`] when the coalesced call fails;
    /// every caller in the same batch sees the same failure.
    #[instrument(skip(self), fields(release_id = %id))]
    pub async fn get_release(&self, id: ReleaseId) -> Result<Release, DiscogsError> {
        let cache_key = format!("release:{id}");

        if let Some(release) = self.core.cache_get_as::<Release>(&cache_key).await {
            debug!("cache hit for release");
            return Ok(release);
        }

        let release = self.releases.add(id).await?;
        Ok(release)
    }

    /// Apply a quantity delta to a marketplace listing.
    ///
    /// Reads the authoritative remote quantity, writes the adjusted
    /// value back, then invalidates the listing, its release, and all
    /// aggregate inventory pages. A delta that would take the quantity
    /// below zero clamps at zero.
    ///
    /// # Errors
    ///
    /// Returns [`DiscogsError`] if either marketplace call fails; cache
    /// invalidation failures degrade to warnings.
    #[instrument(skip(self), fields(listing_id = %listing_id, quantity_delta))]
    pub async fn update_inventory(
        &self,
        listing_id: ListingId,
        quantity_delta: i64,
    ) -> Result<(), DiscogsError> {
        let raw: RawListing = self
            .core
            .get_json(&format!("/marketplace/listings/{listing_id}"), &[])
            .await?;

        let current = i64::from(raw.quantity);
        let updated = current + quantity_delta;
        let new_quantity = if updated < 0 {
            warn!(
                current,
                quantity_delta, "quantity delta would go negative, clamping to zero"
            );
            0
        } else {
            updated
        };

        let body = serde_json::json!({
            "release_id": raw.release.id,
            "condition": raw.condition,
            "price": raw.price.value,
            "quantity": new_quantity,
            "status": "For Sale",
        });
        self.core
            .post_ok(&format!("/marketplace/listings/{listing_id}"), &body)
            .await?;

        // Invalidate only after the remote write succeeded.
        self.core.cache_invalidate(&format!("listing:{listing_id}")).await;
        self.core
            .cache_invalidate(&format!("release:{}", raw.release.id))
            .await;
        self.core.cache_invalidate("inventory:*").await;

        tracing::info!(
            listing_id = %listing_id,
            from = current,
            to = new_quantity,
            "marketplace quantity updated"
        );

        Ok(())
    }

    /// Attach release metadata to each listing, tolerating per-listing
    /// failures (a listing without metadata beats a failed page).
    async fn enrich_listings(&self, listings: &mut [Listing]) {
        let mut handles = Vec::with_capacity(listings.len());
        for (index, listing) in listings.iter().enumerate() {
            let client = self.clone();
            let release_id = listing.release_id;
            handles.push((
                index,
                tokio::spawn(async move { client.get_release(release_id).await }),
            ));
        }

        for (index, handle) in handles {
            match handle.await {
                Ok(Ok(release)) => {
                    if let Some(listing) = listings.get_mut(index) {
                        listing.release = Some(release);
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "release enrichment failed, returning bare listing");
                }
                Err(e) => {
                    warn!(error = %e, "release enrichment task panicked");
                }
            }
        }
    }
}

/// Build the release-fetch batcher: one coalescing boundary for the
/// `/releases/{id}` endpoint.
fn release_batcher(
    core: Arc<ClientCore>,
    config: BatchConfig,
) -> BatchProcessor<ReleaseId, Release> {
    BatchProcessor::new(config, move |ids: Vec<ReleaseId>| {
        let core = Arc::clone(&core);
        async move {
            let mut handles = Vec::with_capacity(ids.len());
            for id in ids {
                let core = Arc::clone(&core);
                handles.push(tokio::spawn(async move { core.fetch_release(id).await }));
            }

            let mut releases = Vec::with_capacity(handles.len());
            for handle in handles {
                let release = handle
                    .await
                    .map_err(|e| -> BoxError { Box::new(e) })??;
                releases.push(release);
            }
            Ok(releases)
        }
    })
}

impl ClientCore {
    async fn fetch_release(&self, id: ReleaseId) -> Result<Release, DiscogsError> {
        let raw: RawRelease = self.get_json(&format!("/releases/{id}"), &[]).await?;
        let release = convert_release(raw);
        self.cache_set(&format!("release:{id}"), &release).await;
        Ok(release)
    }

    // =========================================================================
    // HTTP with retry
    // =========================================================================

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, DiscogsError> {
        self.with_retry(|| self.send_once(Method::GET, path, params, None))
            .await
    }

    async fn post_ok(&self, path: &str, body: &serde_json::Value) -> Result<(), DiscogsError> {
        self.with_retry(|| async {
            self.send_once::<serde_json::Value>(Method::POST, path, &[], Some(body))
                .await
                .map(|_| ())
        })
        .await
    }

    /// Run one request attempt in a retry loop: transient errors back
    /// off (honoring any `Retry-After` hint) up to the attempt ceiling,
    /// permanent errors surface immediately.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, DiscogsError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DiscogsError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(DiscogsError::Unavailable {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    warn!(error = %err, attempt, "marketplace request failed, retrying");
                    self.retry.wait(attempt - 1, err.retry_after()).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, DiscogsError> {
        let url = format!("{}{path}", self.base_url);

        let mut request = self.http.request(method, &url);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(DiscogsError::RateLimited(retry_after));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DiscogsError::Unauthorized);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(DiscogsError::NotFound(path.to_string()));
        }

        let text = response.text().await?;

        if !status.is_success() {
            return Err(DiscogsError::Api {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        if text.is_empty() {
            // Some mutations return 204 with no body.
            return serde_json::from_value(serde_json::Value::Null).map_err(DiscogsError::Parse);
        }

        serde_json::from_str(&text).map_err(DiscogsError::Parse)
    }

    // =========================================================================
    // Cache degradation
    //
    // The cache is never a correctness dependency: a failed read is a
    // miss, a failed write or invalidation is a warning.
    // =========================================================================

    async fn cache_get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.cache.get(key).await {
            Ok(value) => value?,
            Err(e) => {
                warn!(error = %e, key, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(error = %e, key, "cached payload failed to decode, treating as miss");
                None
            }
        }
    }

    async fn cache_set<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, key, "failed to encode cache payload, skipping write");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, payload, self.cache_ttl).await {
            warn!(error = %e, key, "cache write failed, continuing without cache");
        }
    }

    async fn cache_invalidate(&self, pattern: &str) {
        if let Err(e) = self.cache.invalidate(pattern).await {
            warn!(error = %e, pattern, "cache invalidation failed, entries will expire by TTL");
        }
    }
}

fn inventory_cache_key(query: &InventoryQuery, full: bool) -> String {
    format!(
        "inventory:{}:{}:{}:{}:{}:{}",
        query.page.max(1),
        query.per_page,
        query.sort.as_str(),
        query.sort_order.as_str(),
        if full { "full" } else { "summary" },
        query.query.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use async_trait::async_trait;
    use secrecy::SecretString;

    /// Cache whose backend is always unreachable.
    struct UnreachableCache;

    #[async_trait]
    impl InventoryCache for UnreachableCache {
        async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: serde_json::Value,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn invalidate(&self, _pattern: &str) -> Result<u64, CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn flush(&self, _pattern: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
    }

    fn test_config() -> DiscogsConfig {
        DiscogsConfig {
            base_url: "https://marketplace.invalid".to_string(),
            token: SecretString::from("dGVzdC10b2tlbi12YWx1ZQ"),
            seller: "spindle-records".to_string(),
            currency: CurrencyCode::USD,
            user_agent: "SpindleRecords/0.1".to_string(),
            cache_ttl_seconds: 300,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(DiscogsError::RateLimited(3).is_transient());
        assert!(
            DiscogsError::Api {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !DiscogsError::Api {
                status: 422,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!DiscogsError::NotFound("/marketplace/listings/1".to_string()).is_transient());
        assert!(!DiscogsError::Unauthorized.is_transient());
    }

    #[test]
    fn test_retry_after_hint_only_for_rate_limits() {
        assert_eq!(
            DiscogsError::RateLimited(7).retry_after(),
            Some(Duration::from_secs(7))
        );
        assert_eq!(DiscogsError::Unauthorized.retry_after(), None);
    }

    #[test]
    fn test_inventory_cache_key_shape() {
        let query = InventoryQuery {
            query: Some("coltrane".to_string()),
            sort: SortKey::Price,
            sort_order: SortOrder::Asc,
            page: 2,
            per_page: 12,
        };
        assert_eq!(
            inventory_cache_key(&query, false),
            "inventory:2:12:price:asc:summary:coltrane"
        );
        assert_eq!(
            inventory_cache_key(&InventoryQuery { page: 0, per_page: 12, ..Default::default() }, true),
            "inventory:1:12:listed:desc:full:"
        );
    }

    #[tokio::test]
    async fn test_unreachable_cache_degrades_to_miss_and_noop() {
        let client = DiscogsClient::new(&test_config(), Arc::new(UnreachableCache));

        // Reads degrade to a miss instead of erroring.
        let miss = client.core.cache_get_as::<Listing>("listing:1").await;
        assert!(miss.is_none());

        // Writes and invalidations degrade to no-ops.
        client.core.cache_set("listing:1", &serde_json::json!(1)).await;
        client.core.cache_invalidate("inventory:*").await;
    }

    #[tokio::test]
    async fn test_corrupt_cache_payload_is_a_miss() {
        let cache = Arc::new(crate::cache::MemoryCache::new());
        cache
            .set("release:1", serde_json::json!("not a release"), Duration::from_secs(60))
            .await
            .expect("set");

        let client = DiscogsClient::new(&test_config(), cache);
        let miss = client.core.cache_get_as::<Release>("release:1").await;
        assert!(miss.is_none());
    }
}
