//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::{InventoryCache, MokaCache};
use crate::config::StorefrontConfig;
use crate::db::orders::PgOrderStore;
use crate::discogs::DiscogsClient;
use crate::services::OrderService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the database pool, the marketplace client, and
/// the order service.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    discogs: DiscogsClient,
    orders: OrderService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Wires the production implementations together: moka-backed cache
    /// behind the marketplace client, Postgres-backed order store behind
    /// the order service, with the marketplace client as the service's
    /// inventory writer.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let cache: Arc<dyn InventoryCache> = Arc::new(MokaCache::new());
        let discogs = DiscogsClient::new(&config.discogs, cache);

        let store = Arc::new(PgOrderStore::new(pool.clone()));
        let orders = OrderService::new(store, Arc::new(discogs.clone()));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                discogs,
                orders,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the marketplace client.
    #[must_use]
    pub fn discogs(&self) -> &DiscogsClient {
        &self.inner.discogs
    }

    /// Get a reference to the order service.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }
}
