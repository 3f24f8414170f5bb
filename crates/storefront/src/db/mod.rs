//! Database operations for the storefront `PostgreSQL`.
//!
//! # Database: `spindle_storefront`
//!
//! Stores order data only (the marketplace is the source of truth for
//! listings):
//!
//! ## Tables
//!
//! - `orders` - one row per confirmed checkout; `stripe_session_id` is
//!   UNIQUE and is the idempotency mechanism for webhook redelivery
//! - `order_items` - listing snapshots per order
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p spindle-cli -- migrate storefront
//! ```

pub mod orders;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique-constraint conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Row expected but not found.
    #[error("not found")]
    NotFound,

    /// Stored data failed validation on the way out.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
