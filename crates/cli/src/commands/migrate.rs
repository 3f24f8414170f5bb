//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront migrations
//! spindle-cli migrate storefront
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for the
//!   storefront database (falls back to `DATABASE_URL`)

use sqlx::PgPool;
use thiserror::Error;

/// Errors that can occur while running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns [`MigrationError`] if the database is unreachable or a
/// migration fails.
pub async fn storefront() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    let pool = PgPool::connect(&database_url).await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
