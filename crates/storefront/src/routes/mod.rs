//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (verifies database)
//!
//! # Inventory
//! GET  /inventory              - One page of marketplace inventory
//! GET  /listings/{id}          - Single listing detail
//!
//! # Orders
//! GET  /orders/{id}            - Order lookup
//!
//! # Webhooks
//! POST /webhooks/stripe        - Payment provider events (signed)
//! ```

pub mod inventory;
pub mod orders;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the application router (health endpoints are added in `main`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(inventory::list_inventory))
        .route("/listings/{id}", get(inventory::get_listing))
        .route("/orders/{id}", get(orders::get_order))
        .route("/webhooks/stripe", post(webhooks::handle_stripe_webhook))
}
