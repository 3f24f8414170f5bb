//! Inventory route handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::warn;

use spindle_core::ListingId;

use crate::discogs::{
    DiscogsError, InventoryOptions, InventoryQuery, Listing, SortKey, SortOrder,
};
use crate::error::{AppError, Result};
use crate::state::AppState;

const DEFAULT_PER_PAGE: u32 = 12;
const MAX_PER_PAGE: u32 = 50;

/// Query parameters for the inventory page.
#[derive(Debug, Deserialize)]
pub struct InventoryParams {
    pub q: Option<String>,
    pub sort: Option<SortKey>,
    pub order: Option<SortOrder>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Include full release metadata (tracklist, videos, genres).
    #[serde(default)]
    pub full: bool,
    /// Bypass the cache for near-real-time stock.
    #[serde(default)]
    pub fresh: bool,
}

/// Inventory page response.
#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub listings: Vec<Listing>,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    /// Set when the marketplace was unreachable and this is a degraded
    /// empty page rather than real data.
    pub unavailable: bool,
}

/// `GET /inventory` - one page of purchasable listings.
///
/// When the marketplace is unavailable after retries, degrades to an
/// empty page with `unavailable: true` instead of failing the request.
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(params): Query<InventoryParams>,
) -> Result<Json<InventoryResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    let query = InventoryQuery {
        query: params.q,
        sort: params.sort.unwrap_or_default(),
        sort_order: params.order.unwrap_or_default(),
        page,
        per_page,
    };
    let options = InventoryOptions {
        fetch_full_release_data: params.full,
        cache_buster: params.fresh,
    };

    match state.discogs().get_inventory(&query, options).await {
        Ok(result) => Ok(Json(InventoryResponse {
            listings: result.listings,
            page: result.page,
            per_page: result.per_page,
            total_pages: result.total_pages,
            total_items: result.total_items,
            unavailable: false,
        })),
        Err(err @ DiscogsError::Unavailable { .. }) => {
            warn!(error = %err, "marketplace unavailable, serving degraded empty inventory");
            Ok(Json(InventoryResponse {
                listings: Vec::new(),
                page,
                per_page,
                total_pages: 0,
                total_items: 0,
                unavailable: true,
            }))
        }
        Err(err) => Err(AppError::Marketplace(err)),
    }
}

/// `GET /listings/{id}` - single listing detail.
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Listing>> {
    let listing = state.discogs().get_listing(ListingId::new(id)).await?;
    Ok(Json(listing))
}
