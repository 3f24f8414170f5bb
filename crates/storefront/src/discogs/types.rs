//! Marketplace listing and release types.
//!
//! Raw `Raw*` structs mirror the marketplace wire format; the public
//! types are the normalized internal shapes. Translation between the
//! two lives in [`super::conversions`] and is owned exclusively by the
//! marketplace client.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use spindle_core::{Condition, CurrencyCode, ListingId, Price, ReleaseId};

// =============================================================================
// Normalized types
// =============================================================================

/// A sellable record as listed on the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub release_id: ReleaseId,
    pub title: String,
    pub artist: String,
    pub price: Price,
    pub condition: Condition,
    pub sleeve_condition: Option<Condition>,
    /// Units available for purchase. Zero-quantity listings never appear
    /// in inventory pages.
    pub quantity_available: u32,
    pub weight_grams: Option<u32>,
    pub format: String,
    pub images: Vec<String>,
    /// Full release metadata, present when enrichment was requested.
    pub release: Option<Release>,
}

/// Full release metadata (tracklist, videos, genres).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub year: Option<u16>,
    pub genres: Vec<String>,
    pub styles: Vec<String>,
    pub tracks: Vec<Track>,
    pub videos: Vec<Video>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub position: String,
    pub title: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub url: String,
    pub title: String,
}

/// One page of normalized inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryPage {
    pub listings: Vec<Listing>,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

// =============================================================================
// Query parameters
// =============================================================================

/// Inventory sort key, matching the marketplace's sort parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Listed,
    Price,
    Artist,
    Title,
}

impl SortKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listed => "listed",
            Self::Price => "price",
            Self::Artist => "artist",
            Self::Title => "item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Parameters for one inventory page fetch.
#[derive(Debug, Clone, Default)]
pub struct InventoryQuery {
    pub query: Option<String>,
    pub sort: SortKey,
    pub sort_order: SortOrder,
    pub page: u32,
    pub per_page: u32,
}

/// Per-call fetch options.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryOptions {
    /// Enrich each listing with full release metadata via secondary
    /// calls (coalesced through the release batcher).
    pub fetch_full_release_data: bool,
    /// Bypass the cache read for near-real-time inventory. The fresh
    /// result still repopulates the cache.
    pub cache_buster: bool,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct RawInventoryResponse {
    #[serde(default)]
    pub pagination: RawPagination,
    #[serde(default)]
    pub listings: Vec<RawListing>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawPagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub items: u64,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawListing {
    pub id: i64,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub sleeve_condition: Option<String>,
    pub price: RawPrice,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub weight: Option<f64>,
    pub release: RawListingRelease,
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub(super) struct RawPrice {
    pub value: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawListingRelease {
    pub id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawImage {
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawRelease {
    pub id: i64,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub tracklist: Vec<RawTrack>,
    #[serde(default)]
    pub videos: Vec<RawVideo>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawTrack {
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawVideo {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
}

pub(super) fn currency_or(raw: Option<&str>, fallback: CurrencyCode) -> CurrencyCode {
    raw.and_then(|code| code.parse().ok()).unwrap_or(fallback)
}
