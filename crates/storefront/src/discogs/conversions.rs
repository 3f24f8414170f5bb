//! Conversion from marketplace wire shapes to normalized types.

use spindle_core::{Condition, CurrencyCode, ListingId, Price, ReleaseId};
use tracing::debug;

use super::types::{
    InventoryPage, Listing, RawInventoryResponse, RawListing, RawRelease, Release, Track, Video,
    currency_or,
};

/// Convert one inventory page, dropping listings that are not
/// purchasable (zero quantity). The filter lives here so stale cached
/// pages can never resurface sold-out listings: a zero-quantity listing
/// is excluded before the page is cached or returned.
pub(super) fn convert_inventory(
    raw: RawInventoryResponse,
    seller_currency: CurrencyCode,
) -> InventoryPage {
    let listings = raw
        .listings
        .into_iter()
        .filter(|listing| listing.quantity > 0)
        .map(|listing| convert_listing(listing, seller_currency))
        .collect();

    InventoryPage {
        listings,
        page: raw.pagination.page,
        per_page: raw.pagination.per_page,
        total_pages: raw.pagination.pages,
        total_items: raw.pagination.items,
    }
}

pub(super) fn convert_listing(raw: RawListing, seller_currency: CurrencyCode) -> Listing {
    let currency = currency_or(raw.price.currency.as_deref(), seller_currency);

    let condition = parse_condition(&raw.condition, raw.id);
    let sleeve_condition = raw
        .sleeve_condition
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "Not Graded")
        .map(|s| parse_condition(s, raw.id));

    let mut images: Vec<String> = raw
        .release
        .images
        .iter()
        .filter(|image| !image.uri.is_empty())
        .map(|image| image.uri.clone())
        .collect();
    if images.is_empty()
        && let Some(thumb) = raw.release.thumbnail.as_ref().filter(|t| !t.is_empty())
    {
        images.push(thumb.clone());
    }

    // Inventory payloads put "Artist - Title" in `description`; prefer
    // the split fields when present.
    let (artist, title) = if raw.release.artist.is_empty() && raw.release.title.is_empty() {
        split_description(&raw.release.description)
    } else {
        (raw.release.artist.clone(), raw.release.title.clone())
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let weight_grams = raw.weight.filter(|w| *w > 0.0).map(|w| w.round() as u32);

    Listing {
        id: ListingId::new(raw.id),
        release_id: ReleaseId::new(raw.release.id),
        title,
        artist,
        price: Price::new(raw.price.value, currency),
        condition,
        sleeve_condition,
        quantity_available: raw.quantity,
        weight_grams,
        format: raw.release.format,
        images,
        release: None,
    }
}

pub(super) fn convert_release(raw: RawRelease) -> Release {
    Release {
        id: ReleaseId::new(raw.id),
        year: raw.year.filter(|y| *y > 0),
        genres: raw.genres,
        styles: raw.styles,
        tracks: raw
            .tracklist
            .into_iter()
            .map(|track| Track {
                position: track.position,
                title: track.title,
                duration: track.duration,
            })
            .collect(),
        videos: raw
            .videos
            .into_iter()
            .filter(|video| !video.uri.is_empty())
            .map(|video| Video {
                url: video.uri,
                title: video.title,
            })
            .collect(),
    }
}

fn parse_condition(raw: &str, listing_id: i64) -> Condition {
    raw.parse().unwrap_or_else(|_| {
        debug!(listing_id, condition = raw, "unrecognized condition grade, assuming Good");
        Condition::Good
    })
}

fn split_description(description: &str) -> (String, String) {
    description.split_once(" - ").map_or_else(
        || (String::new(), description.to_string()),
        |(artist, title)| (artist.to_string(), title.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inventory_fixture() -> RawInventoryResponse {
        serde_json::from_value(json!({
            "pagination": { "page": 1, "pages": 3, "per_page": 12, "items": 29 },
            "listings": [
                {
                    "id": 101,
                    "condition": "Near Mint (NM or M-)",
                    "sleeve_condition": "Very Good Plus (VG+)",
                    "price": { "value": 34.99, "currency": "USD" },
                    "quantity": 2,
                    "weight": 230.0,
                    "release": {
                        "id": 9001,
                        "description": "Alice Coltrane - Journey In Satchidananda",
                        "format": "LP, Album, Reissue",
                        "thumbnail": "https://img.example/9001-thumb.jpg"
                    }
                },
                {
                    "id": 102,
                    "condition": "Very Good (VG)",
                    "price": { "value": 12.50 },
                    "quantity": 0,
                    "release": {
                        "id": 9002,
                        "artist": "Can",
                        "title": "Tago Mago",
                        "format": "2xLP"
                    }
                }
            ]
        }))
        .expect("fixture parses")
    }

    #[test]
    fn test_zero_quantity_listings_are_filtered_out() {
        let page = convert_inventory(inventory_fixture(), CurrencyCode::USD);

        assert_eq!(page.listings.len(), 1);
        assert_eq!(page.listings[0].id, ListingId::new(101));
        assert!(page.listings.iter().all(|l| l.quantity_available > 0));
        assert_eq!(page.total_items, 29);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_listing_normalization() {
        let page = convert_inventory(inventory_fixture(), CurrencyCode::USD);
        let listing = &page.listings[0];

        assert_eq!(listing.artist, "Alice Coltrane");
        assert_eq!(listing.title, "Journey In Satchidananda");
        assert_eq!(listing.condition, Condition::NearMint);
        assert_eq!(listing.sleeve_condition, Some(Condition::VeryGoodPlus));
        assert_eq!(listing.price.to_string(), "$34.99");
        assert_eq!(listing.weight_grams, Some(230));
        assert_eq!(listing.images, vec!["https://img.example/9001-thumb.jpg"]);
        assert!(listing.release.is_none());
    }

    #[test]
    fn test_missing_currency_falls_back_to_seller_currency() {
        let raw: RawListing = serde_json::from_value(json!({
            "id": 7,
            "condition": "Mint (M)",
            "price": { "value": 9.99 },
            "quantity": 1,
            "release": { "id": 1, "artist": "Neu!", "title": "Neu! 75", "format": "LP" }
        }))
        .expect("parses");

        let listing = convert_listing(raw, CurrencyCode::GBP);
        assert_eq!(listing.price.currency_code, CurrencyCode::GBP);
    }

    #[test]
    fn test_unknown_condition_defaults_to_good() {
        let raw: RawListing = serde_json::from_value(json!({
            "id": 8,
            "condition": "Kinda Scratched",
            "price": { "value": 3.00, "currency": "USD" },
            "quantity": 1,
            "release": { "id": 2, "description": "Unknown Artist - Untitled", "format": "7\"" }
        }))
        .expect("parses");

        let listing = convert_listing(raw, CurrencyCode::USD);
        assert_eq!(listing.condition, Condition::Good);
        assert_eq!(listing.artist, "Unknown Artist");
        assert_eq!(listing.title, "Untitled");
    }

    #[test]
    fn test_release_conversion_drops_empty_videos() {
        let raw: RawRelease = serde_json::from_value(json!({
            "id": 9001,
            "year": 1971,
            "genres": ["Jazz"],
            "styles": ["Spiritual Jazz"],
            "tracklist": [
                { "position": "A1", "title": "Journey In Satchidananda", "duration": "6:37" }
            ],
            "videos": [
                { "uri": "https://youtube.example/watch?v=abc", "title": "A1" },
                { "uri": "", "title": "broken" }
            ]
        }))
        .expect("parses");

        let release = convert_release(raw);
        assert_eq!(release.id, ReleaseId::new(9001));
        assert_eq!(release.year, Some(1971));
        assert_eq!(release.tracks.len(), 1);
        assert_eq!(release.videos.len(), 1);
    }
}
