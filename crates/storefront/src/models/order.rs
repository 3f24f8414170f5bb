//! Order and order-item models.
//!
//! Order items are snapshots of marketplace listings at purchase time,
//! not live joins - the listing may be gone from the marketplace by the
//! time anyone looks at the order again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spindle_core::{Condition, ListingId, OrderId, OrderStatus, Price, UserId};

/// A durable order created from a confirmed payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Owning user; `None` for guest checkout.
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub email: String,
    pub customer_name: Option<String>,
    /// Always equals the sum of item price x quantity at creation time.
    pub total: Price,
    pub shipping_address: ShippingAddress,
    /// Payment session identifier; UNIQUE in storage, which is what
    /// makes order creation idempotent under webhook redelivery.
    pub stripe_session_id: String,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Total shipping weight of all items, when every item carried one.
    #[must_use]
    pub fn total_weight_grams(&self) -> Option<u32> {
        self.items
            .iter()
            .map(|item| item.weight_grams.map(|w| w * item.quantity))
            .sum()
    }
}

/// Snapshot of one purchased listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub listing_id: ListingId,
    pub title: String,
    pub artist: String,
    pub condition: Condition,
    pub price: Price,
    pub quantity: u32,
    pub weight_grams: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Customer identity resolved from the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub email: String,
    pub name: Option<String>,
}

/// Input for order creation.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<UserId>,
    pub items: Vec<NewOrderItem>,
    pub shipping_address: ShippingAddress,
    pub customer: CustomerDetails,
    pub stripe_session_id: String,
    /// Total the payment provider charged; rejected if it disagrees
    /// with the computed item total.
    pub expected_total: Option<Price>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub listing_id: ListingId,
    pub title: String,
    pub artist: String,
    pub condition: Condition,
    pub price: Price,
    pub quantity: u32,
    pub weight_grams: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use spindle_core::CurrencyCode;

    fn item(weight: Option<u32>, quantity: u32) -> OrderItem {
        OrderItem {
            listing_id: ListingId::new(1),
            title: "Remain In Light".to_string(),
            artist: "Talking Heads".to_string(),
            condition: Condition::NearMint,
            price: Price::new(Decimal::new(2500, 2), CurrencyCode::USD),
            quantity,
            weight_grams: weight,
        }
    }

    fn order_with_items(items: Vec<OrderItem>) -> Order {
        Order {
            id: OrderId::generate(),
            user_id: None,
            status: OrderStatus::Pending,
            email: "shopper@example.com".to_string(),
            customer_name: None,
            total: Price::new(Decimal::new(2500, 2), CurrencyCode::USD),
            shipping_address: ShippingAddress {
                name: "A Shopper".to_string(),
                line1: "1 Record Lane".to_string(),
                line2: None,
                city: "Portland".to_string(),
                state: Some("OR".to_string()),
                postal_code: "97201".to_string(),
                country: "US".to_string(),
            },
            stripe_session_id: "cs_test_1".to_string(),
            items,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_total_weight_sums_per_quantity() {
        let order = order_with_items(vec![item(Some(180), 2), item(Some(230), 1)]);
        assert_eq!(order.total_weight_grams(), Some(590));
    }

    #[test]
    fn test_total_weight_none_when_any_item_unweighed() {
        let order = order_with_items(vec![item(Some(180), 1), item(None, 1)]);
        assert_eq!(order.total_weight_grams(), None);
    }
}
