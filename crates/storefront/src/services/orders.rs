//! Order/inventory reconciliation.
//!
//! [`OrderService`] is the single place where a confirmed payment
//! becomes a durable order and a marketplace-quantity decrement.
//! Nothing else creates orders.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, instrument};

use spindle_core::{ListingId, OrderId, OrderStatus, Price};

use crate::db::RepositoryError;
use crate::db::orders::{InsertOutcome, OrderStore};
use crate::discogs::{DiscogsClient, DiscogsError};
use crate::models::{NewOrder, NewOrderItem, Order, OrderItem};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order store error: {0}")]
    Store(#[from] RepositoryError),

    /// An order must contain at least one item.
    #[error("order contains no items")]
    EmptyOrder,

    /// The caller-supplied total disagrees with the item total. The
    /// order is rejected rather than stored with either number.
    #[error("supplied total {supplied} does not match item total {computed}")]
    TotalMismatch { computed: Price, supplied: Price },

    /// Items carry more than one currency; the total would be undefined.
    #[error("order items carry mixed currencies")]
    CurrencyMismatch,

    /// The requested status change violates the monotonic state machine.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order not found")]
    NotFound,
}

/// Port for the marketplace quantity write.
///
/// The reconciler only ever adjusts quantities; giving it the whole
/// marketplace client would let order code grow read paths it must not
/// have.
#[async_trait]
pub trait InventoryWriter: Send + Sync {
    async fn adjust_quantity(
        &self,
        listing_id: ListingId,
        delta: i64,
    ) -> Result<(), DiscogsError>;
}

#[async_trait]
impl InventoryWriter for DiscogsClient {
    async fn adjust_quantity(
        &self,
        listing_id: ListingId,
        delta: i64,
    ) -> Result<(), DiscogsError> {
        self.update_inventory(listing_id, delta).await
    }
}

/// The order/inventory reconciler.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryWriter>,
}

impl OrderService {
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, inventory: Arc<dyn InventoryWriter>) -> Self {
        Self { store, inventory }
    }

    /// Create a durable order from a confirmed payment.
    ///
    /// Idempotent per payment session id: a second call with the same
    /// session id returns the stored order without creating a duplicate
    /// or scheduling a second round of decrements. The storage-level
    /// unique constraint is the concurrency mechanism, so this is safe
    /// across process instances.
    ///
    /// On first creation, one marketplace quantity decrement per item is
    /// scheduled in the background. A decrement failure never rolls the
    /// order back - payment success takes precedence over inventory
    /// accuracy, and the failure is logged and captured for manual
    /// reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::EmptyOrder`], [`OrderError::TotalMismatch`],
    /// [`OrderError::CurrencyMismatch`], or [`OrderError::Store`].
    #[instrument(skip(self, new_order), fields(session_id = %new_order.stripe_session_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<Order, OrderError> {
        if new_order.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        let total = compute_total(&new_order.items)?;

        if let Some(supplied) = new_order.expected_total
            && (supplied.amount != total.amount
                || supplied.currency_code != total.currency_code)
        {
            return Err(OrderError::TotalMismatch {
                computed: total,
                supplied,
            });
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::generate(),
            user_id: new_order.user_id,
            status: OrderStatus::Pending,
            email: new_order.customer.email,
            customer_name: new_order.customer.name,
            total,
            shipping_address: new_order.shipping_address,
            stripe_session_id: new_order.stripe_session_id,
            items: new_order.items.into_iter().map(into_order_item).collect(),
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_order(&order).await? {
            InsertOutcome::Created(order) => {
                info!(order_id = %order.id, total = %order.total, "order created");
                self.schedule_inventory_decrements(&order);
                Ok(order)
            }
            InsertOutcome::Existing(existing) => {
                info!(
                    order_id = %existing.id,
                    "duplicate payment session, returning existing order"
                );
                Ok(existing)
            }
        }
    }

    /// Advance an order's status.
    ///
    /// A request for the status the order already has is a no-op
    /// success (redelivered payment events land here); anything else
    /// must be a legal transition of the monotonic state machine.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`], [`OrderError::InvalidTransition`],
    /// or [`OrderError::Store`].
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut order = self
            .store
            .get_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        if order.status == new_status {
            return Ok(order);
        }

        if !order.status.can_transition_to(new_status) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: new_status,
            });
        }

        self.store.update_status(order_id, new_status).await?;
        info!(from = %order.status, to = %new_status, "order status updated");

        order.status = new_status;
        Ok(order)
    }

    /// Mark the order belonging to a payment session as paid.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] if no order carries this session
    /// id, or the errors of [`OrderService::update_order_status`].
    pub async fn mark_paid_by_session(&self, session_id: &str) -> Result<Order, OrderError> {
        let order = self
            .store
            .get_by_session(session_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        self.update_order_status(order.id, OrderStatus::Paid).await
    }

    /// Look up an order by id.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] or [`OrderError::Store`].
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .get_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound)
    }

    /// Schedule (without awaiting) one quantity decrement per item.
    fn schedule_inventory_decrements(&self, order: &Order) {
        for item in &order.items {
            let inventory = Arc::clone(&self.inventory);
            let order_id = order.id;
            let listing_id = item.listing_id;
            let quantity = i64::from(item.quantity);

            tokio::spawn(async move {
                if let Err(e) = inventory.adjust_quantity(listing_id, -quantity).await {
                    // The order stands; operations reconcile stock by hand.
                    error!(
                        order_id = %order_id,
                        listing_id = %listing_id,
                        quantity,
                        error = %e,
                        "marketplace decrement failed, manual reconciliation required"
                    );
                    sentry::capture_error(&e);
                }
            });
        }
    }
}

fn into_order_item(item: NewOrderItem) -> OrderItem {
    OrderItem {
        listing_id: item.listing_id,
        title: item.title,
        artist: item.artist,
        condition: item.condition,
        price: item.price,
        quantity: item.quantity,
        weight_grams: item.weight_grams,
    }
}

/// Sum of price x quantity over all items. Every item must carry the
/// same currency.
fn compute_total(items: &[NewOrderItem]) -> Result<Price, OrderError> {
    let first = items.first().ok_or(OrderError::EmptyOrder)?;
    let currency = first.price.currency_code;

    let mut amount = Decimal::ZERO;
    for item in items {
        if item.price.currency_code != currency {
            return Err(OrderError::CurrencyMismatch);
        }
        amount += item.price.amount * Decimal::from(item.quantity);
    }

    Ok(Price::new(amount, currency))
}
