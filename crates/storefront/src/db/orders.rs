//! Order persistence.
//!
//! [`OrderStore`] is a capability trait so the reconciliation service can
//! be tested without a live database. The production implementation is
//! [`PgOrderStore`]; [`InMemoryOrderStore`] emulates the one piece of
//! database behavior the service depends on - the UNIQUE constraint on
//! the payment session id. That constraint is the sole concurrency-safety
//! mechanism for order creation: multiple stateless instances may run, so
//! the database is the lock, never an in-process mutex.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use spindle_core::{Condition, CurrencyCode, ListingId, OrderId, OrderStatus, Price, UserId};

use super::RepositoryError;
use crate::models::{Order, OrderItem, ShippingAddress};

/// Result of an idempotent order insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The order was stored for the first time.
    Created(Order),
    /// An order with this payment session id already existed; creation
    /// was a no-op and this is the stored order.
    Existing(Order),
}

impl InsertOutcome {
    /// The stored order, however it got there.
    #[must_use]
    pub fn into_order(self) -> Order {
        match self {
            Self::Created(order) | Self::Existing(order) => order,
        }
    }
}

/// Storage port for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order and its items atomically.
    ///
    /// Must be idempotent per payment session id: a conflict on the
    /// unique constraint resolves to [`InsertOutcome::Existing`] with
    /// the already-stored order, never a duplicate row.
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, RepositoryError>;

    async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn get_by_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError>;

    /// Persist a status change. The caller is responsible for having
    /// validated the transition.
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RepositoryError>;
}

// =============================================================================
// PostgreSQL implementation
// =============================================================================

/// Order store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT listing_id, title, artist, condition, price_amount, currency,
                   quantity, weight_grams
            FROM storefront.order_items
            WHERE order_id = $1
            ORDER BY position ASC
            ",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderItemRow::into_item).collect()
    }

    async fn load_order(&self, row: OrderRow) -> Result<Order, RepositoryError> {
        let items = self.load_items(row.id).await?;
        row.into_order(items)
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Option<i64>,
    status: String,
    email: String,
    customer_name: Option<String>,
    total_amount: Decimal,
    currency: String,
    ship_name: String,
    ship_line1: String,
    ship_line2: Option<String>,
    ship_city: String,
    ship_state: Option<String>,
    ship_postal_code: String,
    ship_country: String,
    stripe_session_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let status: OrderStatus = self.status.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid order status in database: {e}"))
        })?;
        let currency: CurrencyCode = self.currency.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;

        Ok(Order {
            id: OrderId::new(self.id),
            user_id: self.user_id.map(UserId::new),
            status,
            email: self.email,
            customer_name: self.customer_name,
            total: Price::new(self.total_amount, currency),
            shipping_address: ShippingAddress {
                name: self.ship_name,
                line1: self.ship_line1,
                line2: self.ship_line2,
                city: self.ship_city,
                state: self.ship_state,
                postal_code: self.ship_postal_code,
                country: self.ship_country,
            },
            stripe_session_id: self.stripe_session_id,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    listing_id: i64,
    title: String,
    artist: String,
    condition: String,
    price_amount: Decimal,
    currency: String,
    quantity: i32,
    weight_grams: Option<i32>,
}

impl OrderItemRow {
    fn into_item(self) -> Result<OrderItem, RepositoryError> {
        let condition: Condition = self.condition.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid condition in database: {e}"))
        })?;
        let currency: CurrencyCode = self.currency.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;
        let quantity = u32::try_from(self.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative quantity: {}", self.quantity))
        })?;
        let weight_grams = self
            .weight_grams
            .map(|w| {
                u32::try_from(w).map_err(|_| {
                    RepositoryError::DataCorruption(format!("negative weight: {w}"))
                })
            })
            .transpose()?;

        Ok(OrderItem {
            listing_id: ListingId::new(self.listing_id),
            title: self.title,
            artist: self.artist,
            condition,
            price: Price::new(self.price_amount, currency),
            quantity,
            weight_grams,
        })
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // ON CONFLICT DO NOTHING instead of catching the unique
        // violation: concurrent instances race to this insert and the
        // loser must see the winner's row, not an error.
        let inserted = sqlx::query(
            r"
            INSERT INTO storefront.orders
                (id, user_id, status, email, customer_name, total_amount, currency,
                 ship_name, ship_line1, ship_line2, ship_city, ship_state,
                 ship_postal_code, ship_country, stripe_session_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (stripe_session_id) DO NOTHING
            ",
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.map(|u| u.as_i64()))
        .bind(order.status.as_str())
        .bind(&order.email)
        .bind(&order.customer_name)
        .bind(order.total.amount)
        .bind(order.total.currency_code.code())
        .bind(&order.shipping_address.name)
        .bind(&order.shipping_address.line1)
        .bind(&order.shipping_address.line2)
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.state)
        .bind(&order.shipping_address.postal_code)
        .bind(&order.shipping_address.country)
        .bind(&order.stripe_session_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            drop(tx);
            let existing = self
                .get_by_session(&order.stripe_session_id)
                .await?
                .ok_or_else(|| {
                    RepositoryError::Conflict(
                        "payment session conflicted but existing order is not visible".to_string(),
                    )
                })?;
            return Ok(InsertOutcome::Existing(existing));
        }

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO storefront.order_items
                    (order_id, listing_id, title, artist, condition,
                     price_amount, currency, quantity, weight_grams, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ",
            )
            .bind(order.id.as_uuid())
            .bind(item.listing_id.as_i64())
            .bind(&item.title)
            .bind(&item.artist)
            .bind(item.condition.as_str())
            .bind(item.price.amount)
            .bind(item.price.currency_code.code())
            .bind(i32::try_from(item.quantity).unwrap_or(i32::MAX))
            .bind(item.weight_grams.map(|w| i32::try_from(w).unwrap_or(i32::MAX)))
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(InsertOutcome::Created(order.clone()))
    }

    async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r"
            SELECT id, user_id, status, email, customer_name, total_amount, currency,
                   ship_name, ship_line1, ship_line2, ship_city, ship_state,
                   ship_postal_code, ship_country, stripe_session_id, created_at, updated_at
            FROM storefront.orders
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r"
            SELECT id, user_id, status, email, customer_name, total_amount, currency,
                   ship_name, ship_line1, ship_line2, ship_city, ship_state,
                   ship_postal_code, ship_country, stripe_session_id, created_at, updated_at
            FROM storefront.orders
            WHERE stripe_session_id = $1
            ",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET status = $1, updated_at = now()
            WHERE id = $2
            ",
        )
        .bind(status.as_str())
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

// =============================================================================
// In-memory implementation (tests, deterministic)
// =============================================================================

/// Order store keyed by payment session id, emulating the unique
/// constraint.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, RepositoryError> {
        let mut orders = self
            .orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(existing) = orders.get(&order.stripe_session_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        orders.insert(order.stripe_session_id.clone(), order.clone());
        Ok(InsertOutcome::Created(order.clone()))
    }

    async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self
            .orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(orders.values().find(|order| order.id == id).cloned())
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        let orders = self
            .orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(orders.get(session_id).cloned())
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        let mut orders = self
            .orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let order = orders
            .values_mut()
            .find(|order| order.id == id)
            .ok_or(RepositoryError::NotFound)?;

        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }
}
