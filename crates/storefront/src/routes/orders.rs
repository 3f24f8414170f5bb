//! Order route handlers.

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use spindle_core::OrderId;

use crate::error::Result;
use crate::models::Order;
use crate::state::AppState;

/// `GET /orders/{id}` - order lookup for account/ops views.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    let order = state.orders().get_order(OrderId::new(id)).await?;
    Ok(Json(order))
}
