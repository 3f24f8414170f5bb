//! Domain models owned by the storefront.

pub mod order;

pub use order::{CustomerDetails, NewOrder, NewOrderItem, Order, OrderItem, ShippingAddress};
