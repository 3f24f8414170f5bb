//! Business-logic services.

pub mod orders;

pub use orders::{InventoryWriter, OrderError, OrderService};
