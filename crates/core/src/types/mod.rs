//! Core types for Spindle Records.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod condition;
pub mod id;
pub mod price;
pub mod status;

pub use condition::{Condition, ConditionParseError};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::{OrderStatus, StatusParseError};
