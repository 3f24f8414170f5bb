//! Order status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of an order.
///
/// Transitions are monotonic: `Pending -> Paid -> Shipped`, with
/// `Pending -> Failed` and `Paid -> Failed` (refund) also permitted.
/// `Shipped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Failed,
}

impl OrderStatus {
    /// Whether a transition from `self` to `next` is permitted.
    ///
    /// Self-transitions are not permitted; a redelivered "paid" event
    /// against an already-paid order must be handled as a no-op by the
    /// caller, not as a transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Failed)
                | (Self::Paid, Self::Shipped | Self::Failed)
        )
    }

    /// Whether the order has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shipped | Self::Failed)
    }

    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing an [`OrderStatus`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid order status: {0}")]
pub struct StatusParseError(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "failed" => Ok(Self::Failed),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Failed));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Failed,
        ] {
            assert!(!OrderStatus::Shipped.can_transition_to(next));
            assert!(!OrderStatus::Failed.can_transition_to(next));
        }
        assert!(OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_self_transition_rejected() {
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_round_trip_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Failed,
        ] {
            let parsed: OrderStatus = status.as_str().parse().expect("parse");
            assert_eq!(parsed, status);
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }
}
