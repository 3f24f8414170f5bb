//! Type-safe price representation using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price from an amount in the smallest currency unit
    /// (cents for USD). Payment providers report totals this way.
    #[must_use]
    pub fn from_minor_units(minor: i64, currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(minor, 2),
            currency_code,
        }
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:.2}", self.currency_code.symbol(), self.amount)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Currency symbol for display.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "\u{20ac}",
            Self::GBP => "\u{a3}",
        }
    }

    /// ISO 4217 alphabetic code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            _ => Err(format!("unsupported currency code: {s}")),
        }
    }
}
