//! Record condition grading.
//!
//! Uses the Goldmine grading scale, which is how marketplace listings
//! describe both media and sleeve condition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Goldmine condition grade for media or sleeve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Condition {
    Poor,
    Fair,
    Good,
    GoodPlus,
    VeryGood,
    VeryGoodPlus,
    NearMint,
    Mint,
}

impl Condition {
    /// Marketplace string form, e.g. `"Very Good Plus (VG+)"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mint => "Mint (M)",
            Self::NearMint => "Near Mint (NM or M-)",
            Self::VeryGoodPlus => "Very Good Plus (VG+)",
            Self::VeryGood => "Very Good (VG)",
            Self::GoodPlus => "Good Plus (G+)",
            Self::Good => "Good (G)",
            Self::Fair => "Fair (F)",
            Self::Poor => "Poor (P)",
        }
    }

    /// Short grade abbreviation for compact display.
    #[must_use]
    pub const fn abbrev(self) -> &'static str {
        match self {
            Self::Mint => "M",
            Self::NearMint => "NM",
            Self::VeryGoodPlus => "VG+",
            Self::VeryGood => "VG",
            Self::GoodPlus => "G+",
            Self::Good => "G",
            Self::Fair => "F",
            Self::Poor => "P",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing a [`Condition`] from a marketplace string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized condition grade: {0}")]
pub struct ConditionParseError(pub String);

impl std::str::FromStr for Condition {
    type Err = ConditionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Marketplace payloads use the long form; accept abbreviations too.
        match s.trim() {
            "Mint (M)" | "M" => Ok(Self::Mint),
            "Near Mint (NM or M-)" | "NM" | "M-" => Ok(Self::NearMint),
            "Very Good Plus (VG+)" | "VG+" => Ok(Self::VeryGoodPlus),
            "Very Good (VG)" | "VG" => Ok(Self::VeryGood),
            "Good Plus (G+)" | "G+" => Ok(Self::GoodPlus),
            "Good (G)" | "G" => Ok(Self::Good),
            "Fair (F)" | "F" => Ok(Self::Fair),
            "Poor (P)" | "P" => Ok(Self::Poor),
            other => Err(ConditionParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_long_and_short_forms() {
        assert_eq!(
            "Very Good Plus (VG+)".parse::<Condition>(),
            Ok(Condition::VeryGoodPlus)
        );
        assert_eq!("NM".parse::<Condition>(), Ok(Condition::NearMint));
        assert!("Mint-ish".parse::<Condition>().is_err());
    }

    #[test]
    fn test_grades_order_by_quality() {
        assert!(Condition::Mint > Condition::NearMint);
        assert!(Condition::VeryGoodPlus > Condition::Good);
        assert!(Condition::Poor < Condition::Fair);
    }

    #[test]
    fn test_round_trip() {
        for grade in [
            Condition::Mint,
            Condition::NearMint,
            Condition::VeryGoodPlus,
            Condition::VeryGood,
            Condition::GoodPlus,
            Condition::Good,
            Condition::Fair,
            Condition::Poor,
        ] {
            assert_eq!(grade.as_str().parse::<Condition>(), Ok(grade));
        }
    }
}
