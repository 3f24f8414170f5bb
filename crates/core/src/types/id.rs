//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Marketplace
//! identifiers (listings, releases) are 64-bit, so the wrappers are
//! `i64`-backed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_i64()`
/// - `From<i64>` and `Into<i64>` implementations
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use spindle_core::define_id;
/// define_id!(ListingId);
/// define_id!(ReleaseId);
///
/// let listing_id = ListingId::new(1);
/// let release_id = ReleaseId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: ListingId = release_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <i64 as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <i64 as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <i64 as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <i64 as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

// Define standard entity IDs
define_id!(ListingId);
define_id!(ReleaseId);
define_id!(UserId);

/// Order identifier.
///
/// Orders are created by this system (not the marketplace), so they use
/// UUIDs rather than marketplace-assigned integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Create an `OrderId` from an existing UUID.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random order ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrderId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<OrderId> for Uuid {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Uuid as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderId {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <Uuid as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(id))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Uuid as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_types() {
        let listing = ListingId::new(42);
        let release = ReleaseId::new(42);

        assert_eq!(listing.as_i64(), release.as_i64());
        assert_eq!(listing.to_string(), "42");
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = ListingId::new(123);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "123");

        let back: ListingId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_order_id_roundtrip() {
        let id = OrderId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        let back: OrderId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
