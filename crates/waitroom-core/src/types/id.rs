//! Newtype wrappers around `i64` for the externally owned identities.
//!
//! Owners, resources and sub-resources live in tables this system does not
//! own, so their keys are the numeric primary keys of those tables. Distinct
//! types keep a `ResourceId` from being passed where an `OwnerId` is expected.
//! With the `sqlx` feature each type is transparent over `BIGINT`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapper around `i64`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw key.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Return the raw key.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a token owner (a user).
    OwnerId
);

define_id!(
    /// Identifier of a contended resource (a performance).
    ResourceId
);

define_id!(
    /// Identifier of a sub-resource (a schedule within a performance).
    SubResourceId
);
