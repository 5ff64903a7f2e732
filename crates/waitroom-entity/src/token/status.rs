//! Token status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an admission token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    /// Holding a place in line.
    Waiting,
    /// Holding one of the bounded slots.
    Active,
    /// The protected operation completed.
    Used,
    /// Timed out or abandoned.
    Expired,
    /// Withdrawn by the owner.
    Cancelled,
}

impl TokenStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TokenStatus; 5] = [
        Self::Waiting,
        Self::Active,
        Self::Used,
        Self::Expired,
        Self::Cancelled,
    ];

    /// Whether the token still takes part in admission (`WAITING` or `ACTIVE`).
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Waiting | Self::Active)
    }

    /// Whether the token can no longer change state.
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    /// Return the status as an upper-case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Active => "ACTIVE",
            Self::Used => "USED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown token status: {s}"))
    }
}
