//! Per-resource queue statistics.

use serde::{Deserialize, Serialize};
use waitroom_core::types::ResourceId;

use crate::token::TokenStatus;

/// Number of tokens in each status for one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// `WAITING` tokens.
    pub waiting: u64,
    /// `ACTIVE` tokens.
    pub active: u64,
    /// `USED` tokens.
    pub used: u64,
    /// `EXPIRED` tokens.
    pub expired: u64,
    /// `CANCELLED` tokens.
    pub cancelled: u64,
}

impl StatusCounts {
    /// Add `n` tokens of `status`.
    pub fn add(&mut self, status: TokenStatus, n: u64) {
        match status {
            TokenStatus::Waiting => self.waiting += n,
            TokenStatus::Active => self.active += n,
            TokenStatus::Used => self.used += n,
            TokenStatus::Expired => self.expired += n,
            TokenStatus::Cancelled => self.cancelled += n,
        }
    }
}

/// Dashboard view of one resource's line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// The resource.
    pub resource_id: ResourceId,
    /// `WAITING` tokens.
    pub waiting: u64,
    /// `ACTIVE` tokens.
    pub active: u64,
    /// `USED` tokens.
    pub used: u64,
    /// `EXPIRED` plus `CANCELLED` tokens.
    pub expired: u64,
    /// Estimated wait for someone joining now.
    pub average_wait_seconds: u64,
}

impl QueueStats {
    /// Build stats from counts and the per-person wait unit.
    pub fn from_counts(resource_id: ResourceId, counts: StatusCounts, wait_unit: u64) -> Self {
        Self {
            resource_id,
            waiting: counts.waiting,
            active: counts.active,
            used: counts.used,
            expired: counts.expired + counts.cancelled,
            average_wait_seconds: counts.waiting * wait_unit,
        }
    }

    /// Whether the resource has anyone waiting or active.
    pub fn has_activity(&self) -> bool {
        self.waiting > 0 || self.active > 0
    }
}
