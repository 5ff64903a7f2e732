//! Admission responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waitroom_core::types::{OwnerId, ResourceId};

use crate::token::{AdmissionToken, TokenStatus};

/// Answer to an admission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionTicket {
    /// Whether the caller must wait.
    pub queued: bool,
    /// Token value, absent only when the request degraded before minting.
    pub token: Option<String>,
    /// Token status, absent when degraded.
    pub status: Option<TokenStatus>,
    /// Position in line when queued.
    pub position: Option<u32>,
    /// Estimated wait when queued.
    pub eta_seconds: Option<u64>,
    /// Active holders at decision time.
    pub active_count: u32,
    /// Configured cap.
    pub max_active: u32,
    /// Human-readable summary.
    pub message: String,
    /// Set when an internal failure forced the fallback to queueing.
    pub degraded: bool,
}

impl AdmissionTicket {
    /// A grant to proceed directly.
    pub fn proceed(token: &AdmissionToken, active_count: u32, max_active: u32) -> Self {
        Self {
            queued: false,
            token: Some(token.token_value.clone()),
            status: Some(token.status),
            position: None,
            eta_seconds: None,
            active_count,
            max_active,
            message: "Proceed directly".to_string(),
            degraded: false,
        }
    }

    /// A place in line.
    pub fn queued(
        token: &AdmissionToken,
        position: u32,
        eta_seconds: u64,
        active_count: u32,
        max_active: u32,
    ) -> Self {
        Self {
            queued: true,
            token: Some(token.token_value.clone()),
            status: Some(token.status),
            position: Some(position),
            eta_seconds: Some(eta_seconds),
            active_count,
            max_active,
            message: format!("Queued at position {position}"),
            degraded: false,
        }
    }

    /// Fallback when an internal dependency failed: queue, never admit.
    pub fn degraded(max_active: u32) -> Self {
        Self {
            queued: true,
            token: None,
            status: None,
            position: None,
            eta_seconds: None,
            active_count: max_active,
            max_active,
            message: "Temporarily unable to admit, please wait and retry".to_string(),
            degraded: true,
        }
    }
}

/// Snapshot of one token as shown to its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    /// Token value.
    pub token: String,
    /// Owner.
    pub owner_id: OwnerId,
    /// Resource.
    pub resource_id: ResourceId,
    /// Current status.
    pub status: TokenStatus,
    /// Position in line (0 unless waiting).
    pub position: u32,
    /// Estimated wait (0 unless waiting).
    pub eta_seconds: u64,
    /// When the token was minted.
    pub issued_at: DateTime<Utc>,
    /// Overall ceiling.
    pub expires_at: DateTime<Utc>,
    /// End of the active window.
    pub active_window_expires_at: Option<DateTime<Utc>>,
}

impl From<&AdmissionToken> for TokenState {
    fn from(token: &AdmissionToken) -> Self {
        Self {
            token: token.token_value.clone(),
            owner_id: token.owner_id,
            resource_id: token.resource_id,
            status: token.status,
            position: token.position(),
            eta_seconds: u64::try_from(token.estimated_wait_seconds).unwrap_or(0),
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            active_window_expires_at: token.active_window_expires_at,
        }
    }
}
