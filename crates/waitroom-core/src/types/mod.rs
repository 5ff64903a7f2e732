//! Shared domain types used across all crates.

pub mod clock;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{OwnerId, ResourceId, SubResourceId};
