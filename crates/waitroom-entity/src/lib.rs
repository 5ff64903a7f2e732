//! # waitroom-entity
//!
//! Domain entity models for the waiting room. Database rows derive
//! `sqlx::FromRow`; view models returned to callers derive only
//! `Serialize`/`Deserialize`.

pub mod heartbeat;
pub mod queue;
pub mod token;

pub use heartbeat::HeartbeatKey;
pub use queue::{AdmissionTicket, QueueStats, StatusCounts, TokenState};
pub use token::{AdmissionToken, NewToken, TokenStatus};
