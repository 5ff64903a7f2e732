//! View models returned by admission operations.

pub mod stats;
pub mod ticket;

pub use stats::{QueueStats, StatusCounts};
pub use ticket::{AdmissionTicket, TokenState};
