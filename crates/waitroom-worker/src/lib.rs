//! Background maintenance for the waiting room.
//!
//! - [`Reaper`] reclaims slots from expired tokens and abandoned sessions
//! - [`ReaperScheduler`] runs the sweep on a fixed interval and the
//!   retention purge on a cron schedule

pub mod reaper;
pub mod scheduler;

pub use reaper::{Reaper, SweepReport};
pub use scheduler::ReaperScheduler;
