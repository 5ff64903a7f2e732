//! # waitroom-admission
//!
//! The admission gate: decides direct entry versus queueing, promotes
//! waiters as slots free up, validates tokens for the protected operation,
//! and keeps the fast active-slot counter honest against the durable store.
//!
//! - [`slot`] atomic per-resource active-slot counters (memory or Redis/Lua)
//! - [`heartbeat`] per-session liveness records
//! - [`lock`] per-resource serialization of check-then-act sections
//! - [`service`] the [`AdmissionService`] orchestrator

pub mod audit;
pub mod bootstrap;
pub mod heartbeat;
pub mod identity;
pub mod lock;
pub mod reconciler;
pub mod service;
pub mod slot;
pub mod token;

pub use heartbeat::{HeartbeatRecord, HeartbeatTracker};
pub use lock::ResourceLocks;
pub use service::{AdmissionService, Promotion};
pub use slot::{AcquireResult, ActiveSlotCounter, SlotCounterDispatch};
