//! # waitroom-core
//!
//! Core crate for the virtual waiting room. Contains the configuration
//! schema, typed identifiers, the clock abstraction, admission events,
//! the seam traits implemented by other crates, and the unified error
//! system.
//!
//! This crate has **no** internal dependencies on other waitroom crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
