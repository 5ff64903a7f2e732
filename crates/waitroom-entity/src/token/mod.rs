//! Admission token entity.

pub mod model;
pub mod status;

pub use model::{AdmissionToken, NewToken};
pub use status::TokenStatus;
