//! Core traits defined in `waitroom-core` and implemented by other crates.

pub mod audit;
pub mod cache;
pub mod identity;

pub use audit::AuditSink;
pub use cache::CacheProvider;
pub use identity::IdentityDirectory;
