//! Concrete PostgreSQL repository implementations.

pub mod audit;
pub mod identity;
pub mod token;

pub use audit::AuditLogRepository;
pub use identity::IdentityRepository;
pub use token::TokenRepository;
