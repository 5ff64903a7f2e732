//! # waitroom-database
//!
//! The durable, authoritative token store and everything around it:
//! PostgreSQL connection management, migrations, the [`TokenStore`]
//! trait with PostgreSQL and in-memory implementations, and the
//! repositories for identity lookups and the audit log.

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{MemoryTokenStore, TokenStore};
