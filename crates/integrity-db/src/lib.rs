//! Integrity DB: storage for the integrity suite.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - SurrealDB implementations of the `integrity-core` repository
//!   traits ([`repository`])
//! - A shared in-memory store implementing the same traits
//!   ([`memory::InMemoryStore`])
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod memory;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use memory::InMemoryStore;
pub use schema::{run_migrations, schema_v1};
