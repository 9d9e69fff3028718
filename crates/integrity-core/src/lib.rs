//! Integrity Core: domain models, repository traits and error types
//! shared by the integrity suite crates.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{IntegrityError, IntegrityResult};
