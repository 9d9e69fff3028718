//! Domain models for the integrity suite.
//!
//! These are the types shared by the storage and service crates.

pub mod alert;
pub mod audit;
pub mod device;
pub mod history;
pub mod restriction;
