//! Integrity suite services: audit trail, device session tracking,
//! anomaly detection and restriction enforcement.

pub mod audit;
pub mod config;
pub mod dashboard;
pub mod detection;
pub mod device;
pub mod error;
pub mod report;
pub mod restriction;

pub use audit::AuditTrail;
pub use config::DetectionConfig;
pub use dashboard::{IntegrityDashboard, IntegrityOverview};
pub use detection::DetectionEngine;
pub use device::DeviceTracker;
pub use error::PolicyError;
pub use report::{InstrumentationStats, SideEffect, StatsSnapshot};
pub use restriction::{ApplyRestriction, RestrictionService};
