//! Integrity sweeper: expires lapsed restrictions once and exits.
//!
//! Meant to be run on a schedule by cron or an orchestrator. The sweep
//! is idempotent, so overlapping or repeated runs are harmless.

mod config;

use anyhow::Context;
use integrity_db::DbManager;
use integrity_service::{AuditTrail, RestrictionService};
use tracing_subscriber::EnvFilter;

use crate::config::SweeperConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SweeperConfig::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    tracing::info!("Starting integrity sweeper...");

    let manager = DbManager::connect(&config.db)
        .await
        .context("failed to connect to SurrealDB")?;
    manager
        .migrate()
        .await
        .context("failed to apply schema migrations")?;

    let service = RestrictionService::new(
        manager.restrictions(),
        AuditTrail::new(manager.audit_log()),
        manager.account_flags(),
    );

    let expired = service
        .expire_restrictions()
        .await
        .context("restriction expiry sweep failed")?;

    let stats = service.stats().snapshot();
    tracing::info!(
        expired = expired.len(),
        audit_write_failures = stats.audit_write_failures,
        flag_update_failures = stats.flag_update_failures,
        "Integrity sweeper finished."
    );

    Ok(())
}
