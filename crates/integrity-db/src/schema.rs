//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! record ids, enums as their SCREAMING_SNAKE_CASE names with ASSERT
//! constraints, and JSON blobs as flexible objects.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "integrity_suite",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: integrity suite tables
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Audit Log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD actor_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD actor_email ON TABLE audit_log TYPE option<string>;
DEFINE FIELD actor_role ON TABLE audit_log TYPE option<string>;
DEFINE FIELD actor_ip ON TABLE audit_log TYPE option<string>;
DEFINE FIELD actor_device ON TABLE audit_log TYPE option<string>;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD entity_type ON TABLE audit_log TYPE string;
DEFINE FIELD entity_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD old_value ON TABLE audit_log TYPE option<object> FLEXIBLE;
DEFINE FIELD new_value ON TABLE audit_log TYPE option<object> FLEXIBLE;
DEFINE FIELD changes ON TABLE audit_log TYPE option<object> FLEXIBLE;
DEFINE FIELD reason ON TABLE audit_log TYPE option<string>;
DEFINE FIELD metadata ON TABLE audit_log TYPE option<object> FLEXIBLE;
DEFINE FIELD severity ON TABLE audit_log TYPE string \
    ASSERT $value IN ['INFO', 'NOTICE', 'WARNING', 'CRITICAL'];
DEFINE FIELD created_at ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_entity ON TABLE audit_log \
    COLUMNS entity_type, entity_id, created_at;
DEFINE INDEX idx_audit_actor ON TABLE audit_log \
    COLUMNS actor_id, created_at;
DEFINE INDEX idx_audit_time ON TABLE audit_log COLUMNS created_at;

-- =======================================================================
-- Device Sessions (one row per fingerprint)
-- =======================================================================
DEFINE TABLE device_session SCHEMAFULL;
DEFINE FIELD fingerprint ON TABLE device_session TYPE string;
DEFINE FIELD user_id ON TABLE device_session TYPE option<string>;
DEFINE FIELD customer_id ON TABLE device_session TYPE option<string>;
DEFINE FIELD linked_user_ids ON TABLE device_session \
    TYPE array<string> DEFAULT [];
DEFINE FIELD linked_customer_ids ON TABLE device_session \
    TYPE array<string> DEFAULT [];
DEFINE FIELD ip_address ON TABLE device_session TYPE string;
DEFINE FIELD user_agent ON TABLE device_session TYPE string;
DEFINE FIELD platform ON TABLE device_session TYPE option<string>;
DEFINE FIELD browser ON TABLE device_session TYPE option<string>;
DEFINE FIELD city ON TABLE device_session TYPE option<string>;
DEFINE FIELD country ON TABLE device_session TYPE option<string>;
DEFINE FIELD session_token ON TABLE device_session TYPE option<string>;
DEFINE FIELD first_seen_at ON TABLE device_session TYPE datetime;
DEFINE FIELD last_active_at ON TABLE device_session TYPE datetime;
DEFINE INDEX idx_device_fingerprint ON TABLE device_session \
    COLUMNS fingerprint UNIQUE;
DEFINE INDEX idx_device_ip_active ON TABLE device_session \
    COLUMNS ip_address, last_active_at;

-- =======================================================================
-- Suspicious Activity Alerts
-- =======================================================================
DEFINE TABLE suspicious_activity SCHEMAFULL;
DEFINE FIELD user_id ON TABLE suspicious_activity TYPE option<string>;
DEFINE FIELD customer_id ON TABLE suspicious_activity \
    TYPE option<string>;
DEFINE FIELD session_id ON TABLE suspicious_activity TYPE option<string>;
DEFINE FIELD ip_address ON TABLE suspicious_activity TYPE option<string>;
DEFINE FIELD device_fingerprint ON TABLE suspicious_activity \
    TYPE option<string>;
DEFINE FIELD activity_type ON TABLE suspicious_activity TYPE string \
    ASSERT $value IN ['MULTI_ACCOUNT', 'RAPID_WITHDRAWALS', \
    'COLLUSION_BIDDING', 'PRICE_MANIPULATION', 'FAKE_REVIEWS'];
DEFINE FIELD description ON TABLE suspicious_activity TYPE string;
DEFINE FIELD evidence ON TABLE suspicious_activity TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD related_entity_type ON TABLE suspicious_activity \
    TYPE option<string>;
DEFINE FIELD related_entity_id ON TABLE suspicious_activity \
    TYPE option<string>;
DEFINE FIELD linked_user_ids ON TABLE suspicious_activity \
    TYPE array<string> DEFAULT [];
DEFINE FIELD linked_ips ON TABLE suspicious_activity \
    TYPE array<string> DEFAULT [];
DEFINE FIELD risk_score ON TABLE suspicious_activity TYPE int \
    ASSERT $value >= 0 AND $value <= 100;
DEFINE FIELD severity ON TABLE suspicious_activity TYPE string \
    ASSERT $value IN ['LOW', 'MEDIUM', 'HIGH', 'CRITICAL'];
DEFINE FIELD severity_rank ON TABLE suspicious_activity TYPE int;
DEFINE FIELD status ON TABLE suspicious_activity TYPE string \
    ASSERT $value IN ['OPEN', 'INVESTIGATING', 'RESOLVED', 'DISMISSED'];
DEFINE FIELD resolved_by ON TABLE suspicious_activity \
    TYPE option<string>;
DEFINE FIELD resolved_at ON TABLE suspicious_activity \
    TYPE option<datetime>;
DEFINE FIELD resolution ON TABLE suspicious_activity TYPE option<string>;
DEFINE FIELD created_at ON TABLE suspicious_activity TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE suspicious_activity TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_alert_queue ON TABLE suspicious_activity \
    COLUMNS status, severity_rank, created_at;

-- =======================================================================
-- User Restrictions (never deleted, only deactivated)
-- =======================================================================
DEFINE TABLE user_restriction SCHEMAFULL;
DEFINE FIELD customer_id ON TABLE user_restriction TYPE string;
DEFINE FIELD restriction_type ON TABLE user_restriction TYPE string \
    ASSERT $value IN ['FULL_BAN', 'MARKETPLACE_BAN', 'WALLET_HOLD', \
    'CREDIT_FREEZE', 'REVIEW_BAN', 'BIDDING_BAN', 'PROBATION'];
DEFINE FIELD reason ON TABLE user_restriction TYPE string;
DEFINE FIELD evidence ON TABLE user_restriction \
    TYPE option<object> FLEXIBLE;
DEFINE FIELD is_active ON TABLE user_restriction TYPE bool DEFAULT true;
DEFINE FIELD start_date ON TABLE user_restriction TYPE datetime;
DEFINE FIELD end_date ON TABLE user_restriction TYPE option<datetime>;
DEFINE FIELD imposed_by ON TABLE user_restriction TYPE string;
DEFINE FIELD imposed_by_name ON TABLE user_restriction \
    TYPE option<string>;
DEFINE FIELD lifted_at ON TABLE user_restriction TYPE option<datetime>;
DEFINE FIELD lifted_by ON TABLE user_restriction TYPE option<string>;
DEFINE FIELD lift_reason ON TABLE user_restriction TYPE option<string>;
DEFINE FIELD appeal_status ON TABLE user_restriction TYPE string \
    ASSERT $value IN ['NONE', 'PENDING', 'UNDER_REVIEW', 'APPROVED', \
    'REJECTED'];
DEFINE FIELD appeal_reason ON TABLE user_restriction TYPE option<string>;
DEFINE FIELD appeal_reviewed_by ON TABLE user_restriction \
    TYPE option<string>;
DEFINE FIELD appeal_reviewed_at ON TABLE user_restriction \
    TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE user_restriction TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user_restriction TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_restriction_customer ON TABLE user_restriction \
    COLUMNS customer_id, restriction_type, is_active;
DEFINE INDEX idx_restriction_expiry ON TABLE user_restriction \
    COLUMNS is_active, end_date;

-- =======================================================================
-- Account Flags (derived from effective restrictions)
-- =======================================================================
DEFINE TABLE account_flag SCHEMAFULL;
DEFINE FIELD customer_id ON TABLE account_flag TYPE string;
DEFINE FIELD credit_hold ON TABLE account_flag TYPE bool DEFAULT false;
DEFINE FIELD updated_at ON TABLE account_flag TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_account_flag_customer ON TABLE account_flag \
    COLUMNS customer_id UNIQUE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
