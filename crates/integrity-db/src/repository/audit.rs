//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The table definition forbids updates and deletes, and this type only
//! ever issues `CREATE` and `SELECT`.

use chrono::{DateTime, Utc};
use integrity_core::error::IntegrityResult;
use integrity_core::models::audit::{AuditLogEntry, AuditLogFilter, CreateAuditLogEntry};
use integrity_core::repository::AuditLogRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{
    CountRow, enum_to_string, first_row, object_blob, parse_enum, parse_record_id, unwrap_blob,
};
use crate::error::DbError;

const ENTITY: &str = "audit_log";

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    actor_id: Option<String>,
    actor_email: Option<String>,
    actor_role: Option<String>,
    actor_ip: Option<String>,
    actor_device: Option<String>,
    action: String,
    entity_type: String,
    entity_id: Option<String>,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
    changes: Option<serde_json::Value>,
    reason: Option<String>,
    metadata: Option<serde_json::Value>,
    severity: String,
    created_at: DateTime<Utc>,
}

impl AuditRowWithId {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_record_id(ENTITY, &self.record_id)?,
            actor_id: self.actor_id,
            actor_email: self.actor_email,
            actor_role: self.actor_role,
            actor_ip: self.actor_ip,
            actor_device: self.actor_device,
            action: parse_enum(ENTITY, &self.action)?,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            old_value: self.old_value.map(unwrap_blob),
            new_value: self.new_value.map(unwrap_blob),
            changes: self.changes.map(unwrap_blob),
            reason: self.reason,
            metadata: self.metadata.map(unwrap_blob),
            severity: parse_enum(ENTITY, &self.severity)?,
            created_at: self.created_at,
        })
    }
}

fn into_entries(rows: Vec<AuditRowWithId>) -> Result<Vec<AuditLogEntry>, DbError> {
    rows.into_iter()
        .map(AuditRowWithId::try_into_entry)
        .collect()
}

/// SurrealDB implementation of the append-only audit log.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> IntegrityResult<AuditLogEntry> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 actor_id = $actor_id, \
                 actor_email = $actor_email, \
                 actor_role = $actor_role, \
                 actor_ip = $actor_ip, \
                 actor_device = $actor_device, \
                 action = $action, \
                 entity_type = $entity_type, \
                 entity_id = $entity_id, \
                 old_value = $old_value, \
                 new_value = $new_value, \
                 changes = $changes, \
                 reason = $reason, \
                 metadata = $metadata, \
                 severity = $severity; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('audit_log', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("actor_id", input.context.actor_id))
            .bind(("actor_email", input.context.actor_email))
            .bind(("actor_role", input.context.actor_role))
            .bind(("actor_ip", input.context.actor_ip))
            .bind(("actor_device", input.context.actor_device))
            .bind(("action", enum_to_string(ENTITY, &input.action)?))
            .bind(("entity_type", input.entity_type))
            .bind(("entity_id", input.entity_id))
            .bind(("old_value", input.old_value.map(object_blob)))
            .bind(("new_value", input.new_value.map(object_blob)))
            .bind(("changes", input.changes.map(object_blob)))
            .bind(("reason", input.reason))
            .bind(("metadata", input.metadata.map(object_blob)))
            .bind(("severity", enum_to_string(ENTITY, &input.severity)?))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<AuditRowWithId> = result.take(1).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, &id_str)?.try_into_entry()?)
    }

    async fn query(&self, filter: AuditLogFilter) -> IntegrityResult<Vec<AuditLogEntry>> {
        let mut conditions = Vec::new();
        if filter.actor_id.is_some() {
            conditions.push("actor_id = $actor_id");
        }
        if filter.action.is_some() {
            conditions.push("action = $action");
        }
        if filter.entity_type.is_some() {
            conditions.push("entity_type = $entity_type");
        }
        if filter.entity_id.is_some() {
            conditions.push("entity_id = $entity_id");
        }
        if filter.severity.is_some() {
            conditions.push("severity = $severity");
        }
        if filter.from.is_some() {
            conditions.push("created_at >= $from");
        }
        if filter.to.is_some() {
            conditions.push("created_at <= $to");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM audit_log {where_clause} \
             ORDER BY created_at DESC LIMIT $limit"
        );

        let mut builder = self.db.query(&query).bind(("limit", filter.limit));
        if let Some(actor_id) = filter.actor_id {
            builder = builder.bind(("actor_id", actor_id));
        }
        if let Some(action) = filter.action {
            builder = builder.bind(("action", enum_to_string(ENTITY, &action)?));
        }
        if let Some(entity_type) = filter.entity_type {
            builder = builder.bind(("entity_type", entity_type));
        }
        if let Some(entity_id) = filter.entity_id {
            builder = builder.bind(("entity_id", entity_id));
        }
        if let Some(severity) = filter.severity {
            builder = builder.bind(("severity", enum_to_string(ENTITY, &severity)?));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_entries(rows)?)
    }

    async fn entity_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> IntegrityResult<Vec<AuditLogEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM audit_log \
                 WHERE entity_type = $entity_type AND entity_id = $entity_id \
                 ORDER BY created_at DESC",
            )
            .bind(("entity_type", entity_type.to_string()))
            .bind(("entity_id", entity_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_entries(rows)?)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> IntegrityResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM audit_log \
                 WHERE created_at >= $since GROUP ALL",
            )
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
