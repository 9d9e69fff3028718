//! SurrealDB implementation of [`AlertRepository`].

use chrono::{DateTime, Utc};
use integrity_core::error::IntegrityResult;
use integrity_core::models::alert::{
    AlertFilter, AlertSeverity, AlertStatusUpdate, CreateAlert, RiskScore,
    SuspiciousActivityAlert,
};
use integrity_core::repository::AlertRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{
    enum_to_string, first_row, object_blob, parse_enum, parse_record_id, unwrap_blob,
};
use crate::error::DbError;

const ENTITY: &str = "suspicious_activity";

#[derive(Debug, SurrealValue)]
struct AlertRowWithId {
    record_id: String,
    user_id: Option<String>,
    customer_id: Option<String>,
    session_id: Option<String>,
    ip_address: Option<String>,
    device_fingerprint: Option<String>,
    activity_type: String,
    description: String,
    evidence: serde_json::Value,
    related_entity_type: Option<String>,
    related_entity_id: Option<String>,
    linked_user_ids: Vec<String>,
    linked_ips: Vec<String>,
    risk_score: i64,
    severity: String,
    status: String,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolution: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AlertRowWithId {
    fn try_into_alert(self) -> Result<SuspiciousActivityAlert, DbError> {
        Ok(SuspiciousActivityAlert {
            id: parse_record_id(ENTITY, &self.record_id)?,
            user_id: self.user_id,
            customer_id: self.customer_id,
            session_id: self.session_id,
            ip_address: self.ip_address,
            device_fingerprint: self.device_fingerprint,
            activity_type: parse_enum(ENTITY, &self.activity_type)?,
            description: self.description,
            evidence: unwrap_blob(self.evidence),
            related_entity_type: self.related_entity_type,
            related_entity_id: self.related_entity_id,
            linked_user_ids: self.linked_user_ids,
            linked_ips: self.linked_ips,
            risk_score: u8::try_from(self.risk_score)
                .ok()
                .and_then(|raw| RiskScore::try_from(raw).ok())
                .ok_or_else(|| {
                    DbError::decode(ENTITY, format!("risk score {} out of range", self.risk_score))
                })?,
            severity: parse_enum(ENTITY, &self.severity)?,
            status: parse_enum(ENTITY, &self.status)?,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at,
            resolution: self.resolution,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct SeverityCountRow {
    severity: String,
    total: u64,
}

/// SurrealDB implementation of the suspicious activity queue.
#[derive(Clone)]
pub struct SurrealAlertRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAlertRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AlertRepository for SurrealAlertRepository<C> {
    async fn create(&self, input: CreateAlert) -> IntegrityResult<SuspiciousActivityAlert> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('suspicious_activity', $id) SET \
                 user_id = $user_id, \
                 customer_id = $customer_id, \
                 session_id = $session_id, \
                 ip_address = $ip_address, \
                 device_fingerprint = $device_fingerprint, \
                 activity_type = $activity_type, \
                 description = $description, \
                 evidence = $evidence, \
                 related_entity_type = $related_entity_type, \
                 related_entity_id = $related_entity_id, \
                 linked_user_ids = $linked_user_ids, \
                 linked_ips = $linked_ips, \
                 risk_score = $risk_score, \
                 severity = $severity, \
                 severity_rank = $severity_rank, \
                 status = 'OPEN'; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('suspicious_activity', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.context.user_id))
            .bind(("customer_id", input.context.customer_id))
            .bind(("session_id", input.context.session_id))
            .bind(("ip_address", input.context.ip_address))
            .bind(("device_fingerprint", input.context.device_fingerprint))
            .bind((
                "activity_type",
                enum_to_string(ENTITY, &input.activity_type)?,
            ))
            .bind(("description", input.description))
            .bind(("evidence", object_blob(input.evidence)))
            .bind(("related_entity_type", input.related_entity_type))
            .bind(("related_entity_id", input.related_entity_id))
            .bind(("linked_user_ids", input.linked_user_ids))
            .bind(("linked_ips", input.linked_ips))
            .bind(("risk_score", i64::from(input.risk_score.value())))
            .bind(("severity", enum_to_string(ENTITY, &input.severity)?))
            .bind(("severity_rank", i64::from(input.severity.rank())))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<AlertRowWithId> = result.take(1).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, &id_str)?.try_into_alert()?)
    }

    async fn get_by_id(&self, id: Uuid) -> IntegrityResult<SuspiciousActivityAlert> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('suspicious_activity', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AlertRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, &id_str)?.try_into_alert()?)
    }

    async fn list_pending(
        &self,
        filter: AlertFilter,
    ) -> IntegrityResult<Vec<SuspiciousActivityAlert>> {
        let mut conditions = vec!["status IN ['OPEN', 'INVESTIGATING']"];
        if filter.severity.is_some() {
            conditions.push("severity = $severity");
        }
        if filter.activity_type.is_some() {
            conditions.push("activity_type = $activity_type");
        }

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM suspicious_activity \
             WHERE {} ORDER BY severity_rank DESC, created_at DESC LIMIT $limit",
            conditions.join(" AND ")
        );

        let mut builder = self.db.query(&query).bind(("limit", filter.limit));
        if let Some(severity) = filter.severity {
            builder = builder.bind(("severity", enum_to_string(ENTITY, &severity)?));
        }
        if let Some(activity_type) = filter.activity_type {
            builder = builder.bind(("activity_type", enum_to_string(ENTITY, &activity_type)?));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<AlertRowWithId> = result.take(0).map_err(DbError::from)?;
        let alerts = rows
            .into_iter()
            .map(AlertRowWithId::try_into_alert)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(alerts)
    }

    async fn update_status(
        &self,
        id: Uuid,
        update: AlertStatusUpdate,
    ) -> IntegrityResult<SuspiciousActivityAlert> {
        let id_str = id.to_string();

        let mut sets = vec!["status = $status", "updated_at = $at"];
        if update.status.is_terminal() {
            sets.push("resolved_by = $resolved_by");
            sets.push("resolution = $resolution");
            sets.push("resolved_at = $at");
        }

        let query = format!(
            "UPDATE type::record('suspicious_activity', $id) SET {}; \
             SELECT meta::id(id) AS record_id, * \
             FROM type::record('suspicious_activity', $id);",
            sets.join(", ")
        );

        let result = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("status", enum_to_string(ENTITY, &update.status)?))
            .bind(("at", update.at))
            .bind(("resolved_by", update.resolved_by))
            .bind(("resolution", update.resolution))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<AlertRowWithId> = result.take(1).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, &id_str)?.try_into_alert()?)
    }

    async fn count_pending_by_severity(&self) -> IntegrityResult<Vec<(AlertSeverity, u64)>> {
        let mut result = self
            .db
            .query(
                "SELECT severity, count() AS total FROM suspicious_activity \
                 WHERE status IN ['OPEN', 'INVESTIGATING'] GROUP BY severity",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SeverityCountRow> = result.take(0).map_err(DbError::from)?;
        let mut counts = rows
            .into_iter()
            .map(|row| Ok((parse_enum(ENTITY, &row.severity)?, row.total)))
            .collect::<Result<Vec<(AlertSeverity, u64)>, DbError>>()?;
        counts.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(counts)
    }
}
