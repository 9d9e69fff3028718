//! SurrealDB implementation of [`RestrictionRepository`].
//!
//! Restrictions are never deleted. Lifting, expiry and appeal outcomes
//! only flip `is_active` and stamp the lift/appeal columns.

use chrono::{DateTime, Utc};
use integrity_core::error::IntegrityResult;
use integrity_core::models::restriction::{
    AppealUpdate, CreateRestriction, LiftRestriction, RestrictionFilter, RestrictionType,
    UserRestriction,
};
use integrity_core::repository::RestrictionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{
    enum_to_string, first_row, object_blob, parse_enum, parse_record_id, unwrap_blob,
};
use crate::error::DbError;

const ENTITY: &str = "user_restriction";

/// Active with no end date, or an end date still in the future.
const EFFECTIVE: &str = "is_active = true AND (end_date = NONE OR end_date > $now)";

#[derive(Debug, SurrealValue)]
struct RestrictionRowWithId {
    record_id: String,
    customer_id: String,
    restriction_type: String,
    reason: String,
    evidence: Option<serde_json::Value>,
    is_active: bool,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    imposed_by: String,
    imposed_by_name: Option<String>,
    lifted_at: Option<DateTime<Utc>>,
    lifted_by: Option<String>,
    lift_reason: Option<String>,
    appeal_status: String,
    appeal_reason: Option<String>,
    appeal_reviewed_by: Option<String>,
    appeal_reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RestrictionRowWithId {
    fn try_into_restriction(self) -> Result<UserRestriction, DbError> {
        Ok(UserRestriction {
            id: parse_record_id(ENTITY, &self.record_id)?,
            customer_id: self.customer_id,
            restriction_type: parse_enum(ENTITY, &self.restriction_type)?,
            reason: self.reason,
            evidence: self.evidence.map(unwrap_blob),
            is_active: self.is_active,
            start_date: self.start_date,
            end_date: self.end_date,
            imposed_by: self.imposed_by,
            imposed_by_name: self.imposed_by_name,
            lifted_at: self.lifted_at,
            lifted_by: self.lifted_by,
            lift_reason: self.lift_reason,
            appeal_status: parse_enum(ENTITY, &self.appeal_status)?,
            appeal_reason: self.appeal_reason,
            appeal_reviewed_by: self.appeal_reviewed_by,
            appeal_reviewed_at: self.appeal_reviewed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_restrictions(rows: Vec<RestrictionRowWithId>) -> Result<Vec<UserRestriction>, DbError> {
    rows.into_iter()
        .map(RestrictionRowWithId::try_into_restriction)
        .collect()
}

#[derive(Debug, SurrealValue)]
struct DueRow {
    record_id: String,
}

#[derive(Debug, SurrealValue)]
struct LiftedRow {
    #[allow(dead_code)]
    is_active: bool,
}

#[derive(Debug, SurrealValue)]
struct TypeCountRow {
    restriction_type: String,
    total: u64,
}

/// SurrealDB implementation of restriction storage.
#[derive(Clone)]
pub struct SurrealRestrictionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRestrictionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Deactivate one row if it is still active. Returns the updated row,
    /// or `None` when another writer got there first.
    async fn deactivate_if_active(
        &self,
        id_str: String,
        stamp: &LiftRestriction,
    ) -> Result<Option<UserRestriction>, DbError> {
        let result = self
            .db
            .query(
                "UPDATE type::record('user_restriction', $id) SET \
                 is_active = false, \
                 lifted_at = $lifted_at, \
                 lifted_by = $lifted_by, \
                 lift_reason = $lift_reason, \
                 updated_at = $lifted_at \
                 WHERE is_active = true RETURN AFTER;",
            )
            .bind(("id", id_str.clone()))
            .bind(("lifted_at", stamp.lifted_at))
            .bind(("lifted_by", stamp.lifted_by.clone()))
            .bind(("lift_reason", stamp.lift_reason.clone()))
            .await?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;
        let changed: Vec<LiftedRow> = result.take(0)?;
        if changed.is_empty() {
            return Ok(None);
        }
        self.fetch(&id_str).await.map(Some)
    }

    async fn fetch(&self, id_str: &str) -> Result<UserRestriction, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('user_restriction', $id)",
            )
            .bind(("id", id_str.to_string()))
            .await?;

        let rows: Vec<RestrictionRowWithId> = result.take(0)?;
        first_row(rows, ENTITY, id_str)?.try_into_restriction()
    }
}

impl<C: Connection> RestrictionRepository for SurrealRestrictionRepository<C> {
    async fn create(&self, input: CreateRestriction) -> IntegrityResult<UserRestriction> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user_restriction', $id) SET \
                 customer_id = $customer_id, \
                 restriction_type = $restriction_type, \
                 reason = $reason, \
                 evidence = $evidence, \
                 is_active = true, \
                 start_date = $start_date, \
                 end_date = $end_date, \
                 imposed_by = $imposed_by, \
                 imposed_by_name = $imposed_by_name, \
                 appeal_status = 'NONE'; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('user_restriction', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("customer_id", input.customer_id))
            .bind((
                "restriction_type",
                enum_to_string(ENTITY, &input.restriction_type)?,
            ))
            .bind(("reason", input.reason))
            .bind(("evidence", input.evidence.map(object_blob)))
            .bind(("start_date", input.start_date))
            .bind(("end_date", input.end_date))
            .bind(("imposed_by", input.imposed_by))
            .bind(("imposed_by_name", input.imposed_by_name))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<RestrictionRowWithId> = result.take(1).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, &id_str)?.try_into_restriction()?)
    }

    async fn get_by_id(&self, id: Uuid) -> IntegrityResult<UserRestriction> {
        Ok(self.fetch(&id.to_string()).await?)
    }

    async fn list_effective(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> IntegrityResult<Vec<UserRestriction>> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user_restriction \
             WHERE customer_id = $customer_id AND {EFFECTIVE} \
             ORDER BY created_at DESC"
        );

        let mut result = self
            .db
            .query(&query)
            .bind(("customer_id", customer_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RestrictionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_restrictions(rows)?)
    }

    async fn list(
        &self,
        filter: RestrictionFilter,
        now: DateTime<Utc>,
    ) -> IntegrityResult<Vec<UserRestriction>> {
        let mut conditions = Vec::new();
        if filter.customer_id.is_some() {
            conditions.push("customer_id = $customer_id");
        }
        if filter.effective_only {
            conditions.push(EFFECTIVE);
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user_restriction {where_clause} \
             ORDER BY created_at DESC LIMIT $limit"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("now", now))
            .bind(("limit", filter.limit));
        if let Some(customer_id) = filter.customer_id {
            builder = builder.bind(("customer_id", customer_id));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<RestrictionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_restrictions(rows)?)
    }

    async fn deactivate(
        &self,
        id: Uuid,
        input: LiftRestriction,
    ) -> IntegrityResult<Option<UserRestriction>> {
        let id_str = id.to_string();
        match self.deactivate_if_active(id_str.clone(), &input).await? {
            Some(lifted) => Ok(Some(lifted)),
            // Nothing changed: either the row is gone or it was already lifted.
            None => {
                self.fetch(&id_str).await?;
                Ok(None)
            }
        }
    }

    async fn update_appeal(
        &self,
        id: Uuid,
        input: AppealUpdate,
    ) -> IntegrityResult<UserRestriction> {
        let id_str = id.to_string();

        let mut sets = vec!["appeal_status = $appeal_status", "updated_at = time::now()"];
        if input.reason.is_some() {
            sets.push("appeal_reason = $appeal_reason");
        }
        if input.reviewed_by.is_some() {
            sets.push("appeal_reviewed_by = $appeal_reviewed_by");
            sets.push("appeal_reviewed_at = $appeal_reviewed_at");
        }

        let query = format!(
            "UPDATE type::record('user_restriction', $id) SET {};",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("appeal_status", enum_to_string(ENTITY, &input.status)?));
        if let Some(reason) = input.reason {
            builder = builder.bind(("appeal_reason", reason));
        }
        if let Some(reviewed_by) = input.reviewed_by {
            builder = builder
                .bind(("appeal_reviewed_by", reviewed_by))
                .bind(("appeal_reviewed_at", input.reviewed_at));
        }

        let result = builder.await.map_err(DbError::from)?;
        result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        Ok(self.fetch(&id_str).await?)
    }

    async fn expire_due(
        &self,
        now: DateTime<Utc>,
        stamp: LiftRestriction,
    ) -> IntegrityResult<Vec<UserRestriction>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id FROM user_restriction \
                 WHERE is_active = true AND end_date != NONE AND end_date <= $now",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let due: Vec<DueRow> = result.take(0).map_err(DbError::from)?;

        // Each row is flipped conditionally, so a concurrent sweep that
        // already deactivated it is skipped rather than re-reported.
        let mut expired = Vec::with_capacity(due.len());
        for row in due {
            if let Some(restriction) = self.deactivate_if_active(row.record_id, &stamp).await? {
                expired.push(restriction);
            }
        }
        Ok(expired)
    }

    async fn list_open_appeals(&self) -> IntegrityResult<Vec<UserRestriction>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_restriction \
                 WHERE is_active = true \
                 AND appeal_status IN ['PENDING', 'UNDER_REVIEW'] \
                 ORDER BY updated_at ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RestrictionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_restrictions(rows)?)
    }

    async fn count_effective_by_type(
        &self,
        now: DateTime<Utc>,
    ) -> IntegrityResult<Vec<(RestrictionType, u64)>> {
        let query = format!(
            "SELECT restriction_type, count() AS total FROM user_restriction \
             WHERE {EFFECTIVE} GROUP BY restriction_type"
        );

        let mut result = self
            .db
            .query(&query)
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TypeCountRow> = result.take(0).map_err(DbError::from)?;
        let counts = rows
            .into_iter()
            .map(|row| Ok((parse_enum(ENTITY, &row.restriction_type)?, row.total)))
            .collect::<Result<Vec<(RestrictionType, u64)>, DbError>>()?;

        // Report in declaration order to match the in-memory store.
        Ok(RestrictionType::ALL
            .iter()
            .filter_map(|kind| counts.iter().find(|(k, _)| k == kind).copied())
            .collect())
    }
}
