//! SurrealDB implementation of [`DeviceSessionRepository`].

use chrono::{DateTime, Utc};
use integrity_core::error::IntegrityResult;
use integrity_core::models::device::{CreateDeviceSession, DeviceSession, TouchDeviceSession};
use integrity_core::repository::DeviceSessionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, first_row, parse_record_id};
use crate::error::DbError;

const ENTITY: &str = "device_session";

#[derive(Debug, SurrealValue)]
struct DeviceSessionRowWithId {
    record_id: String,
    fingerprint: String,
    user_id: Option<String>,
    customer_id: Option<String>,
    linked_user_ids: Vec<String>,
    linked_customer_ids: Vec<String>,
    ip_address: String,
    user_agent: String,
    platform: Option<String>,
    browser: Option<String>,
    city: Option<String>,
    country: Option<String>,
    session_token: Option<String>,
    first_seen_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl DeviceSessionRowWithId {
    fn try_into_session(self) -> Result<DeviceSession, DbError> {
        Ok(DeviceSession {
            id: parse_record_id(ENTITY, &self.record_id)?,
            fingerprint: self.fingerprint,
            user_id: self.user_id,
            customer_id: self.customer_id,
            linked_user_ids: self.linked_user_ids,
            linked_customer_ids: self.linked_customer_ids,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            platform: self.platform,
            browser: self.browser,
            city: self.city,
            country: self.country,
            session_token: self.session_token,
            first_seen_at: self.first_seen_at,
            last_active_at: self.last_active_at,
        })
    }
}

/// SurrealDB implementation of the device session tracker storage.
#[derive(Clone)]
pub struct SurrealDeviceSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDeviceSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> DeviceSessionRepository for SurrealDeviceSessionRepository<C> {
    async fn get_by_fingerprint(&self, fingerprint: &str) -> IntegrityResult<DeviceSession> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM device_session \
                 WHERE fingerprint = $fingerprint LIMIT 1",
            )
            .bind(("fingerprint", fingerprint.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DeviceSessionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, fingerprint)?.try_into_session()?)
    }

    async fn create(&self, input: CreateDeviceSession) -> IntegrityResult<DeviceSession> {
        let id_str = Uuid::new_v4().to_string();
        let linked_user_ids: Vec<String> = input.user_id.iter().cloned().collect();
        let linked_customer_ids: Vec<String> = input.customer_id.iter().cloned().collect();

        let result = self
            .db
            .query(
                "CREATE type::record('device_session', $id) SET \
                 fingerprint = $fingerprint, \
                 user_id = $user_id, \
                 customer_id = $customer_id, \
                 linked_user_ids = $linked_user_ids, \
                 linked_customer_ids = $linked_customer_ids, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 platform = $platform, \
                 browser = $browser, \
                 city = $city, \
                 country = $country, \
                 session_token = $session_token, \
                 first_seen_at = $seen_at, \
                 last_active_at = $seen_at; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('device_session', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("fingerprint", input.fingerprint))
            .bind(("user_id", input.user_id))
            .bind(("customer_id", input.customer_id))
            .bind(("linked_user_ids", linked_user_ids))
            .bind(("linked_customer_ids", linked_customer_ids))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.device.user_agent))
            .bind(("platform", input.device.platform))
            .bind(("browser", input.device.browser))
            .bind(("city", input.device.city))
            .bind(("country", input.device.country))
            .bind(("session_token", input.session_token))
            .bind(("seen_at", input.seen_at))
            .await
            .map_err(DbError::from)?;

        // A second writer for the same fingerprint trips the UNIQUE index.
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<DeviceSessionRowWithId> = result.take(1).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, &id_str)?.try_into_session()?)
    }

    async fn touch(
        &self,
        fingerprint: &str,
        input: TouchDeviceSession,
    ) -> IntegrityResult<DeviceSession> {
        let mut sets = vec!["last_active_at = $seen_at"];
        if input.user_id.is_some() {
            sets.push("user_id = $user_id");
            sets.push("linked_user_ids = array::union(linked_user_ids, [$user_id])");
        }
        if input.customer_id.is_some() {
            sets.push("customer_id = $customer_id");
            sets.push(
                "linked_customer_ids = array::union(linked_customer_ids, [$customer_id])",
            );
        }
        if input.session_token.is_some() {
            sets.push("session_token = $session_token");
        }

        let query = format!(
            "UPDATE device_session SET {} WHERE fingerprint = $fingerprint; \
             SELECT meta::id(id) AS record_id, * FROM device_session \
             WHERE fingerprint = $fingerprint LIMIT 1;",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("fingerprint", fingerprint.to_string()))
            .bind(("seen_at", input.seen_at));
        if let Some(user_id) = input.user_id {
            builder = builder.bind(("user_id", user_id));
        }
        if let Some(customer_id) = input.customer_id {
            builder = builder.bind(("customer_id", customer_id));
        }
        if let Some(session_token) = input.session_token {
            builder = builder.bind(("session_token", session_token));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<DeviceSessionRowWithId> = result.take(1).map_err(DbError::from)?;
        Ok(first_row(rows, ENTITY, fingerprint)?.try_into_session()?)
    }

    async fn list_by_ip_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> IntegrityResult<Vec<DeviceSession>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM device_session \
                 WHERE ip_address = $ip_address AND last_active_at >= $since \
                 ORDER BY last_active_at DESC",
            )
            .bind(("ip_address", ip_address.to_string()))
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DeviceSessionRowWithId> = result.take(0).map_err(DbError::from)?;
        let sessions = rows
            .into_iter()
            .map(DeviceSessionRowWithId::try_into_session)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(sessions)
    }

    async fn customer_seen_from_ip(
        &self,
        customer_id: &str,
        ip_address: &str,
    ) -> IntegrityResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM device_session \
                 WHERE ip_address = $ip_address \
                 AND (customer_id = $customer_id \
                 OR linked_customer_ids CONTAINS $customer_id) \
                 GROUP ALL",
            )
            .bind(("ip_address", ip_address.to_string()))
            .bind(("customer_id", customer_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().is_some_and(|r| r.total > 0))
    }
}
