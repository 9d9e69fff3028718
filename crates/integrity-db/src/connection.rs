//! SurrealDB connection management.

use std::fmt;

use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::{Instrument, info, info_span};

use crate::error::DbError;
use crate::repository::{
    SurrealAccountFlagRepository, SurrealAlertRepository, SurrealAuditLogRepository,
    SurrealDeviceSessionRepository, SurrealRestrictionRepository,
};
use crate::schema::run_migrations;

/// Configuration for connecting to SurrealDB.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// WebSocket URL (e.g., `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "marketplace".into(),
            database: "integrity".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

// Config is logged at startup; keep the password out of it.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Shared SurrealDB client for the integrity tables.
///
/// Every repository handed out by the manager clones the same client, so
/// the audit trail, restrictions and account flags written by one service
/// call land in the same namespace and database.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, sign in as root and select the configured namespace and
    /// database.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let span = info_span!(
            "integrity_db_connect",
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
        );

        async {
            let db = Surreal::new::<Ws>(&config.url).await?;
            db.signin(Root {
                username: config.username.clone(),
                password: config.password.clone(),
            })
            .await?;
            db.use_ns(&config.namespace)
                .use_db(&config.database)
                .await?;

            info!("Connected to integrity store");
            Ok::<_, DbError>(Self { db })
        }
        .instrument(span)
        .await
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), DbError> {
        run_migrations(&self.db).await
    }

    /// Returns a reference to the underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }

    pub fn audit_log(&self) -> SurrealAuditLogRepository<Client> {
        SurrealAuditLogRepository::new(self.db.clone())
    }

    pub fn device_sessions(&self) -> SurrealDeviceSessionRepository<Client> {
        SurrealDeviceSessionRepository::new(self.db.clone())
    }

    pub fn alerts(&self) -> SurrealAlertRepository<Client> {
        SurrealAlertRepository::new(self.db.clone())
    }

    pub fn restrictions(&self) -> SurrealRestrictionRepository<Client> {
        SurrealRestrictionRepository::new(self.db.clone())
    }

    pub fn account_flags(&self) -> SurrealAccountFlagRepository<Client> {
        SurrealAccountFlagRepository::new(self.db.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_the_password() {
        let config = DbConfig {
            password: "hunter2".into(),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("integrity"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: DbConfig =
            serde_json::from_str(r#"{ "url": "db.internal:8000" }"#).unwrap();
        assert_eq!(config.url, "db.internal:8000");
        assert_eq!(config.namespace, "marketplace");
        assert_eq!(config.database, "integrity");
    }
}
