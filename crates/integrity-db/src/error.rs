//! Database-specific error types and conversions.

use integrity_core::error::IntegrityError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Statement failed on {entity}: {message}")]
    Statement { entity: String, message: String },

    #[error("Unique constraint violated on {entity}")]
    Conflict { entity: String },

    #[error("Corrupt row in {entity}: {message}")]
    Decode { entity: String, message: String },
}

impl DbError {
    /// Classify a failed statement, recognising unique index violations.
    pub(crate) fn from_statement(entity: &str, err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        if message.contains("already contains") || message.contains("already exists") {
            DbError::Conflict {
                entity: entity.into(),
            }
        } else {
            DbError::Statement {
                entity: entity.into(),
                message,
            }
        }
    }

    pub(crate) fn decode(entity: &str, message: impl Into<String>) -> Self {
        DbError::Decode {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

impl From<DbError> for IntegrityError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => IntegrityError::NotFound { entity, id },
            DbError::Conflict { entity } => IntegrityError::AlreadyExists { entity },
            DbError::Decode { .. } => IntegrityError::Internal(err.to_string()),
            other => IntegrityError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_index_violation_becomes_already_exists() {
        let err = DbError::from_statement(
            "device_session",
            "Database index `device_session_fingerprint` already contains 'abc'",
        );
        assert!(matches!(
            IntegrityError::from(err),
            IntegrityError::AlreadyExists { .. }
        ));

        let err = DbError::from_statement("audit_log", "Found NONE for field `action`");
        let err = IntegrityError::from(err);
        assert!(err.is_transient());
    }
}
