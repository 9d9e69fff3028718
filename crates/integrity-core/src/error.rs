//! Error types for the integrity suite.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntegrityError {
    /// Storage-level failures that may succeed on a later attempt.
    ///
    /// Everything else indicates a caller mistake or a bug, and is
    /// reported differently by the best-effort write paths.
    pub fn is_transient(&self) -> bool {
        matches!(self, IntegrityError::Database(_))
    }
}

pub type IntegrityResult<T> = Result<T, IntegrityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_database_errors_are_transient() {
        assert!(IntegrityError::Database("connection reset".into()).is_transient());
        assert!(
            !IntegrityError::PreconditionFailed {
                reason: "x".into()
            }
            .is_transient()
        );
        assert!(!IntegrityError::Internal("lock poisoned".into()).is_transient());
    }
}
