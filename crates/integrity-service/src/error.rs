//! Policy error types.

use integrity_core::error::IntegrityError;
use integrity_core::models::alert::AlertStatus;
use integrity_core::models::restriction::AppealStatus;
use thiserror::Error;
use uuid::Uuid;

/// Caller errors: a requested transition violates a precondition.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("restriction {0} is no longer active")]
    RestrictionInactive(Uuid),

    #[error("restriction {0} has expired")]
    RestrictionExpired(Uuid),

    #[error("an appeal is already open for restriction {0}")]
    AppealAlreadyOpen(Uuid),

    #[error("the appeal for restriction {0} was already approved")]
    AppealAlreadyDecided(Uuid),

    #[error("restriction {0} has no open appeal")]
    NoOpenAppeal(Uuid),

    #[error("alert {id} is already {status:?}")]
    AlertClosed { id: Uuid, status: AlertStatus },

    #[error("alert {id} cannot move from {from:?} to {to:?}")]
    AlertTransition {
        id: Uuid,
        from: AlertStatus,
        to: AlertStatus,
    },

    #[error("{0:?} is not a resolution status")]
    InvalidResolutionStatus(AlertStatus),

    #[error("restriction duration must be at least one day")]
    ZeroDuration,

    #[error("restriction duration of {0} days is out of range")]
    DurationOutOfRange(u32),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
}

impl PolicyError {
    /// Appeal state that blocks a new submission.
    pub(crate) fn for_appeal_status(id: Uuid, status: AppealStatus) -> Self {
        if status.is_open() {
            PolicyError::AppealAlreadyOpen(id)
        } else {
            PolicyError::AppealAlreadyDecided(id)
        }
    }
}

impl From<PolicyError> for IntegrityError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidResolutionStatus(_)
            | PolicyError::ZeroDuration
            | PolicyError::DurationOutOfRange(_)
            | PolicyError::EmptyField { .. } => IntegrityError::Validation {
                message: err.to_string(),
            },
            _ => IntegrityError::PreconditionFailed {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_errors_map_to_caller_errors() {
        let id = Uuid::new_v4();
        let err: IntegrityError = PolicyError::AppealAlreadyOpen(id).into();
        assert!(matches!(err, IntegrityError::PreconditionFailed { .. }));
        assert!(!err.is_transient());

        let err: IntegrityError = PolicyError::ZeroDuration.into();
        assert!(matches!(err, IntegrityError::Validation { .. }));

        let err: IntegrityError = PolicyError::DurationOutOfRange(u32::MAX).into();
        assert!(matches!(err, IntegrityError::Validation { .. }));
    }
}
