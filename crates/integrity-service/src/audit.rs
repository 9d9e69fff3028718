//! Audit trail service.
//!
//! Writes are fire-and-report: [`AuditTrail::record`] and the category
//! wrappers never return an error, because a failed audit write must not
//! abort the action being audited. Queries do propagate storage errors.

use std::sync::Arc;

use integrity_core::error::IntegrityResult;
use integrity_core::models::audit::{
    AuditAction, AuditContext, AuditDetails, AuditLogEntry, AuditLogFilter, AuditSeverity,
    CreateAuditLogEntry,
};
use integrity_core::models::restriction::RestrictionType;
use integrity_core::repository::AuditLogRepository;
use serde_json::json;

use crate::report::{InstrumentationStats, SideEffect};

/// Authentication events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Login,
    Logout,
    LoginFailed,
    PasswordChange,
    PasswordReset,
}

impl AuthEvent {
    pub fn action(self) -> AuditAction {
        match self {
            AuthEvent::Login => AuditAction::Login,
            AuthEvent::Logout => AuditAction::Logout,
            AuthEvent::LoginFailed => AuditAction::LoginFailed,
            AuthEvent::PasswordChange => AuditAction::PasswordChange,
            AuthEvent::PasswordReset => AuditAction::PasswordReset,
        }
    }

    pub fn default_severity(self) -> AuditSeverity {
        match self {
            AuthEvent::LoginFailed => AuditSeverity::Warning,
            _ => AuditSeverity::Info,
        }
    }
}

/// Money-moving and credit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialEvent {
    CreditLimitChange,
    CreditApproval,
    CreditHold,
    WalletDeposit,
    WalletWithdrawal,
    WalletAdjustment,
    EscrowDeposit,
    EscrowRelease,
}

impl FinancialEvent {
    pub fn action(self) -> AuditAction {
        match self {
            FinancialEvent::CreditLimitChange => AuditAction::CreditLimitChange,
            FinancialEvent::CreditApproval => AuditAction::CreditApproval,
            FinancialEvent::CreditHold => AuditAction::CreditHold,
            FinancialEvent::WalletDeposit => AuditAction::WalletDeposit,
            FinancialEvent::WalletWithdrawal => AuditAction::WalletWithdrawal,
            FinancialEvent::WalletAdjustment => AuditAction::WalletAdjustment,
            FinancialEvent::EscrowDeposit => AuditAction::EscrowDeposit,
            FinancialEvent::EscrowRelease => AuditAction::EscrowRelease,
        }
    }

    /// Manual adjustments and credit holds are WARNING, the rest NOTICE.
    pub fn default_severity(self) -> AuditSeverity {
        match self {
            FinancialEvent::WalletAdjustment | FinancialEvent::CreditHold => AuditSeverity::Warning,
            _ => AuditSeverity::Notice,
        }
    }
}

/// Identity verification events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycEvent {
    Submit,
    Approve,
    Reject,
    VerificationChange,
}

impl KycEvent {
    pub fn action(self) -> AuditAction {
        match self {
            KycEvent::Submit => AuditAction::KycSubmit,
            KycEvent::Approve => AuditAction::KycApprove,
            KycEvent::Reject => AuditAction::KycReject,
            KycEvent::VerificationChange => AuditAction::VerificationChange,
        }
    }

    pub fn default_severity(self) -> AuditSeverity {
        match self {
            KycEvent::Reject => AuditSeverity::Notice,
            _ => AuditSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionEvent {
    Imposed,
    Lifted,
}

impl RestrictionEvent {
    pub fn action(self) -> AuditAction {
        match self {
            RestrictionEvent::Imposed => AuditAction::UserBan,
            RestrictionEvent::Lifted => AuditAction::UserUnban,
        }
    }
}

/// Details of a financial mutation.
#[derive(Debug, Clone, Default)]
pub struct FinancialChange {
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub amount: Option<i64>,
}

/// Details of a KYC status change.
#[derive(Debug, Clone, Default)]
pub struct KycChange {
    pub document_type: Option<String>,
    pub reason: Option<String>,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestrictionChange {
    pub restriction_type: RestrictionType,
    pub reason: String,
    /// `None` for permanent restrictions and for lifts.
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AdminOverride {
    pub override_type: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub reason: String,
}

/// Append-only audit trail over an [`AuditLogRepository`].
pub struct AuditTrail<L: AuditLogRepository> {
    repo: L,
    stats: Arc<InstrumentationStats>,
}

impl<L: AuditLogRepository> AuditTrail<L> {
    pub fn new(repo: L) -> Self {
        Self::with_stats(repo, Arc::new(InstrumentationStats::default()))
    }

    /// Share failure counters with other services.
    pub fn with_stats(repo: L, stats: Arc<InstrumentationStats>) -> Self {
        Self { repo, stats }
    }

    pub fn stats(&self) -> &Arc<InstrumentationStats> {
        &self.stats
    }

    /// Write one entry. Returns the stored entry, or `None` when the
    /// write failed (the failure has been reported).
    pub async fn record(
        &self,
        context: &AuditContext,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<&str>,
        details: AuditDetails,
    ) -> Option<AuditLogEntry> {
        let input = CreateAuditLogEntry {
            context: context.clone(),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            old_value: details.old_value,
            new_value: details.new_value,
            changes: details.changes,
            reason: details.reason,
            metadata: details.metadata,
            severity: details.severity.unwrap_or_default(),
        };
        self.stats
            .fire(SideEffect::AuditWrite, self.repo.append(input).await)
    }

    pub async fn log_auth(
        &self,
        context: &AuditContext,
        event: AuthEvent,
        user_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Option<AuditLogEntry> {
        self.record(
            context,
            event.action(),
            "User",
            user_id,
            AuditDetails {
                metadata,
                severity: Some(event.default_severity()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_financial(
        &self,
        context: &AuditContext,
        event: FinancialEvent,
        entity_type: &str,
        entity_id: &str,
        change: FinancialChange,
    ) -> Option<AuditLogEntry> {
        self.record(
            context,
            event.action(),
            entity_type,
            Some(entity_id),
            AuditDetails {
                old_value: change.old_value,
                new_value: change.new_value,
                reason: change.reason,
                metadata: Some(json!({ "amount": change.amount })),
                severity: Some(event.default_severity()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_kyc(
        &self,
        context: &AuditContext,
        event: KycEvent,
        customer_id: &str,
        change: KycChange,
    ) -> Option<AuditLogEntry> {
        self.record(
            context,
            event.action(),
            "Customer",
            Some(customer_id),
            AuditDetails {
                old_value: change.previous_status.map(|s| json!({ "status": s })),
                new_value: change.new_status.map(|s| json!({ "status": s })),
                reason: change.reason,
                metadata: Some(json!({ "documentType": change.document_type })),
                severity: Some(event.default_severity()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn log_restriction(
        &self,
        context: &AuditContext,
        event: RestrictionEvent,
        customer_id: &str,
        change: RestrictionChange,
    ) -> Option<AuditLogEntry> {
        self.record(
            context,
            event.action(),
            "Customer",
            Some(customer_id),
            AuditDetails {
                reason: Some(change.reason),
                metadata: Some(json!({
                    "restrictionType": change.restriction_type,
                    "durationDays": change.duration_days,
                })),
                severity: Some(AuditSeverity::Warning),
                ..Default::default()
            },
        )
        .await
    }

    /// Admin overrides are always CRITICAL.
    pub async fn log_admin_override(
        &self,
        context: &AuditContext,
        entity_type: &str,
        entity_id: &str,
        change: AdminOverride,
    ) -> Option<AuditLogEntry> {
        self.record(
            context,
            AuditAction::AdminOverride,
            entity_type,
            Some(entity_id),
            AuditDetails {
                old_value: change.old_value,
                new_value: change.new_value,
                reason: Some(change.reason),
                metadata: Some(json!({ "overrideType": change.override_type })),
                severity: Some(AuditSeverity::Critical),
                ..Default::default()
            },
        )
        .await
    }

    /// Entries matching `filter`, most recent first.
    pub async fn query(&self, filter: AuditLogFilter) -> IntegrityResult<Vec<AuditLogEntry>> {
        self.repo.query(filter).await
    }

    /// Full trail of one entity, most recent first.
    pub async fn history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> IntegrityResult<Vec<AuditLogEntry>> {
        self.repo.entity_history(entity_type, entity_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_severities() {
        assert_eq!(
            AuthEvent::LoginFailed.default_severity(),
            AuditSeverity::Warning
        );
        assert_eq!(AuthEvent::Login.default_severity(), AuditSeverity::Info);
        assert_eq!(
            FinancialEvent::WalletAdjustment.default_severity(),
            AuditSeverity::Warning
        );
        assert_eq!(
            FinancialEvent::EscrowRelease.default_severity(),
            AuditSeverity::Notice
        );
        assert_eq!(KycEvent::Reject.default_severity(), AuditSeverity::Notice);
        assert_eq!(KycEvent::Approve.default_severity(), AuditSeverity::Info);
    }
}
