//! Audit log domain model.
//!
//! Entries are append-only: nothing in the suite updates or deletes a
//! written entry. A correction is a new entry whose metadata references
//! the one it corrects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor id recorded for actions taken by the suite itself.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    // Authentication
    Login,
    Logout,
    LoginFailed,
    PasswordChange,
    PasswordReset,
    // Financial
    CreditLimitChange,
    CreditApproval,
    CreditHold,
    WalletDeposit,
    WalletWithdrawal,
    WalletAdjustment,
    EscrowDeposit,
    EscrowRelease,
    // KYC / verification
    KycSubmit,
    KycApprove,
    KycReject,
    VerificationChange,
    // Restrictions
    UserBan,
    UserUnban,
    AppealSubmitted,
    AppealReviewed,
    // Administration and detection
    AdminOverride,
    AnomalyFlagged,
    AlertResolved,
}

/// Triage level of an audit entry. Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    #[default]
    Info,
    Notice,
    Warning,
    Critical,
}

/// Who performed the audited action, and from where.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditContext {
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub actor_ip: Option<String>,
    pub actor_device: Option<String>,
}

impl AuditContext {
    pub fn actor(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            ..Default::default()
        }
    }

    pub fn system() -> Self {
        Self::actor(SYSTEM_ACTOR)
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.actor_ip = ip;
        self
    }

    /// Build a context from request headers.
    ///
    /// `header` looks up a header by lowercase name. The IP is the first
    /// hop of `x-forwarded-for`, falling back to `x-real-ip`.
    pub fn from_request_headers<'a>(
        header: impl Fn(&str) -> Option<&'a str>,
        actor_id: Option<String>,
        actor_email: Option<String>,
        actor_role: Option<String>,
    ) -> Self {
        let forwarded = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let actor_ip = forwarded
            .or_else(|| header("x-real-ip"))
            .map(str::to_string);

        Self {
            actor_id: actor_id.or_else(|| header("x-user-id").map(str::to_string)),
            actor_email,
            actor_role,
            actor_ip,
            actor_device: header("user-agent").map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub actor_ip: Option<String>,
    pub actor_device: Option<String>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub changes: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub severity: AuditSeverity,
    pub created_at: DateTime<Utc>,
}

/// Fields required to append an audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLogEntry {
    pub context: AuditContext,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub changes: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub severity: AuditSeverity,
}

/// Optional payload for [`CreateAuditLogEntry`]; everything defaults to
/// absent and severity defaults to INFO.
#[derive(Debug, Clone, Default)]
pub struct AuditDetails {
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub changes: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub severity: Option<AuditSeverity>,
}

/// Filters for audit log queries. Unset fields match everything.
#[derive(Debug, Clone)]
pub struct AuditLogFilter {
    pub actor_id: Option<String>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub severity: Option<AuditSeverity>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u64,
}

impl Default for AuditLogFilter {
    fn default() -> Self {
        Self {
            actor_id: None,
            action: None,
            entity_type: None,
            entity_id: None,
            severity: None,
            from: None,
            to: None,
            limit: 100,
        }
    }
}

impl AuditLogFilter {
    /// Whether an entry satisfies every set filter (limit aside).
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.actor_id
            .as_ref()
            .is_none_or(|a| entry.actor_id.as_ref() == Some(a))
            && self.action.is_none_or(|a| entry.action == a)
            && self
                .entity_type
                .as_ref()
                .is_none_or(|t| &entry.entity_type == t)
            && self
                .entity_id
                .as_ref()
                .is_none_or(|id| entry.entity_id.as_ref() == Some(id))
            && self.severity.is_none_or(|s| entry.severity == s)
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn context_prefers_first_forwarded_hop() {
        let headers: HashMap<&str, &str> = HashMap::from([
            ("x-forwarded-for", " 203.0.113.9 , 10.0.0.1"),
            ("x-real-ip", "10.0.0.2"),
            ("user-agent", "Mozilla/5.0"),
        ]);

        let ctx = AuditContext::from_request_headers(
            |name| headers.get(name).copied(),
            Some("user-1".into()),
            None,
            None,
        );

        assert_eq!(ctx.actor_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(ctx.actor_device.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(ctx.actor_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn context_falls_back_to_real_ip_and_user_header() {
        let headers: HashMap<&str, &str> =
            HashMap::from([("x-real-ip", "10.0.0.2"), ("x-user-id", "u-42")]);

        let ctx =
            AuditContext::from_request_headers(|name| headers.get(name).copied(), None, None, None);

        assert_eq!(ctx.actor_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(ctx.actor_id.as_deref(), Some("u-42"));
        assert!(ctx.actor_device.is_none());
    }

    #[test]
    fn severity_orders_by_risk() {
        assert!(AuditSeverity::Critical > AuditSeverity::Warning);
        assert!(AuditSeverity::Notice > AuditSeverity::Info);
    }
}
