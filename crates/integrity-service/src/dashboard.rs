//! Admin overview of the integrity state.

use chrono::{DateTime, Duration, Utc};
use integrity_core::error::IntegrityResult;
use integrity_core::models::alert::AlertSeverity;
use integrity_core::models::restriction::RestrictionType;
use integrity_core::repository::{AlertRepository, AuditLogRepository, RestrictionRepository};
use serde::Serialize;

/// Counts shown on the integrity dashboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityOverview {
    /// OPEN and INVESTIGATING alerts.
    pub open_alerts: u64,
    pub effective_restrictions: u64,
    /// Audit entries written in the trailing 24 hours.
    pub recent_audit_entries: u64,
    /// Pending alerts, most severe first.
    pub alerts_by_severity: Vec<(AlertSeverity, u64)>,
    pub restrictions_by_type: Vec<(RestrictionType, u64)>,
    pub generated_at: DateTime<Utc>,
}

pub struct IntegrityDashboard<L, A, R>
where
    L: AuditLogRepository,
    A: AlertRepository,
    R: RestrictionRepository,
{
    audit: L,
    alerts: A,
    restrictions: R,
}

impl<L, A, R> IntegrityDashboard<L, A, R>
where
    L: AuditLogRepository,
    A: AlertRepository,
    R: RestrictionRepository,
{
    pub fn new(audit: L, alerts: A, restrictions: R) -> Self {
        Self {
            audit,
            alerts,
            restrictions,
        }
    }

    pub async fn overview(&self) -> IntegrityResult<IntegrityOverview> {
        let now = Utc::now();
        let alerts_by_severity = self.alerts.count_pending_by_severity().await?;
        let restrictions_by_type = self.restrictions.count_effective_by_type(now).await?;
        let recent_audit_entries = self.audit.count_since(now - Duration::hours(24)).await?;

        Ok(IntegrityOverview {
            open_alerts: alerts_by_severity.iter().map(|(_, n)| n).sum(),
            effective_restrictions: restrictions_by_type.iter().map(|(_, n)| n).sum(),
            recent_audit_entries,
            alerts_by_severity,
            restrictions_by_type,
            generated_at: now,
        })
    }
}
