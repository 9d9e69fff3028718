//! Anomaly detection engine.
//!
//! Detection is advisory: `detect_*` methods never return an error.
//! History lookups and alert writes that fail are reported through
//! [`InstrumentationStats`] and the detector simply yields nothing, so
//! the withdrawal, bid or review being observed proceeds regardless.

pub mod detectors;

use std::sync::Arc;

use chrono::{Duration, Utc};
use integrity_core::error::IntegrityResult;
use integrity_core::models::alert::{
    AlertFilter, AlertSeverity, AlertStatus, AlertStatusUpdate, CreateAlert,
    SuspiciousActivityAlert, SuspiciousActivityType,
};
use integrity_core::models::audit::{AuditAction, AuditContext, AuditDetails, AuditSeverity};
use integrity_core::models::device::ActivityContext;
use integrity_core::models::history::ProjectQuote;
use integrity_core::repository::{
    AlertRepository, AuditLogRepository, DeviceSessionRepository, ReviewHistory, WalletHistory,
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::config::DetectionConfig;
use crate::error::PolicyError;
use crate::report::{InstrumentationStats, SideEffect};

const ALERT_ENTITY: &str = "SuspiciousActivity";

/// Runs the detectors against recent history and manages the alert
/// queue.
pub struct DetectionEngine<L, D, A, W, V>
where
    L: AuditLogRepository,
    D: DeviceSessionRepository,
    A: AlertRepository,
    W: WalletHistory,
    V: ReviewHistory,
{
    audit: AuditTrail<L>,
    sessions: D,
    alerts: A,
    wallets: W,
    reviews: V,
    config: DetectionConfig,
}

impl<L, D, A, W, V> DetectionEngine<L, D, A, W, V>
where
    L: AuditLogRepository,
    D: DeviceSessionRepository,
    A: AlertRepository,
    W: WalletHistory,
    V: ReviewHistory,
{
    pub fn new(
        audit: AuditTrail<L>,
        sessions: D,
        alerts: A,
        wallets: W,
        reviews: V,
        config: DetectionConfig,
    ) -> Self {
        Self {
            audit,
            sessions,
            alerts,
            wallets,
            reviews,
            config,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    fn stats(&self) -> &Arc<InstrumentationStats> {
        self.audit.stats()
    }

    /// Store an alert and audit the detection.
    async fn raise(&self, input: CreateAlert) -> Option<SuspiciousActivityAlert> {
        let alert = self
            .stats()
            .fire(SideEffect::AlertWrite, self.alerts.create(input).await)?;

        warn!(
            alert_id = %alert.id,
            activity_type = ?alert.activity_type,
            severity = ?alert.severity,
            risk_score = alert.risk_score.value(),
            "anomaly detected: {}",
            alert.description
        );

        let severity = match alert.severity {
            AlertSeverity::Critical => AuditSeverity::Critical,
            AlertSeverity::Low | AlertSeverity::Medium | AlertSeverity::High => {
                AuditSeverity::Warning
            }
        };
        self.audit
            .record(
                &AuditContext::system(),
                AuditAction::AnomalyFlagged,
                ALERT_ENTITY,
                Some(&alert.id.to_string()),
                AuditDetails {
                    metadata: Some(json!({
                        "type": alert.activity_type,
                        "description": alert.description,
                        "riskScore": alert.risk_score,
                    })),
                    severity: Some(severity),
                    ..Default::default()
                },
            )
            .await;

        Some(alert)
    }

    async fn raise_all(&self, inputs: Vec<CreateAlert>) -> Vec<SuspiciousActivityAlert> {
        let mut raised = Vec::with_capacity(inputs.len());
        for input in inputs {
            if let Some(alert) = self.raise(input).await {
                raised.push(alert);
            }
        }
        raised
    }

    /// Flag an IP shared by too many distinct accounts.
    pub async fn detect_multi_account(
        &self,
        context: &ActivityContext,
    ) -> Option<SuspiciousActivityAlert> {
        let ip_address = context.ip_address.as_deref()?;
        let since = Utc::now() - Duration::days(self.config.multi_account_lookback_days);
        let sessions = self.stats().fire(
            SideEffect::Detector,
            self.sessions.list_by_ip_since(ip_address, since).await,
        )?;

        let input = detectors::multi_account(&self.config, context, &sessions)?;
        self.raise(input).await
    }

    /// Flag a burst of withdrawals from one wallet.
    pub async fn detect_rapid_withdrawals(
        &self,
        customer_id: &str,
    ) -> Option<SuspiciousActivityAlert> {
        let since = Utc::now() - Duration::hours(self.config.rapid_withdrawal_window_hours);
        let transactions = self.stats().fire(
            SideEffect::Detector,
            self.wallets.transactions_since(customer_id, since).await,
        )?;

        let input = detectors::rapid_withdrawals(&self.config, customer_id, &transactions)?;
        self.raise(input).await
    }

    /// Check every quote of one project for shared IPs and for prices
    /// clustered around the median. The two checks are independent.
    pub async fn detect_collusion_bidding(
        &self,
        project_id: &str,
        quotes: &[ProjectQuote],
    ) -> Vec<SuspiciousActivityAlert> {
        let inputs = [
            detectors::collusion_bidding(&self.config, project_id, quotes),
            detectors::price_manipulation(&self.config, project_id, quotes),
        ];
        self.raise_all(inputs.into_iter().flatten().collect()).await
    }

    /// Check a new review for self-review (shared IP history with the
    /// contractor) and for review bombing. The two checks are
    /// independent.
    pub async fn detect_fake_reviews(
        &self,
        contractor_id: &str,
        reviewer_id: &str,
        reviewer_ip: Option<&str>,
    ) -> Vec<SuspiciousActivityAlert> {
        let mut inputs = Vec::new();

        if let Some(ip) = reviewer_ip {
            let shared = self.stats().fire(
                SideEffect::Detector,
                self.sessions.customer_seen_from_ip(contractor_id, ip).await,
            );
            if shared == Some(true) {
                inputs.push(detectors::self_review(
                    &self.config,
                    contractor_id,
                    reviewer_id,
                    ip,
                ));
            }
        }

        let since = Utc::now() - Duration::hours(self.config.review_bombing_window_hours);
        let received = self.stats().fire(
            SideEffect::Detector,
            self.reviews.count_received_since(contractor_id, since).await,
        );
        if let Some(input) =
            received.and_then(|count| detectors::review_bombing(&self.config, contractor_id, count))
        {
            inputs.push(input);
        }

        self.raise_all(inputs).await
    }

    /// Open and investigating alerts, most severe first, then most
    /// recent.
    pub async fn pending_alerts(
        &self,
        severity: Option<AlertSeverity>,
        activity_type: Option<SuspiciousActivityType>,
        limit: Option<u64>,
    ) -> IntegrityResult<Vec<SuspiciousActivityAlert>> {
        self.alerts
            .list_pending(AlertFilter {
                severity,
                activity_type,
                limit: limit.unwrap_or(self.config.pending_alert_limit),
            })
            .await
    }

    /// Move an open alert to INVESTIGATING.
    pub async fn start_investigation(
        &self,
        alert_id: Uuid,
        investigator: &str,
    ) -> IntegrityResult<SuspiciousActivityAlert> {
        let alert = self.alerts.get_by_id(alert_id).await?;
        if !alert.status.can_transition_to(AlertStatus::Investigating) {
            return Err(PolicyError::AlertTransition {
                id: alert_id,
                from: alert.status,
                to: AlertStatus::Investigating,
            }
            .into());
        }

        let updated = self
            .alerts
            .update_status(
                alert_id,
                AlertStatusUpdate {
                    status: AlertStatus::Investigating,
                    resolved_by: None,
                    resolution: None,
                    at: Utc::now(),
                },
            )
            .await?;
        info!(%alert_id, investigator, "alert under investigation");
        Ok(updated)
    }

    /// Close a pending alert as RESOLVED or DISMISSED.
    pub async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolved_by: &str,
        resolution: &str,
        status: AlertStatus,
    ) -> IntegrityResult<SuspiciousActivityAlert> {
        if !status.is_terminal() {
            return Err(PolicyError::InvalidResolutionStatus(status).into());
        }

        let alert = self.alerts.get_by_id(alert_id).await?;
        if !alert.status.can_transition_to(status) {
            return Err(PolicyError::AlertClosed {
                id: alert_id,
                status: alert.status,
            }
            .into());
        }

        let resolved = self
            .alerts
            .update_status(
                alert_id,
                AlertStatusUpdate {
                    status,
                    resolved_by: Some(resolved_by.to_string()),
                    resolution: Some(resolution.to_string()),
                    at: Utc::now(),
                },
            )
            .await?;

        info!(%alert_id, resolved_by, status = ?status, "alert closed");
        self.audit
            .record(
                &AuditContext::actor(resolved_by),
                AuditAction::AlertResolved,
                ALERT_ENTITY,
                Some(&alert_id.to_string()),
                AuditDetails {
                    old_value: Some(json!({ "status": alert.status })),
                    new_value: Some(json!({ "status": status })),
                    reason: Some(resolution.to_string()),
                    severity: Some(AuditSeverity::Notice),
                    ..Default::default()
                },
            )
            .await;

        Ok(resolved)
    }
}
