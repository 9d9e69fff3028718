//! Suspicious activity alert domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::device::ActivityContext;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspiciousActivityType {
    MultiAccount,
    RapidWithdrawals,
    CollusionBidding,
    PriceManipulation,
    FakeReviews,
}

/// Alert severity. Ordered from least to most severe so that sorting
/// descending puts the most urgent alerts first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Numeric rank used for ordering in storage.
    pub fn rank(self) -> u8 {
        match self {
            AlertSeverity::Low => 1,
            AlertSeverity::Medium => 2,
            AlertSeverity::High => 3,
            AlertSeverity::Critical => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn is_pending(self) -> bool {
        matches!(self, AlertStatus::Open | AlertStatus::Investigating)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_pending()
    }

    /// Forward-only transitions: OPEN -> INVESTIGATING, and any pending
    /// status -> RESOLVED / DISMISSED.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        match (self, next) {
            (AlertStatus::Open, AlertStatus::Investigating) => true,
            (from, AlertStatus::Resolved | AlertStatus::Dismissed) => from.is_pending(),
            _ => false,
        }
    }
}

/// Detector confidence used for triage, always within 0..=100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct RiskScore(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("risk score {0} is outside 0..=100")]
pub struct RiskScoreOutOfRange(pub u8);

impl TryFrom<u8> for RiskScore {
    type Error = RiskScoreOutOfRange;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        if raw > Self::MAX.0 {
            return Err(RiskScoreOutOfRange(raw));
        }
        Ok(Self(raw))
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> Self {
        score.0
    }
}

impl RiskScore {
    pub const MAX: RiskScore = RiskScore(100);

    /// Clamp an arbitrary score into range.
    pub fn clamped(raw: i64) -> Self {
        Self(raw.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspiciousActivityAlert {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub activity_type: SuspiciousActivityType,
    pub description: String,
    pub evidence: serde_json::Value,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
    pub linked_user_ids: Vec<String>,
    pub linked_ips: Vec<String>,
    pub risk_score: RiskScore,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A detector finding, before it is persisted. Alerts are always
/// created OPEN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateAlert {
    pub context: ActivityContext,
    pub activity_type: SuspiciousActivityType,
    pub description: String,
    pub evidence: serde_json::Value,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
    pub linked_user_ids: Vec<String>,
    pub linked_ips: Vec<String>,
    pub risk_score: RiskScore,
    pub severity: AlertSeverity,
}

/// Status change applied by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatusUpdate {
    pub status: AlertStatus,
    pub resolved_by: Option<String>,
    pub resolution: Option<String>,
    pub at: DateTime<Utc>,
}

/// Filters for the pending-alert queue.
#[derive(Debug, Clone)]
pub struct AlertFilter {
    pub severity: Option<AlertSeverity>,
    pub activity_type: Option<SuspiciousActivityType>,
    pub limit: u64,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            severity: None,
            activity_type: None,
            limit: 50,
        }
    }
}

impl AlertFilter {
    pub fn matches(&self, alert: &SuspiciousActivityAlert) -> bool {
        alert.status.is_pending()
            && self.severity.is_none_or(|s| alert.severity == s)
            && self.activity_type.is_none_or(|t| alert.activity_type == t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_score_is_clamped() {
        assert_eq!(RiskScore::clamped(250).value(), 100);
        assert_eq!(RiskScore::clamped(-3).value(), 0);
        assert_eq!(RiskScore::clamped(75).value(), 75);
    }

    #[test]
    fn risk_score_deserialization_enforces_range() {
        let score: RiskScore = serde_json::from_str("75").unwrap();
        assert_eq!(score.value(), 75);
        assert_eq!(serde_json::to_string(&score).unwrap(), "75");
        assert_eq!(serde_json::from_str::<RiskScore>("100").unwrap(), RiskScore::MAX);

        assert!(serde_json::from_str::<RiskScore>("101").is_err());
        assert!(serde_json::from_str::<RiskScore>("200").is_err());
        assert!(serde_json::from_str::<RiskScore>("-1").is_err());
        assert_eq!(RiskScore::try_from(150), Err(RiskScoreOutOfRange(150)));
    }

    #[test]
    fn status_never_moves_backward() {
        assert!(AlertStatus::Open.can_transition_to(AlertStatus::Investigating));
        assert!(AlertStatus::Investigating.can_transition_to(AlertStatus::Dismissed));
        assert!(!AlertStatus::Investigating.can_transition_to(AlertStatus::Open));
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Dismissed));
        assert!(!AlertStatus::Dismissed.can_transition_to(AlertStatus::Investigating));
    }
}
