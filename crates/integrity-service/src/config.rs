//! Detection thresholds.

use serde::{Deserialize, Serialize};

/// Thresholds and fixed scores used by the anomaly detectors.
///
/// Every field has a default, so partial configuration files only need
/// to name the values they change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Distinct other accounts on one IP that trigger a multi-account
    /// alert (default: 3).
    pub multi_account_threshold: usize,
    /// How far back device sessions count towards multi-account
    /// detection (default: 30 days).
    pub multi_account_lookback_days: i64,
    /// Linked accounts at which a multi-account alert becomes HIGH
    /// (default: 5).
    pub multi_account_high_severity_links: usize,
    /// Withdrawals in the window that trigger an alert (default: 5).
    pub rapid_withdrawal_count: usize,
    /// Withdrawn total in the window that triggers an alert
    /// (default: 50,000,000). Twice this escalates to CRITICAL.
    pub rapid_withdrawal_amount: i64,
    pub rapid_withdrawal_window_hours: i64,
    pub collusion_risk_score: u8,
    /// Relative distance from the median that counts as "the same
    /// price" (default: 0.05).
    pub price_manipulation_tolerance: f64,
    /// Quotes needed both to run the check and to form a cluster
    /// (default: 3).
    pub price_manipulation_min_cluster: usize,
    pub price_manipulation_risk_score: u8,
    pub self_review_risk_score: u8,
    /// Reviews received in the window that count as review bombing
    /// (default: 10).
    pub review_bombing_threshold: u64,
    pub review_bombing_window_hours: i64,
    pub review_bombing_risk_score: u8,
    /// Page size of the pending-alert queue when the caller gives none.
    pub pending_alert_limit: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            multi_account_threshold: 3,
            multi_account_lookback_days: 30,
            multi_account_high_severity_links: 5,
            rapid_withdrawal_count: 5,
            rapid_withdrawal_amount: 50_000_000,
            rapid_withdrawal_window_hours: 24,
            collusion_risk_score: 70,
            price_manipulation_tolerance: 0.05,
            price_manipulation_min_cluster: 3,
            price_manipulation_risk_score: 50,
            self_review_risk_score: 80,
            review_bombing_threshold: 10,
            review_bombing_window_hours: 24,
            review_bombing_risk_score: 60,
            pending_alert_limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: DetectionConfig =
            serde_json::from_value(serde_json::json!({ "rapid_withdrawal_count": 8 })).unwrap();
        assert_eq!(config.rapid_withdrawal_count, 8);
        assert_eq!(config.multi_account_threshold, 3);
        assert_eq!(config.rapid_withdrawal_amount, 50_000_000);
    }
}
