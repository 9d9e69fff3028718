//! Detector rules as pure functions of already-fetched history.
//!
//! Each function decides whether its rule fires and, if so, builds the
//! alert to store. Fetching history and persisting alerts is the
//! engine's job.

use std::collections::{BTreeMap, BTreeSet};

use integrity_core::models::alert::{AlertSeverity, CreateAlert, RiskScore, SuspiciousActivityType};
use integrity_core::models::device::{ActivityContext, DeviceSession};
use integrity_core::models::history::{ProjectQuote, WalletTransaction, WalletTransactionKind};
use serde_json::json;

use crate::config::DetectionConfig;

const PROJECT_ENTITY: &str = "ConstructionProject";
const CONTRACTOR_ENTITY: &str = "ContractorProfile";

/// Distinct other accounts seen on the context's IP.
///
/// `sessions` are the sessions active on that IP inside the lookback
/// window. Both the latest identity and every earlier linked identity of
/// each session count.
pub fn multi_account(
    config: &DetectionConfig,
    context: &ActivityContext,
    sessions: &[DeviceSession],
) -> Option<CreateAlert> {
    let ip_address = context.ip_address.as_deref()?;
    let current = context.user_id.as_deref();

    let others: BTreeSet<&str> = sessions
        .iter()
        .flat_map(|s| s.user_id.iter().chain(s.linked_user_ids.iter()))
        .map(String::as_str)
        .filter(|id| Some(*id) != current)
        .collect();

    if others.len() < config.multi_account_threshold {
        return None;
    }

    let linked: Vec<String> = others.iter().map(|id| id.to_string()).collect();
    let extra = i64::try_from(linked.len()).unwrap_or(i64::MAX);
    let severity = if linked.len() >= config.multi_account_high_severity_links {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    };

    Some(CreateAlert {
        context: context.clone(),
        activity_type: SuspiciousActivityType::MultiAccount,
        description: format!(
            "{} distinct accounts seen from IP {ip_address}",
            linked.len() + 1
        ),
        evidence: json!({ "linkedUserIds": linked, "ipAddress": ip_address }),
        related_entity_type: None,
        related_entity_id: None,
        linked_user_ids: linked,
        linked_ips: vec![ip_address.to_string()],
        risk_score: RiskScore::clamped(extra.saturating_mul(15).saturating_add(30)),
        severity,
    })
}

/// Withdrawal velocity of one wallet over the trailing window.
///
/// Amounts are compared by absolute value since ledgers usually store
/// withdrawals as negative amounts.
pub fn rapid_withdrawals(
    config: &DetectionConfig,
    customer_id: &str,
    transactions: &[WalletTransaction],
) -> Option<CreateAlert> {
    let withdrawals: Vec<&WalletTransaction> = transactions
        .iter()
        .filter(|t| t.kind == WalletTransactionKind::Withdrawal)
        .collect();
    let count = withdrawals.len();
    let total = withdrawals
        .iter()
        .fold(0i64, |sum, t| sum.saturating_add(t.amount.saturating_abs()));

    if count < config.rapid_withdrawal_count && total < config.rapid_withdrawal_amount {
        return None;
    }

    let severity = if total >= config.rapid_withdrawal_amount.saturating_mul(2) {
        AlertSeverity::Critical
    } else {
        AlertSeverity::High
    };
    let count_i64 = i64::try_from(count).unwrap_or(i64::MAX);
    let raw_score = count_i64
        .saturating_mul(5)
        .saturating_add(40)
        .saturating_add(total / 1_000_000);

    Some(CreateAlert {
        context: ActivityContext {
            customer_id: Some(customer_id.to_string()),
            ..Default::default()
        },
        activity_type: SuspiciousActivityType::RapidWithdrawals,
        description: format!(
            "{count} withdrawals totalling {total} in {}h",
            config.rapid_withdrawal_window_hours
        ),
        evidence: json!({
            "withdrawalCount": count,
            "totalAmount": total,
            "periodHours": config.rapid_withdrawal_window_hours,
        }),
        related_entity_type: None,
        related_entity_id: None,
        linked_user_ids: Vec::new(),
        linked_ips: Vec::new(),
        risk_score: RiskScore::clamped(raw_score),
        severity,
    })
}

/// Quotes on one project submitted by different contractors from the
/// same IP.
pub fn collusion_bidding(
    config: &DetectionConfig,
    project_id: &str,
    quotes: &[ProjectQuote],
) -> Option<CreateAlert> {
    let mut by_ip: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for quote in quotes {
        if let Some(ip) = quote.ip_address.as_deref() {
            let contractors = by_ip.entry(ip).or_default();
            if !contractors.contains(&quote.contractor_id.as_str()) {
                contractors.push(&quote.contractor_id);
            }
        }
    }
    by_ip.retain(|_, contractors| contractors.len() > 1);
    if by_ip.is_empty() {
        return None;
    }

    let mut linked_contractors: Vec<String> = Vec::new();
    for contractor in by_ip.values().flatten() {
        if !linked_contractors.iter().any(|c| c == contractor) {
            linked_contractors.push(contractor.to_string());
        }
    }
    let linked_ips: Vec<String> = by_ip.keys().map(|ip| ip.to_string()).collect();
    let quoted: Vec<serde_json::Value> = quotes
        .iter()
        .map(|q| json!({ "contractorId": q.contractor_id, "amount": q.amount }))
        .collect();

    Some(CreateAlert {
        context: ActivityContext::default(),
        activity_type: SuspiciousActivityType::CollusionBidding,
        description: format!(
            "{} contractors quoted from shared IPs on project {project_id}",
            linked_contractors.len()
        ),
        evidence: json!({
            "projectId": project_id,
            "suspiciousIps": by_ip,
            "quotes": quoted,
        }),
        related_entity_type: Some(PROJECT_ENTITY.into()),
        related_entity_id: Some(project_id.to_string()),
        linked_user_ids: linked_contractors,
        linked_ips,
        risk_score: RiskScore::clamped(i64::from(config.collusion_risk_score)),
        severity: AlertSeverity::High,
    })
}

/// Quotes clustered suspiciously tightly around their median.
///
/// The median is the upper middle element for an even count. A
/// non-positive median disables the check.
pub fn price_manipulation(
    config: &DetectionConfig,
    project_id: &str,
    quotes: &[ProjectQuote],
) -> Option<CreateAlert> {
    if quotes.len() < config.price_manipulation_min_cluster {
        return None;
    }

    let mut amounts: Vec<i64> = quotes.iter().map(|q| q.amount).collect();
    amounts.sort_unstable();
    let median = amounts[amounts.len() / 2];
    if median <= 0 {
        return None;
    }

    let similar: Vec<i64> = amounts
        .iter()
        .copied()
        .filter(|a| {
            a.abs_diff(median) as f64 / (median as f64) < config.price_manipulation_tolerance
        })
        .collect();
    if similar.len() < config.price_manipulation_min_cluster {
        return None;
    }

    Some(CreateAlert {
        context: ActivityContext::default(),
        activity_type: SuspiciousActivityType::PriceManipulation,
        description: format!(
            "{} quotes within {:.0}% of the median price",
            similar.len(),
            config.price_manipulation_tolerance * 100.0
        ),
        evidence: json!({
            "projectId": project_id,
            "similarPrices": similar,
            "medianPrice": median,
        }),
        related_entity_type: Some(PROJECT_ENTITY.into()),
        related_entity_id: Some(project_id.to_string()),
        linked_user_ids: Vec::new(),
        linked_ips: Vec::new(),
        risk_score: RiskScore::clamped(i64::from(config.price_manipulation_risk_score)),
        severity: AlertSeverity::Medium,
    })
}

/// A review posted from an IP the reviewed contractor has used.
pub fn self_review(
    config: &DetectionConfig,
    contractor_id: &str,
    reviewer_id: &str,
    reviewer_ip: &str,
) -> CreateAlert {
    CreateAlert {
        context: ActivityContext {
            customer_id: Some(reviewer_id.to_string()),
            ip_address: Some(reviewer_ip.to_string()),
            ..Default::default()
        },
        activity_type: SuspiciousActivityType::FakeReviews,
        description: "review posted from an IP shared with the contractor, probable self-review"
            .into(),
        evidence: json!({
            "contractorId": contractor_id,
            "reviewerId": reviewer_id,
            "sharedIp": reviewer_ip,
        }),
        related_entity_type: Some(CONTRACTOR_ENTITY.into()),
        related_entity_id: Some(contractor_id.to_string()),
        linked_user_ids: vec![reviewer_id.to_string(), contractor_id.to_string()],
        linked_ips: vec![reviewer_ip.to_string()],
        risk_score: RiskScore::clamped(i64::from(config.self_review_risk_score)),
        severity: AlertSeverity::High,
    }
}

/// A burst of reviews received by one contractor.
pub fn review_bombing(
    config: &DetectionConfig,
    contractor_id: &str,
    received: u64,
) -> Option<CreateAlert> {
    if received < config.review_bombing_threshold {
        return None;
    }

    Some(CreateAlert {
        context: ActivityContext::default(),
        activity_type: SuspiciousActivityType::FakeReviews,
        description: format!(
            "{received} reviews in {}h, possible review bombing",
            config.review_bombing_window_hours
        ),
        evidence: json!({ "contractorId": contractor_id, "reviewCount": received }),
        related_entity_type: Some(CONTRACTOR_ENTITY.into()),
        related_entity_id: Some(contractor_id.to_string()),
        linked_user_ids: Vec::new(),
        linked_ips: Vec::new(),
        risk_score: RiskScore::clamped(i64::from(config.review_bombing_risk_score)),
        severity: AlertSeverity::Medium,
    })
}
