//! Read-only views of marketplace activity owned by other parts of the
//! application (wallet ledger, contractor reviews, project quotes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletTransactionKind {
    Deposit,
    Withdrawal,
    Payment,
    Refund,
    Adjustment,
}

/// One wallet ledger row. Withdrawals are usually stored with a
/// negative amount; detectors use the absolute value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletTransaction {
    pub kind: WalletTransactionKind,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// A quote submitted for a construction project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectQuote {
    pub contractor_id: String,
    pub ip_address: Option<String>,
    pub amount: i64,
}
