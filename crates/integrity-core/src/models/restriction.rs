//! User restriction domain model.
//!
//! Restrictions are never deleted. Lifting, approving an appeal or
//! auto-expiry only deactivates the row, so the full sanction history
//! of a customer stays queryable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestrictionType {
    /// Complete account suspension.
    FullBan,
    /// No marketplace access, including bidding.
    MarketplaceBan,
    /// No wallet withdrawals.
    WalletHold,
    /// No use of credit.
    CreditFreeze,
    /// No posting of reviews.
    ReviewBan,
    /// No quote submission.
    BiddingBan,
    /// Under watch; blocks nothing on its own.
    Probation,
}

impl RestrictionType {
    pub const ALL: [RestrictionType; 7] = [
        RestrictionType::FullBan,
        RestrictionType::MarketplaceBan,
        RestrictionType::WalletHold,
        RestrictionType::CreditFreeze,
        RestrictionType::ReviewBan,
        RestrictionType::BiddingBan,
        RestrictionType::Probation,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealStatus {
    #[default]
    None,
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl AppealStatus {
    /// A customer may (re)appeal when no appeal is open or the last one
    /// was rejected.
    pub fn accepts_new_appeal(self) -> bool {
        matches!(self, AppealStatus::None | AppealStatus::Rejected)
    }

    pub fn is_open(self) -> bool {
        matches!(self, AppealStatus::Pending | AppealStatus::UnderReview)
    }
}

/// Privileged operations gated by restrictions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    AccessMarketplace,
    Withdraw,
    Bid,
    Review,
    UseCredit,
}

impl Capability {
    /// Restriction types that block this capability, in the order they
    /// are checked. The first match is the one reported.
    pub fn blocking_types(self) -> &'static [RestrictionType] {
        match self {
            Capability::AccessMarketplace => {
                &[RestrictionType::FullBan, RestrictionType::MarketplaceBan]
            }
            Capability::Withdraw => &[RestrictionType::FullBan, RestrictionType::WalletHold],
            Capability::Bid => &[
                RestrictionType::FullBan,
                RestrictionType::MarketplaceBan,
                RestrictionType::BiddingBan,
            ],
            Capability::Review => &[RestrictionType::FullBan, RestrictionType::ReviewBan],
            Capability::UseCredit => &[RestrictionType::FullBan, RestrictionType::CreditFreeze],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRestriction {
    pub id: Uuid,
    pub customer_id: String,
    pub restriction_type: RestrictionType,
    pub reason: String,
    pub evidence: Option<serde_json::Value>,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    /// `None` means permanent.
    pub end_date: Option<DateTime<Utc>>,
    pub imposed_by: String,
    pub imposed_by_name: Option<String>,
    pub lifted_at: Option<DateTime<Utc>>,
    pub lifted_by: Option<String>,
    pub lift_reason: Option<String>,
    pub appeal_status: AppealStatus,
    pub appeal_reason: Option<String>,
    pub appeal_reviewed_by: Option<String>,
    pub appeal_reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRestriction {
    /// Active and not past its end date.
    ///
    /// Re-validates the date rather than trusting `is_active`, so a
    /// restriction whose end date has passed stops blocking before the
    /// expiry sweep has run.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_date.is_none_or(|end| end > now)
    }

    /// Active but past its end date; waiting for the expiry sweep.
    pub fn is_due_for_expiry_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_date.is_some_and(|end| end <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRestriction {
    pub customer_id: String,
    pub restriction_type: RestrictionType,
    pub reason: String,
    pub evidence: Option<serde_json::Value>,
    pub imposed_by: String,
    pub imposed_by_name: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Deactivation stamp, written by a manual lift or the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftRestriction {
    pub lifted_by: Option<String>,
    pub lift_reason: String,
    pub lifted_at: DateTime<Utc>,
}

/// Appeal state change. `reason` is only set on submission; reviewer
/// fields only on review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppealUpdate {
    pub status: AppealStatus,
    pub reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Admin listing filter.
#[derive(Debug, Clone)]
pub struct RestrictionFilter {
    pub customer_id: Option<String>,
    /// Only restrictions effective at query time.
    pub effective_only: bool,
    pub limit: u64,
}

impl Default for RestrictionFilter {
    fn default() -> Self {
        Self {
            customer_id: None,
            effective_only: true,
            limit: 100,
        }
    }
}

/// The restriction that blocks an action, as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockingRestriction {
    pub restriction_id: Uuid,
    pub restriction_type: RestrictionType,
    pub reason: String,
    pub end_date: Option<DateTime<Utc>>,
    pub can_appeal: bool,
}

impl From<&UserRestriction> for BlockingRestriction {
    fn from(r: &UserRestriction) -> Self {
        Self {
            restriction_id: r.id,
            restriction_type: r.restriction_type,
            reason: r.reason.clone(),
            end_date: r.end_date,
            can_appeal: r.appeal_status.accepts_new_appeal(),
        }
    }
}

/// Result of checking one restriction type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestrictionCheck {
    pub is_restricted: bool,
    pub restriction: Option<BlockingRestriction>,
}

impl RestrictionCheck {
    pub fn clear() -> Self {
        Self {
            is_restricted: false,
            restriction: None,
        }
    }

    pub fn restricted(by: BlockingRestriction) -> Self {
        Self {
            is_restricted: true,
            restriction: Some(by),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.restriction.as_ref().map(|r| r.reason.as_str())
    }
}

/// Result of a capability predicate such as "can bid".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityCheck {
    pub capability: Capability,
    pub allowed: bool,
    pub restriction: Option<BlockingRestriction>,
}

impl CapabilityCheck {
    pub fn reason(&self) -> Option<&str> {
        self.restriction.as_ref().map(|r| r.reason.as_str())
    }
}

/// Account flags derived from the set of effective restrictions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountFlags {
    pub credit_hold: bool,
}

impl AccountFlags {
    pub fn derive<'a>(effective: impl IntoIterator<Item = &'a UserRestriction>) -> Self {
        let credit_hold = effective.into_iter().any(|r| {
            matches!(
                r.restriction_type,
                RestrictionType::CreditFreeze | RestrictionType::FullBan
            )
        });
        Self { credit_hold }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn restriction(kind: RestrictionType, end: Option<DateTime<Utc>>) -> UserRestriction {
        let now = Utc::now();
        UserRestriction {
            id: Uuid::new_v4(),
            customer_id: "c1".into(),
            restriction_type: kind,
            reason: "test".into(),
            evidence: None,
            is_active: true,
            start_date: now - Duration::days(10),
            end_date: end,
            imposed_by: "admin".into(),
            imposed_by_name: None,
            lifted_at: None,
            lifted_by: None,
            lift_reason: None,
            appeal_status: AppealStatus::None,
            appeal_reason: None,
            appeal_reviewed_by: None,
            appeal_reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn past_end_date_is_not_effective_even_when_active() {
        let now = Utc::now();
        let r = restriction(RestrictionType::WalletHold, Some(now - Duration::hours(1)));
        assert!(r.is_active);
        assert!(!r.is_effective_at(now));
        assert!(r.is_due_for_expiry_at(now));
    }

    #[test]
    fn permanent_restriction_stays_effective() {
        let r = restriction(RestrictionType::FullBan, None);
        assert!(r.is_effective_at(Utc::now() + Duration::days(3650)));
        assert!(!r.is_due_for_expiry_at(Utc::now()));
    }

    #[test]
    fn full_ban_blocks_every_capability_first() {
        for cap in [
            Capability::AccessMarketplace,
            Capability::Withdraw,
            Capability::Bid,
            Capability::Review,
            Capability::UseCredit,
        ] {
            assert_eq!(cap.blocking_types()[0], RestrictionType::FullBan);
        }
        assert!(!Capability::Bid
            .blocking_types()
            .contains(&RestrictionType::ReviewBan));
    }

    #[test]
    fn credit_hold_follows_freeze_or_full_ban() {
        let freeze = restriction(RestrictionType::CreditFreeze, None);
        let review = restriction(RestrictionType::ReviewBan, None);
        assert!(AccountFlags::derive([&freeze]).credit_hold);
        assert!(!AccountFlags::derive([&review]).credit_hold);
        assert!(!AccountFlags::derive(std::iter::empty()).credit_hold);
    }
}
