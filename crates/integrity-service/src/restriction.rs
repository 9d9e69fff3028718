//! Restriction enforcement and appeals.
//!
//! A restriction row moves `active -> inactive` exactly once, through a
//! manual lift, an approved appeal or the expiry sweep. Rows are never
//! deleted. Capability checks re-validate the end date, so a lapsed
//! restriction stops blocking before the sweep has caught up with it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use integrity_core::error::IntegrityResult;
use integrity_core::models::audit::{AuditAction, AuditContext, AuditDetails, AuditSeverity};
use integrity_core::models::restriction::{
    AccountFlags, AppealStatus, AppealUpdate, BlockingRestriction, Capability, CapabilityCheck,
    CreateRestriction, LiftRestriction, RestrictionCheck, RestrictionFilter, RestrictionType,
    UserRestriction,
};
use integrity_core::repository::{
    AccountFlagRepository, AuditLogRepository, RestrictionRepository,
};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditTrail, RestrictionChange, RestrictionEvent};
use crate::error::PolicyError;
use crate::report::{InstrumentationStats, SideEffect};

const RESTRICTION_ENTITY: &str = "UserRestriction";

/// Lift reason stamped by the expiry sweep.
pub const AUTO_EXPIRED: &str = "auto-expired";

/// Input for [`RestrictionService::apply`].
#[derive(Debug, Clone)]
pub struct ApplyRestriction {
    pub reason: String,
    pub evidence: Option<serde_json::Value>,
    pub imposed_by: String,
    pub imposed_by_name: Option<String>,
    /// `None` imposes a permanent restriction.
    pub duration_days: Option<u32>,
    pub actor_ip: Option<String>,
}

/// Maintains the authoritative set of restrictions per customer.
pub struct RestrictionService<R, L, F>
where
    R: RestrictionRepository,
    L: AuditLogRepository,
    F: AccountFlagRepository,
{
    restrictions: R,
    audit: AuditTrail<L>,
    flags: F,
}

impl<R, L, F> RestrictionService<R, L, F>
where
    R: RestrictionRepository,
    L: AuditLogRepository,
    F: AccountFlagRepository,
{
    pub fn new(restrictions: R, audit: AuditTrail<L>, flags: F) -> Self {
        Self {
            restrictions,
            audit,
            flags,
        }
    }

    /// Failure counters of this service's best-effort side effects.
    pub fn stats(&self) -> &Arc<InstrumentationStats> {
        self.audit.stats()
    }

    /// Impose a restriction on a customer.
    pub async fn apply(
        &self,
        customer_id: &str,
        restriction_type: RestrictionType,
        input: ApplyRestriction,
    ) -> IntegrityResult<UserRestriction> {
        if customer_id.trim().is_empty() {
            return Err(PolicyError::EmptyField {
                field: "customer_id",
            }
            .into());
        }
        if input.reason.trim().is_empty() {
            return Err(PolicyError::EmptyField { field: "reason" }.into());
        }
        if input.imposed_by.trim().is_empty() {
            return Err(PolicyError::EmptyField {
                field: "imposed_by",
            }
            .into());
        }
        if input.duration_days == Some(0) {
            return Err(PolicyError::ZeroDuration.into());
        }

        let start_date = Utc::now();
        let end_date = match input.duration_days {
            Some(days) => Some(
                start_date
                    .checked_add_signed(Duration::days(i64::from(days)))
                    .ok_or(PolicyError::DurationOutOfRange(days))?,
            ),
            None => None,
        };

        let restriction = self
            .restrictions
            .create(CreateRestriction {
                customer_id: customer_id.to_string(),
                restriction_type,
                reason: input.reason.clone(),
                evidence: input.evidence,
                imposed_by: input.imposed_by.clone(),
                imposed_by_name: input.imposed_by_name,
                start_date,
                end_date,
            })
            .await?;

        info!(
            restriction_id = %restriction.id,
            customer_id,
            restriction_type = ?restriction_type,
            duration_days = ?input.duration_days,
            "restriction applied"
        );

        self.audit
            .log_restriction(
                &AuditContext::actor(input.imposed_by).with_ip(input.actor_ip),
                RestrictionEvent::Imposed,
                customer_id,
                RestrictionChange {
                    restriction_type,
                    reason: input.reason,
                    duration_days: input.duration_days,
                },
            )
            .await;
        self.refresh_flags(customer_id).await;

        Ok(restriction)
    }

    /// Deactivate a restriction by hand.
    pub async fn lift(
        &self,
        restriction_id: Uuid,
        lifted_by: &str,
        reason: &str,
    ) -> IntegrityResult<UserRestriction> {
        let restriction = self.restrictions.get_by_id(restriction_id).await?;
        if !restriction.is_active {
            return Err(PolicyError::RestrictionInactive(restriction_id).into());
        }

        // A concurrent lift or sweep may win between the read and the write.
        let lifted = self
            .restrictions
            .deactivate(
                restriction_id,
                LiftRestriction {
                    lifted_by: Some(lifted_by.to_string()),
                    lift_reason: reason.to_string(),
                    lifted_at: Utc::now(),
                },
            )
            .await?
            .ok_or(PolicyError::RestrictionInactive(restriction_id))?;

        info!(
            %restriction_id,
            customer_id = %lifted.customer_id,
            lifted_by,
            "restriction lifted"
        );

        self.audit
            .log_restriction(
                &AuditContext::actor(lifted_by),
                RestrictionEvent::Lifted,
                &lifted.customer_id,
                RestrictionChange {
                    restriction_type: lifted.restriction_type,
                    reason: reason.to_string(),
                    duration_days: None,
                },
            )
            .await;
        self.refresh_flags(&lifted.customer_id).await;

        Ok(lifted)
    }

    /// Whether an effective restriction of exactly this type exists.
    /// The most recently created one is reported.
    pub async fn check_restriction(
        &self,
        customer_id: &str,
        restriction_type: RestrictionType,
    ) -> IntegrityResult<RestrictionCheck> {
        let now = Utc::now();
        let effective = self.restrictions.list_effective(customer_id, now).await?;
        Ok(effective
            .iter()
            .find(|r| r.restriction_type == restriction_type && r.is_effective_at(now))
            .map_or_else(RestrictionCheck::clear, |r| {
                RestrictionCheck::restricted(BlockingRestriction::from(r))
            }))
    }

    /// [`check_restriction`](Self::check_restriction) for several types
    /// with a single lookup. Results follow the order of `types`.
    pub async fn check_restrictions(
        &self,
        customer_id: &str,
        types: &[RestrictionType],
    ) -> IntegrityResult<Vec<(RestrictionType, RestrictionCheck)>> {
        let now = Utc::now();
        let effective = self.restrictions.list_effective(customer_id, now).await?;
        Ok(types
            .iter()
            .map(|&kind| {
                let check = effective
                    .iter()
                    .find(|r| r.restriction_type == kind && r.is_effective_at(now))
                    .map_or_else(RestrictionCheck::clear, |r| {
                        RestrictionCheck::restricted(BlockingRestriction::from(r))
                    });
                (kind, check)
            })
            .collect())
    }

    /// Every restriction of the customer currently in force.
    pub async fn active_restrictions(
        &self,
        customer_id: &str,
    ) -> IntegrityResult<Vec<UserRestriction>> {
        let now = Utc::now();
        let mut effective = self.restrictions.list_effective(customer_id, now).await?;
        effective.retain(|r| r.is_effective_at(now));
        Ok(effective)
    }

    /// Admin listing.
    pub async fn list(&self, filter: RestrictionFilter) -> IntegrityResult<Vec<UserRestriction>> {
        self.restrictions.list(filter, Utc::now()).await
    }

    /// Evaluate a capability against the customer's restrictions.
    ///
    /// Blocking types are tried in [`Capability::blocking_types`] order
    /// and the first match is reported, so the reason shown to the
    /// customer is stable across calls.
    pub async fn can(
        &self,
        customer_id: &str,
        capability: Capability,
    ) -> IntegrityResult<CapabilityCheck> {
        let now = Utc::now();
        let effective = self.restrictions.list_effective(customer_id, now).await?;

        let blocking = capability.blocking_types().iter().find_map(|&kind| {
            effective
                .iter()
                .find(|r| r.restriction_type == kind && r.is_effective_at(now))
        });

        if let Some(r) = blocking {
            debug!(
                customer_id,
                capability = ?capability,
                restriction_id = %r.id,
                "capability blocked"
            );
        }

        Ok(CapabilityCheck {
            capability,
            allowed: blocking.is_none(),
            restriction: blocking.map(BlockingRestriction::from),
        })
    }

    pub async fn can_access_marketplace(
        &self,
        customer_id: &str,
    ) -> IntegrityResult<CapabilityCheck> {
        self.can(customer_id, Capability::AccessMarketplace).await
    }

    pub async fn can_withdraw(&self, customer_id: &str) -> IntegrityResult<CapabilityCheck> {
        self.can(customer_id, Capability::Withdraw).await
    }

    pub async fn can_bid(&self, customer_id: &str) -> IntegrityResult<CapabilityCheck> {
        self.can(customer_id, Capability::Bid).await
    }

    pub async fn can_review(&self, customer_id: &str) -> IntegrityResult<CapabilityCheck> {
        self.can(customer_id, Capability::Review).await
    }

    pub async fn can_use_credit(&self, customer_id: &str) -> IntegrityResult<CapabilityCheck> {
        self.can(customer_id, Capability::UseCredit).await
    }

    /// Open an appeal against a restriction still in force.
    ///
    /// Allowed when no appeal was filed yet or the last one was
    /// rejected.
    pub async fn submit_appeal(
        &self,
        restriction_id: Uuid,
        appeal_reason: &str,
    ) -> IntegrityResult<UserRestriction> {
        if appeal_reason.trim().is_empty() {
            return Err(PolicyError::EmptyField {
                field: "appeal_reason",
            }
            .into());
        }

        let restriction = self.restrictions.get_by_id(restriction_id).await?;
        if !restriction.is_active {
            return Err(PolicyError::RestrictionInactive(restriction_id).into());
        }
        if !restriction.is_effective_at(Utc::now()) {
            return Err(PolicyError::RestrictionExpired(restriction_id).into());
        }
        if !restriction.appeal_status.accepts_new_appeal() {
            return Err(
                PolicyError::for_appeal_status(restriction_id, restriction.appeal_status).into(),
            );
        }

        let updated = self
            .restrictions
            .update_appeal(
                restriction_id,
                AppealUpdate {
                    status: AppealStatus::Pending,
                    reason: Some(appeal_reason.to_string()),
                    reviewed_by: None,
                    reviewed_at: None,
                },
            )
            .await?;

        info!(%restriction_id, customer_id = %updated.customer_id, "appeal submitted");
        self.audit
            .record(
                &AuditContext::actor(updated.customer_id.as_str()),
                AuditAction::AppealSubmitted,
                RESTRICTION_ENTITY,
                Some(&restriction_id.to_string()),
                AuditDetails {
                    old_value: Some(json!({ "appealStatus": restriction.appeal_status })),
                    new_value: Some(json!({ "appealStatus": AppealStatus::Pending })),
                    reason: Some(appeal_reason.to_string()),
                    severity: Some(AuditSeverity::Notice),
                    ..Default::default()
                },
            )
            .await;

        Ok(updated)
    }

    /// Decide an open appeal. Approval lifts the restriction if it is
    /// still active; rejection leaves it untouched.
    pub async fn review_appeal(
        &self,
        restriction_id: Uuid,
        reviewed_by: &str,
        approved: bool,
    ) -> IntegrityResult<UserRestriction> {
        let restriction = self.restrictions.get_by_id(restriction_id).await?;
        if !restriction.appeal_status.is_open() {
            return Err(PolicyError::NoOpenAppeal(restriction_id).into());
        }

        if approved && restriction.is_active {
            self.lift(restriction_id, reviewed_by, "appeal approved")
                .await?;
        }

        let status = if approved {
            AppealStatus::Approved
        } else {
            AppealStatus::Rejected
        };
        let reviewed = self
            .restrictions
            .update_appeal(
                restriction_id,
                AppealUpdate {
                    status,
                    reason: None,
                    reviewed_by: Some(reviewed_by.to_string()),
                    reviewed_at: Some(Utc::now()),
                },
            )
            .await?;

        info!(%restriction_id, reviewed_by, approved, "appeal reviewed");
        self.audit
            .record(
                &AuditContext::actor(reviewed_by),
                AuditAction::AppealReviewed,
                RESTRICTION_ENTITY,
                Some(&restriction_id.to_string()),
                AuditDetails {
                    old_value: Some(json!({ "appealStatus": restriction.appeal_status })),
                    new_value: Some(json!({ "appealStatus": status })),
                    metadata: Some(json!({ "approved": approved })),
                    severity: Some(AuditSeverity::Notice),
                    ..Default::default()
                },
            )
            .await;

        Ok(reviewed)
    }

    /// Active restrictions awaiting an appeal decision, oldest first.
    pub async fn pending_appeals(&self) -> IntegrityResult<Vec<UserRestriction>> {
        self.restrictions.list_open_appeals().await
    }

    /// Deactivate every restriction whose end date has passed.
    ///
    /// Idempotent: rows already deactivated are not touched again, so a
    /// second run (or a concurrent one) returns an empty list.
    pub async fn expire_restrictions(&self) -> IntegrityResult<Vec<UserRestriction>> {
        let now = Utc::now();
        let expired = self
            .restrictions
            .expire_due(
                now,
                LiftRestriction {
                    lifted_by: None,
                    lift_reason: AUTO_EXPIRED.to_string(),
                    lifted_at: now,
                },
            )
            .await?;

        let system = AuditContext::system();
        for r in &expired {
            self.audit
                .log_restriction(
                    &system,
                    RestrictionEvent::Lifted,
                    &r.customer_id,
                    RestrictionChange {
                        restriction_type: r.restriction_type,
                        reason: AUTO_EXPIRED.to_string(),
                        duration_days: None,
                    },
                )
                .await;
        }

        let customers: BTreeSet<&str> = expired.iter().map(|r| r.customer_id.as_str()).collect();
        for customer_id in customers {
            self.refresh_flags(customer_id).await;
        }

        info!(expired = expired.len(), "restriction expiry sweep finished");
        Ok(expired)
    }

    /// Recompute derived account flags. Best-effort.
    async fn refresh_flags(&self, customer_id: &str) {
        let Some(effective) = self.stats().fire(
            SideEffect::FlagUpdate,
            self.restrictions.list_effective(customer_id, Utc::now()).await,
        ) else {
            return;
        };
        let flags = AccountFlags::derive(&effective);
        self.stats().fire(
            SideEffect::FlagUpdate,
            self.flags.set_flags(customer_id, flags).await,
        );
    }
}
