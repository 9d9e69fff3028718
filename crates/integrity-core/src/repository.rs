//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Services are generic over these
//! traits so they never depend on a particular storage engine.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::IntegrityResult;
use crate::models::{
    alert::{
        AlertFilter, AlertSeverity, AlertStatusUpdate, CreateAlert, SuspiciousActivityAlert,
    },
    audit::{AuditLogEntry, AuditLogFilter, CreateAuditLogEntry},
    device::{CreateDeviceSession, DeviceSession, TouchDeviceSession},
    history::WalletTransaction,
    restriction::{
        AccountFlags, AppealUpdate, CreateRestriction, LiftRestriction, RestrictionFilter,
        RestrictionType, UserRestriction,
    },
};

// ---------------------------------------------------------------------------
// Audit trail (append-only)
// ---------------------------------------------------------------------------

/// Append-only audit storage. There is deliberately no update or delete.
pub trait AuditLogRepository: Send + Sync {
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = IntegrityResult<AuditLogEntry>> + Send;
    /// Entries matching the filter, most recent first, at most
    /// `filter.limit`.
    fn query(
        &self,
        filter: AuditLogFilter,
    ) -> impl Future<Output = IntegrityResult<Vec<AuditLogEntry>>> + Send;
    /// Every entry for one entity, most recent first.
    fn entity_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> impl Future<Output = IntegrityResult<Vec<AuditLogEntry>>> + Send;
    fn count_since(&self, since: DateTime<Utc>)
    -> impl Future<Output = IntegrityResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Device sessions
// ---------------------------------------------------------------------------

pub trait DeviceSessionRepository: Send + Sync {
    fn get_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> impl Future<Output = IntegrityResult<DeviceSession>> + Send;
    /// Insert a first sighting. Fails with `AlreadyExists` when another
    /// writer created the fingerprint first.
    fn create(
        &self,
        input: CreateDeviceSession,
    ) -> impl Future<Output = IntegrityResult<DeviceSession>> + Send;
    /// Refresh an existing fingerprint, merging identity links.
    fn touch(
        &self,
        fingerprint: &str,
        input: TouchDeviceSession,
    ) -> impl Future<Output = IntegrityResult<DeviceSession>> + Send;
    /// Sessions seen from an IP with activity at or after `since`.
    fn list_by_ip_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = IntegrityResult<Vec<DeviceSession>>> + Send;
    /// Whether the customer has ever been observed from the IP.
    fn customer_seen_from_ip(
        &self,
        customer_id: &str,
        ip_address: &str,
    ) -> impl Future<Output = IntegrityResult<bool>> + Send;
}

// ---------------------------------------------------------------------------
// Suspicious activity alerts
// ---------------------------------------------------------------------------

pub trait AlertRepository: Send + Sync {
    fn create(
        &self,
        input: CreateAlert,
    ) -> impl Future<Output = IntegrityResult<SuspiciousActivityAlert>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = IntegrityResult<SuspiciousActivityAlert>> + Send;
    /// Open and investigating alerts, by severity (highest first) then
    /// recency.
    fn list_pending(
        &self,
        filter: AlertFilter,
    ) -> impl Future<Output = IntegrityResult<Vec<SuspiciousActivityAlert>>> + Send;
    fn update_status(
        &self,
        id: Uuid,
        update: AlertStatusUpdate,
    ) -> impl Future<Output = IntegrityResult<SuspiciousActivityAlert>> + Send;
    /// Pending alert counts grouped by severity. Severities with no
    /// pending alerts are omitted.
    fn count_pending_by_severity(
        &self,
    ) -> impl Future<Output = IntegrityResult<Vec<(AlertSeverity, u64)>>> + Send;
}

// ---------------------------------------------------------------------------
// Restrictions
// ---------------------------------------------------------------------------

pub trait RestrictionRepository: Send + Sync {
    fn create(
        &self,
        input: CreateRestriction,
    ) -> impl Future<Output = IntegrityResult<UserRestriction>> + Send;
    fn get_by_id(&self, id: Uuid)
    -> impl Future<Output = IntegrityResult<UserRestriction>> + Send;
    /// Restrictions of a customer effective at `now`, most recent first.
    fn list_effective(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = IntegrityResult<Vec<UserRestriction>>> + Send;
    /// Admin listing, most recent first.
    fn list(
        &self,
        filter: RestrictionFilter,
        now: DateTime<Utc>,
    ) -> impl Future<Output = IntegrityResult<Vec<UserRestriction>>> + Send;
    /// Deactivate one restriction if it is still active. Returns `None`
    /// when the row was already inactive, leaving its lift stamp as is.
    fn deactivate(
        &self,
        id: Uuid,
        input: LiftRestriction,
    ) -> impl Future<Output = IntegrityResult<Option<UserRestriction>>> + Send;
    fn update_appeal(
        &self,
        id: Uuid,
        input: AppealUpdate,
    ) -> impl Future<Output = IntegrityResult<UserRestriction>> + Send;
    /// Deactivate every active restriction whose end date is at or
    /// before `now`, returning the rows that changed. Rows already
    /// inactive are untouched, so repeated calls return nothing new.
    fn expire_due(
        &self,
        now: DateTime<Utc>,
        stamp: LiftRestriction,
    ) -> impl Future<Output = IntegrityResult<Vec<UserRestriction>>> + Send;
    /// Active restrictions with an open appeal, oldest update first.
    fn list_open_appeals(&self)
    -> impl Future<Output = IntegrityResult<Vec<UserRestriction>>> + Send;
    /// Effective restriction counts grouped by type. Types with no
    /// effective restrictions are omitted.
    fn count_effective_by_type(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = IntegrityResult<Vec<(RestrictionType, u64)>>> + Send;
}

// ---------------------------------------------------------------------------
// Account flags and external activity (owned by the host application)
// ---------------------------------------------------------------------------

/// Sink for flags derived from restrictions, such as credit hold.
pub trait AccountFlagRepository: Send + Sync {
    fn set_flags(
        &self,
        customer_id: &str,
        flags: AccountFlags,
    ) -> impl Future<Output = IntegrityResult<()>> + Send;
}

/// Wallet ledger of the host application.
pub trait WalletHistory: Send + Sync {
    /// Transactions of the customer's wallet created at or after `since`.
    fn transactions_since(
        &self,
        customer_id: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = IntegrityResult<Vec<WalletTransaction>>> + Send;
}

/// Contractor reviews of the host application.
pub trait ReviewHistory: Send + Sync {
    fn count_received_since(
        &self,
        contractor_id: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = IntegrityResult<u64>> + Send;
}
