//! In-memory implementation of every integrity repository trait.
//!
//! Backed by a single `RwLock`-guarded set of tables behind an `Arc`, so
//! clones share state and can be handed to several services at once.
//! Used by service tests and by hosts that embed the suite without a
//! database. Individual tables can be switched to "unavailable" to
//! exercise the best-effort write paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use integrity_core::error::{IntegrityError, IntegrityResult};
use integrity_core::models::alert::{
    AlertFilter, AlertSeverity, AlertStatus, AlertStatusUpdate, CreateAlert,
    SuspiciousActivityAlert,
};
use integrity_core::models::audit::{AuditLogEntry, AuditLogFilter, CreateAuditLogEntry};
use integrity_core::models::device::{CreateDeviceSession, DeviceSession, TouchDeviceSession};
use integrity_core::models::history::WalletTransaction;
use integrity_core::models::restriction::{
    AccountFlags, AppealStatus, AppealUpdate, CreateRestriction, LiftRestriction,
    RestrictionFilter, RestrictionType, UserRestriction,
};
use integrity_core::repository::{
    AccountFlagRepository, AlertRepository, AuditLogRepository, DeviceSessionRepository,
    RestrictionRepository, ReviewHistory, WalletHistory,
};
use uuid::Uuid;

/// Tables that can be made unavailable for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    AuditLog,
    DeviceSession,
    Alert,
    Restriction,
    AccountFlag,
    Wallet,
    Review,
}

#[derive(Default)]
struct Tables {
    audit: Vec<AuditLogEntry>,
    devices: Vec<DeviceSession>,
    alerts: Vec<SuspiciousActivityAlert>,
    restrictions: Vec<UserRestriction>,
    flags: HashMap<String, AccountFlags>,
    wallet: Vec<(String, WalletTransaction)>,
    reviews: Vec<(String, DateTime<Utc>)>,
    unavailable: HashSet<Table>,
}

impl Tables {
    fn ensure_available(&self, table: Table) -> IntegrityResult<()> {
        if self.unavailable.contains(&table) {
            return Err(IntegrityError::Database(format!(
                "{table:?} table is unavailable"
            )));
        }
        Ok(())
    }

    fn restriction_mut(&mut self, id: Uuid) -> IntegrityResult<&mut UserRestriction> {
        self.restrictions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("user_restriction", id))
    }
}

fn not_found(entity: &str, id: impl ToString) -> IntegrityError {
    IntegrityError::NotFound {
        entity: entity.into(),
        id: id.to_string(),
    }
}

/// Shared in-memory store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> IntegrityResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| IntegrityError::Internal("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> IntegrityResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| IntegrityError::Internal("in-memory store lock poisoned".into()))
    }

    /// Make every operation on `table` fail with a database error.
    pub fn set_unavailable(&self, table: Table, unavailable: bool) -> IntegrityResult<()> {
        let mut tables = self.write()?;
        if unavailable {
            tables.unavailable.insert(table);
        } else {
            tables.unavailable.remove(&table);
        }
        Ok(())
    }

    /// Flags last written for a customer.
    pub fn account_flags(&self, customer_id: &str) -> IntegrityResult<Option<AccountFlags>> {
        Ok(self.read()?.flags.get(customer_id).copied())
    }

    /// Record a wallet ledger row for a customer.
    pub fn record_wallet_transaction(
        &self,
        customer_id: &str,
        transaction: WalletTransaction,
    ) -> IntegrityResult<()> {
        self.write()?
            .wallet
            .push((customer_id.to_string(), transaction));
        Ok(())
    }

    /// Record a review received by a contractor.
    pub fn record_review(&self, contractor_id: &str, at: DateTime<Utc>) -> IntegrityResult<()> {
        self.write()?.reviews.push((contractor_id.to_string(), at));
        Ok(())
    }
}

/// Sort most recent first; among equal timestamps the later insert wins.
fn newest_first<T: Clone>(
    rows: &[T],
    keep: impl Fn(&T) -> bool,
    at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mut picked: Vec<(usize, &T)> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| keep(*r))
        .collect();
    picked.sort_by(|(ia, a), (ib, b)| at(b).cmp(&at(a)).then(ib.cmp(ia)));
    picked.into_iter().map(|(_, r)| r.clone()).collect()
}

fn take<T>(rows: Vec<T>, limit: u64) -> Vec<T> {
    rows.into_iter()
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect()
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

impl AuditLogRepository for InMemoryStore {
    async fn append(&self, input: CreateAuditLogEntry) -> IntegrityResult<AuditLogEntry> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::AuditLog)?;

        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            actor_id: input.context.actor_id,
            actor_email: input.context.actor_email,
            actor_role: input.context.actor_role,
            actor_ip: input.context.actor_ip,
            actor_device: input.context.actor_device,
            action: input.action,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            old_value: input.old_value,
            new_value: input.new_value,
            changes: input.changes,
            reason: input.reason,
            metadata: input.metadata,
            severity: input.severity,
            created_at: Utc::now(),
        };
        tables.audit.push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, filter: AuditLogFilter) -> IntegrityResult<Vec<AuditLogEntry>> {
        let tables = self.read()?;
        tables.ensure_available(Table::AuditLog)?;

        let rows = newest_first(&tables.audit, |e| filter.matches(e), |e| e.created_at);
        Ok(take(rows, filter.limit))
    }

    async fn entity_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> IntegrityResult<Vec<AuditLogEntry>> {
        let tables = self.read()?;
        tables.ensure_available(Table::AuditLog)?;

        Ok(newest_first(
            &tables.audit,
            |e| e.entity_type == entity_type && e.entity_id.as_deref() == Some(entity_id),
            |e| e.created_at,
        ))
    }

    async fn count_since(&self, since: DateTime<Utc>) -> IntegrityResult<u64> {
        let tables = self.read()?;
        tables.ensure_available(Table::AuditLog)?;
        Ok(tables.audit.iter().filter(|e| e.created_at >= since).count() as u64)
    }
}

// ---------------------------------------------------------------------------
// Device sessions
// ---------------------------------------------------------------------------

impl DeviceSessionRepository for InMemoryStore {
    async fn get_by_fingerprint(&self, fingerprint: &str) -> IntegrityResult<DeviceSession> {
        let tables = self.read()?;
        tables.ensure_available(Table::DeviceSession)?;
        tables
            .devices
            .iter()
            .find(|d| d.fingerprint == fingerprint)
            .cloned()
            .ok_or_else(|| not_found("device_session", fingerprint))
    }

    async fn create(&self, input: CreateDeviceSession) -> IntegrityResult<DeviceSession> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::DeviceSession)?;

        if tables
            .devices
            .iter()
            .any(|d| d.fingerprint == input.fingerprint)
        {
            return Err(IntegrityError::AlreadyExists {
                entity: "device_session".into(),
            });
        }

        let session = DeviceSession {
            id: Uuid::new_v4(),
            fingerprint: input.fingerprint,
            linked_user_ids: input.user_id.iter().cloned().collect(),
            linked_customer_ids: input.customer_id.iter().cloned().collect(),
            user_id: input.user_id,
            customer_id: input.customer_id,
            ip_address: input.ip_address,
            user_agent: input.device.user_agent,
            platform: input.device.platform,
            browser: input.device.browser,
            city: input.device.city,
            country: input.device.country,
            session_token: input.session_token,
            first_seen_at: input.seen_at,
            last_active_at: input.seen_at,
        };
        tables.devices.push(session.clone());
        Ok(session)
    }

    async fn touch(
        &self,
        fingerprint: &str,
        input: TouchDeviceSession,
    ) -> IntegrityResult<DeviceSession> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::DeviceSession)?;

        let session = tables
            .devices
            .iter_mut()
            .find(|d| d.fingerprint == fingerprint)
            .ok_or_else(|| not_found("device_session", fingerprint))?;
        session.touch(&input);
        Ok(session.clone())
    }

    async fn list_by_ip_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> IntegrityResult<Vec<DeviceSession>> {
        let tables = self.read()?;
        tables.ensure_available(Table::DeviceSession)?;
        Ok(tables
            .devices
            .iter()
            .filter(|d| d.ip_address == ip_address && d.last_active_at >= since)
            .cloned()
            .collect())
    }

    async fn customer_seen_from_ip(
        &self,
        customer_id: &str,
        ip_address: &str,
    ) -> IntegrityResult<bool> {
        let tables = self.read()?;
        tables.ensure_available(Table::DeviceSession)?;
        Ok(tables
            .devices
            .iter()
            .any(|d| d.ip_address == ip_address && d.is_linked_to_customer(customer_id)))
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

impl AlertRepository for InMemoryStore {
    async fn create(&self, input: CreateAlert) -> IntegrityResult<SuspiciousActivityAlert> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::Alert)?;

        let now = Utc::now();
        let alert = SuspiciousActivityAlert {
            id: Uuid::new_v4(),
            user_id: input.context.user_id,
            customer_id: input.context.customer_id,
            session_id: input.context.session_id,
            ip_address: input.context.ip_address,
            device_fingerprint: input.context.device_fingerprint,
            activity_type: input.activity_type,
            description: input.description,
            evidence: input.evidence,
            related_entity_type: input.related_entity_type,
            related_entity_id: input.related_entity_id,
            linked_user_ids: input.linked_user_ids,
            linked_ips: input.linked_ips,
            risk_score: input.risk_score,
            severity: input.severity,
            status: AlertStatus::Open,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        tables.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn get_by_id(&self, id: Uuid) -> IntegrityResult<SuspiciousActivityAlert> {
        let tables = self.read()?;
        tables.ensure_available(Table::Alert)?;
        tables
            .alerts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| not_found("suspicious_activity", id))
    }

    async fn list_pending(
        &self,
        filter: AlertFilter,
    ) -> IntegrityResult<Vec<SuspiciousActivityAlert>> {
        let tables = self.read()?;
        tables.ensure_available(Table::Alert)?;

        let mut picked: Vec<(usize, &SuspiciousActivityAlert)> = tables
            .alerts
            .iter()
            .enumerate()
            .filter(|(_, a)| filter.matches(a))
            .collect();
        picked.sort_by(|(ia, a), (ib, b)| {
            b.severity
                .cmp(&a.severity)
                .then(b.created_at.cmp(&a.created_at))
                .then(ib.cmp(ia))
        });
        Ok(take(
            picked.into_iter().map(|(_, a)| a.clone()).collect::<Vec<_>>(),
            filter.limit,
        ))
    }

    async fn update_status(
        &self,
        id: Uuid,
        update: AlertStatusUpdate,
    ) -> IntegrityResult<SuspiciousActivityAlert> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::Alert)?;

        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| not_found("suspicious_activity", id))?;
        alert.status = update.status;
        if update.status.is_terminal() {
            alert.resolved_by = update.resolved_by;
            alert.resolution = update.resolution;
            alert.resolved_at = Some(update.at);
        }
        alert.updated_at = update.at;
        Ok(alert.clone())
    }

    async fn count_pending_by_severity(&self) -> IntegrityResult<Vec<(AlertSeverity, u64)>> {
        let tables = self.read()?;
        tables.ensure_available(Table::Alert)?;

        let mut counts: HashMap<AlertSeverity, u64> = HashMap::new();
        for alert in tables.alerts.iter().filter(|a| a.status.is_pending()) {
            *counts.entry(alert.severity).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Restrictions
// ---------------------------------------------------------------------------

impl RestrictionRepository for InMemoryStore {
    async fn create(&self, input: CreateRestriction) -> IntegrityResult<UserRestriction> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::Restriction)?;

        let now = Utc::now();
        let restriction = UserRestriction {
            id: Uuid::new_v4(),
            customer_id: input.customer_id,
            restriction_type: input.restriction_type,
            reason: input.reason,
            evidence: input.evidence,
            is_active: true,
            start_date: input.start_date,
            end_date: input.end_date,
            imposed_by: input.imposed_by,
            imposed_by_name: input.imposed_by_name,
            lifted_at: None,
            lifted_by: None,
            lift_reason: None,
            appeal_status: AppealStatus::None,
            appeal_reason: None,
            appeal_reviewed_by: None,
            appeal_reviewed_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.restrictions.push(restriction.clone());
        Ok(restriction)
    }

    async fn get_by_id(&self, id: Uuid) -> IntegrityResult<UserRestriction> {
        let tables = self.read()?;
        tables.ensure_available(Table::Restriction)?;
        tables
            .restrictions
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| not_found("user_restriction", id))
    }

    async fn list_effective(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> IntegrityResult<Vec<UserRestriction>> {
        let tables = self.read()?;
        tables.ensure_available(Table::Restriction)?;
        Ok(newest_first(
            &tables.restrictions,
            |r| r.customer_id == customer_id && r.is_effective_at(now),
            |r| r.created_at,
        ))
    }

    async fn list(
        &self,
        filter: RestrictionFilter,
        now: DateTime<Utc>,
    ) -> IntegrityResult<Vec<UserRestriction>> {
        let tables = self.read()?;
        tables.ensure_available(Table::Restriction)?;
        let rows = newest_first(
            &tables.restrictions,
            |r| {
                filter
                    .customer_id
                    .as_ref()
                    .is_none_or(|c| &r.customer_id == c)
                    && (!filter.effective_only || r.is_effective_at(now))
            },
            |r| r.created_at,
        );
        Ok(take(rows, filter.limit))
    }

    async fn deactivate(
        &self,
        id: Uuid,
        input: LiftRestriction,
    ) -> IntegrityResult<Option<UserRestriction>> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::Restriction)?;

        let restriction = tables.restriction_mut(id)?;
        if !restriction.is_active {
            return Ok(None);
        }
        restriction.is_active = false;
        restriction.lifted_at = Some(input.lifted_at);
        restriction.lifted_by = input.lifted_by;
        restriction.lift_reason = Some(input.lift_reason);
        restriction.updated_at = input.lifted_at;
        Ok(Some(restriction.clone()))
    }

    async fn update_appeal(
        &self,
        id: Uuid,
        input: AppealUpdate,
    ) -> IntegrityResult<UserRestriction> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::Restriction)?;

        let restriction = tables.restriction_mut(id)?;
        restriction.appeal_status = input.status;
        if input.reason.is_some() {
            restriction.appeal_reason = input.reason;
        }
        if input.reviewed_by.is_some() {
            restriction.appeal_reviewed_by = input.reviewed_by;
            restriction.appeal_reviewed_at = input.reviewed_at;
        }
        restriction.updated_at = Utc::now();
        Ok(restriction.clone())
    }

    async fn expire_due(
        &self,
        now: DateTime<Utc>,
        stamp: LiftRestriction,
    ) -> IntegrityResult<Vec<UserRestriction>> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::Restriction)?;

        let mut expired = Vec::new();
        for restriction in tables
            .restrictions
            .iter_mut()
            .filter(|r| r.is_due_for_expiry_at(now))
        {
            restriction.is_active = false;
            restriction.lifted_at = Some(stamp.lifted_at);
            restriction.lifted_by.clone_from(&stamp.lifted_by);
            restriction.lift_reason = Some(stamp.lift_reason.clone());
            restriction.updated_at = stamp.lifted_at;
            expired.push(restriction.clone());
        }
        Ok(expired)
    }

    async fn list_open_appeals(&self) -> IntegrityResult<Vec<UserRestriction>> {
        let tables = self.read()?;
        tables.ensure_available(Table::Restriction)?;

        let mut rows: Vec<UserRestriction> = tables
            .restrictions
            .iter()
            .filter(|r| r.is_active && r.appeal_status.is_open())
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.updated_at);
        Ok(rows)
    }

    async fn count_effective_by_type(
        &self,
        now: DateTime<Utc>,
    ) -> IntegrityResult<Vec<(RestrictionType, u64)>> {
        let tables = self.read()?;
        tables.ensure_available(Table::Restriction)?;

        Ok(RestrictionType::ALL
            .iter()
            .map(|kind| {
                let count = tables
                    .restrictions
                    .iter()
                    .filter(|r| r.restriction_type == *kind && r.is_effective_at(now))
                    .count() as u64;
                (*kind, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Host-owned collaborators
// ---------------------------------------------------------------------------

impl AccountFlagRepository for InMemoryStore {
    async fn set_flags(&self, customer_id: &str, flags: AccountFlags) -> IntegrityResult<()> {
        let mut tables = self.write()?;
        tables.ensure_available(Table::AccountFlag)?;
        tables.flags.insert(customer_id.to_string(), flags);
        Ok(())
    }
}

impl WalletHistory for InMemoryStore {
    async fn transactions_since(
        &self,
        customer_id: &str,
        since: DateTime<Utc>,
    ) -> IntegrityResult<Vec<WalletTransaction>> {
        let tables = self.read()?;
        tables.ensure_available(Table::Wallet)?;
        Ok(tables
            .wallet
            .iter()
            .filter(|(owner, tx)| owner == customer_id && tx.created_at >= since)
            .map(|(_, tx)| tx.clone())
            .collect())
    }
}

impl ReviewHistory for InMemoryStore {
    async fn count_received_since(
        &self,
        contractor_id: &str,
        since: DateTime<Utc>,
    ) -> IntegrityResult<u64> {
        let tables = self.read()?;
        tables.ensure_available(Table::Review)?;
        Ok(tables
            .reviews
            .iter()
            .filter(|(owner, at)| owner == contractor_id && *at >= since)
            .count() as u64)
    }
}
