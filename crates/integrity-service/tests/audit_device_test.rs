//! Integration tests for the audit trail, device tracker and dashboard
//! against the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use integrity_core::error::{IntegrityError, IntegrityResult};
use integrity_core::models::alert::AlertSeverity;
use integrity_core::models::audit::{
    AuditAction, AuditContext, AuditDetails, AuditLogFilter, AuditSeverity,
};
use integrity_core::models::device::{
    ActivityContext, CreateDeviceSession, DeviceInfo, DeviceSession, TouchDeviceSession,
};
use integrity_core::models::history::ProjectQuote;
use integrity_core::models::restriction::RestrictionType;
use integrity_core::repository::DeviceSessionRepository;
use integrity_db::InMemoryStore;
use integrity_db::memory::Table;
use integrity_service::audit::{
    AdminOverride, AuthEvent, FinancialChange, FinancialEvent, KycChange, KycEvent,
};
use integrity_service::device::fingerprint;
use integrity_service::{
    ApplyRestriction, AuditTrail, DetectionConfig, DetectionEngine, DeviceTracker,
    InstrumentationStats, IntegrityDashboard, RestrictionService, StatsSnapshot,
};

fn trail(store: &InMemoryStore) -> AuditTrail<InMemoryStore> {
    AuditTrail::new(store.clone())
}

#[tokio::test]
async fn wrappers_apply_category_severities() {
    let store = InMemoryStore::new();
    let audit = trail(&store);
    let ctx = AuditContext::actor("admin-1");

    let failed = audit
        .log_auth(&ctx, AuthEvent::LoginFailed, Some("u1"), None)
        .await
        .unwrap();
    assert_eq!(failed.severity, AuditSeverity::Warning);
    assert_eq!(failed.entity_type, "User");

    let adjustment = audit
        .log_financial(
            &ctx,
            FinancialEvent::WalletAdjustment,
            "Wallet",
            "w1",
            FinancialChange {
                old_value: Some(serde_json::json!({ "balance": 100 })),
                new_value: Some(serde_json::json!({ "balance": 40 })),
                reason: Some("refund reversal".into()),
                amount: Some(-60),
            },
        )
        .await
        .unwrap();
    assert_eq!(adjustment.severity, AuditSeverity::Warning);
    assert_eq!(adjustment.metadata.unwrap()["amount"], -60);

    let reject = audit
        .log_kyc(
            &ctx,
            KycEvent::Reject,
            "c1",
            KycChange {
                document_type: Some("ID_CARD".into()),
                reason: Some("blurry".into()),
                previous_status: Some("PENDING".into()),
                new_status: Some("REJECTED".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(reject.severity, AuditSeverity::Notice);
    assert_eq!(reject.new_value.unwrap()["status"], "REJECTED");

    let over = audit
        .log_admin_override(
            &ctx,
            "CreditLine",
            "cl-1",
            AdminOverride {
                override_type: "LIMIT".into(),
                old_value: None,
                new_value: Some(serde_json::json!({ "limit": 5_000_000 })),
                reason: "manual approval".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(over.severity, AuditSeverity::Critical);
}

#[tokio::test]
async fn query_filters_and_orders_most_recent_first() {
    let store = InMemoryStore::new();
    let audit = trail(&store);

    for (actor, action) in [
        ("admin-1", AuditAction::Login),
        ("admin-2", AuditAction::Login),
        ("admin-1", AuditAction::Logout),
    ] {
        audit
            .record(
                &AuditContext::actor(actor),
                action,
                "User",
                Some(actor),
                AuditDetails::default(),
            )
            .await
            .unwrap();
    }

    let by_actor = audit
        .query(AuditLogFilter {
            actor_id: Some("admin-1".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let actions: Vec<AuditAction> = by_actor.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Logout, AuditAction::Login]);

    let limited = audit
        .query(AuditLogFilter {
            limit: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].action, AuditAction::Logout);

    let future = audit
        .query(AuditLogFilter {
            from: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(future.is_empty());
}

#[tokio::test]
async fn history_is_unchanged_by_unrelated_writes() {
    let store = InMemoryStore::new();
    let audit = trail(&store);
    let ctx = AuditContext::actor("admin-1");

    for reason in ["opened", "adjusted"] {
        audit
            .record(
                &ctx,
                AuditAction::CreditLimitChange,
                "CreditLine",
                Some("cl-1"),
                AuditDetails {
                    reason: Some(reason.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    let before = audit.history("CreditLine", "cl-1").await.unwrap();

    for n in 0..5 {
        audit
            .record(
                &ctx,
                AuditAction::CreditLimitChange,
                "CreditLine",
                Some(&format!("cl-{}", n + 2)),
                AuditDetails::default(),
            )
            .await
            .unwrap();
    }
    audit
        .log_auth(&ctx, AuthEvent::Logout, Some("admin-1"), None)
        .await
        .unwrap();

    let after = audit.history("CreditLine", "cl-1").await.unwrap();
    assert_eq!(before, after);
    assert_eq!(after[0].reason.as_deref(), Some("adjusted"));
}

#[tokio::test]
async fn failed_audit_write_is_reported_not_raised() {
    let store = InMemoryStore::new();
    let stats = Arc::new(InstrumentationStats::default());
    let audit = AuditTrail::with_stats(store.clone(), Arc::clone(&stats));
    store.set_unavailable(Table::AuditLog, true).unwrap();

    let written = audit
        .log_auth(&AuditContext::system(), AuthEvent::Login, Some("u1"), None)
        .await;
    assert!(written.is_none());
    assert_eq!(stats.snapshot().audit_write_failures, 1);

    // Queries do surface the failure.
    assert!(audit.history("User", "u1").await.is_err());
}

#[tokio::test]
async fn observe_upserts_by_fingerprint_and_keeps_links() {
    let store = InMemoryStore::new();
    let tracker = DeviceTracker::new(store.clone());
    let device = DeviceInfo {
        user_agent: "Mozilla/5.0".into(),
        platform: Some("Linux".into()),
        ..Default::default()
    };
    let ctx = |user: &str| ActivityContext {
        user_id: Some(user.into()),
        customer_id: Some(format!("cust-{user}")),
        ip_address: Some("10.1.1.1".into()),
        ..Default::default()
    };

    let first = tracker
        .observe(&ctx("u1"), device.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.fingerprint, fingerprint("10.1.1.1", "Mozilla/5.0"));
    assert_eq!(first.platform.as_deref(), Some("Linux"));

    let second = tracker
        .observe(&ctx("u2"), device.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.user_id.as_deref(), Some("u2"));
    assert_eq!(second.linked_user_ids, vec!["u1", "u2"]);
    assert_eq!(second.linked_customer_ids, vec!["cust-u1", "cust-u2"]);
    assert!(second.last_active_at >= first.last_active_at);
    assert_eq!(second.first_seen_at, first.first_seen_at);

    // Anonymous sighting refreshes without dropping identity.
    let anonymous = ActivityContext {
        ip_address: Some("10.1.1.1".into()),
        ..Default::default()
    };
    let third = tracker.observe(&anonymous, device).await.unwrap().unwrap();
    assert_eq!(third.user_id.as_deref(), Some("u2"));
    assert!(store.customer_seen_from_ip("cust-u1", "10.1.1.1").await.unwrap());
}

#[tokio::test]
async fn observe_without_ip_is_ignored_and_explicit_fingerprint_wins() {
    let store = InMemoryStore::new();
    let tracker = DeviceTracker::new(store.clone());

    let none = tracker
        .observe(&ActivityContext::default(), DeviceInfo::default())
        .await
        .unwrap();
    assert!(none.is_none());

    let ctx = ActivityContext {
        user_id: Some("u1".into()),
        ip_address: Some("10.1.1.2".into()),
        device_fingerprint: Some("client-fp-1".into()),
        ..Default::default()
    };
    let session = tracker
        .observe(&ctx, DeviceInfo::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.fingerprint, "client-fp-1");
    assert!(store.get_by_fingerprint("client-fp-1").await.is_ok());
}

#[tokio::test]
async fn dashboard_summarizes_alerts_restrictions_and_audit() {
    let store = InMemoryStore::new();
    let stats = Arc::new(InstrumentationStats::default());
    let engine = DetectionEngine::new(
        AuditTrail::with_stats(store.clone(), Arc::clone(&stats)),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        DetectionConfig::default(),
    );
    let restrictions = RestrictionService::new(
        store.clone(),
        AuditTrail::with_stats(store.clone(), Arc::clone(&stats)),
        store.clone(),
    );
    let dashboard = IntegrityDashboard::new(store.clone(), store.clone(), store.clone());

    let quote = |contractor: &str, ip: &str| ProjectQuote {
        contractor_id: contractor.into(),
        ip_address: Some(ip.into()),
        amount: 1_000_000,
    };
    // Shared IP plus identical prices: one HIGH and one MEDIUM alert.
    let alerts = engine
        .detect_collusion_bidding(
            "p1",
            &[
                quote("k1", "198.51.100.1"),
                quote("k2", "198.51.100.1"),
                quote("k3", "198.51.100.2"),
            ],
        )
        .await;
    assert_eq!(alerts.len(), 2);

    for (customer, kind) in [
        ("c1", RestrictionType::BiddingBan),
        ("c2", RestrictionType::BiddingBan),
        ("c3", RestrictionType::WalletHold),
    ] {
        restrictions
            .apply(
                customer,
                kind,
                ApplyRestriction {
                    reason: "collusion".into(),
                    evidence: None,
                    imposed_by: "admin-1".into(),
                    imposed_by_name: None,
                    duration_days: Some(14),
                    actor_ip: None,
                },
            )
            .await
            .unwrap();
    }

    let overview = dashboard.overview().await.unwrap();
    assert_eq!(overview.open_alerts, 2);
    assert_eq!(overview.effective_restrictions, 3);
    // Two anomaly entries plus three bans.
    assert_eq!(overview.recent_audit_entries, 5);
    assert_eq!(
        overview.alerts_by_severity,
        vec![(AlertSeverity::High, 1), (AlertSeverity::Medium, 1)]
    );
    assert_eq!(
        overview.restrictions_by_type,
        vec![
            (RestrictionType::WalletHold, 1),
            (RestrictionType::BiddingBan, 2)
        ]
    );
    assert_eq!(stats.snapshot(), StatsSnapshot::default());
}

/// Device store where another observer inserts the fingerprint right
/// after this one found it missing.
#[derive(Clone)]
struct RivalInsert {
    store: InMemoryStore,
    rival: CreateDeviceSession,
}

impl DeviceSessionRepository for RivalInsert {
    async fn get_by_fingerprint(&self, fingerprint: &str) -> IntegrityResult<DeviceSession> {
        let found = self.store.get_by_fingerprint(fingerprint).await;
        if matches!(found, Err(IntegrityError::NotFound { .. })) {
            DeviceSessionRepository::create(&self.store, self.rival.clone()).await?;
        }
        found
    }

    async fn create(&self, input: CreateDeviceSession) -> IntegrityResult<DeviceSession> {
        DeviceSessionRepository::create(&self.store, input).await
    }

    async fn touch(
        &self,
        fingerprint: &str,
        input: TouchDeviceSession,
    ) -> IntegrityResult<DeviceSession> {
        self.store.touch(fingerprint, input).await
    }

    async fn list_by_ip_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> IntegrityResult<Vec<DeviceSession>> {
        self.store.list_by_ip_since(ip_address, since).await
    }

    async fn customer_seen_from_ip(
        &self,
        customer_id: &str,
        ip_address: &str,
    ) -> IntegrityResult<bool> {
        self.store.customer_seen_from_ip(customer_id, ip_address).await
    }
}

#[tokio::test]
async fn observe_losing_the_first_insert_retries_as_update() {
    let store = InMemoryStore::new();
    let device = DeviceInfo {
        user_agent: "Mozilla/5.0".into(),
        ..Default::default()
    };
    let fp = fingerprint("10.1.1.3", "Mozilla/5.0");
    let tracker = DeviceTracker::new(RivalInsert {
        store: store.clone(),
        rival: CreateDeviceSession {
            fingerprint: fp.clone(),
            user_id: Some("u1".into()),
            customer_id: Some("cust-u1".into()),
            ip_address: "10.1.1.3".into(),
            device: device.clone(),
            session_token: None,
            seen_at: Utc::now(),
        },
    });

    let ctx = ActivityContext {
        user_id: Some("u2".into()),
        customer_id: Some("cust-u2".into()),
        ip_address: Some("10.1.1.3".into()),
        ..Default::default()
    };
    let session = tracker.observe(&ctx, device).await.unwrap().unwrap();
    assert_eq!(session.fingerprint, fp);
    assert_eq!(session.user_id.as_deref(), Some("u2"));
    assert_eq!(session.linked_user_ids, vec!["u1", "u2"]);
    assert_eq!(session.linked_customer_ids, vec!["cust-u1", "cust-u2"]);

    let stored = store
        .list_by_ip_since("10.1.1.3", Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, session.id);
}
