//! Integration tests for the audit log repository using in-memory SurrealDB.

use integrity_core::models::audit::{
    AuditAction, AuditContext, AuditLogFilter, AuditSeverity, CreateAuditLogEntry,
};
use integrity_core::repository::AuditLogRepository;
use integrity_db::repository::SurrealAuditLogRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> (Surreal<Db>, SurrealAuditLogRepository<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    integrity_db::run_migrations(&db).await.unwrap();
    let repo = SurrealAuditLogRepository::new(db.clone());
    (db, repo)
}

fn entry(
    actor: &str,
    action: AuditAction,
    entity_id: &str,
    severity: AuditSeverity,
) -> CreateAuditLogEntry {
    CreateAuditLogEntry {
        context: AuditContext::actor(actor).with_ip(Some("10.0.0.1".into())),
        action,
        entity_type: "Wallet".into(),
        entity_id: Some(entity_id.into()),
        old_value: Some(serde_json::json!({ "balance": 100 })),
        new_value: Some(serde_json::json!({ "balance": 40 })),
        changes: None,
        reason: Some("payout".into()),
        metadata: Some(serde_json::json!({ "amount": 60, "nested": { "k": "v" } })),
        severity,
    }
}

#[tokio::test]
async fn append_round_trips_all_fields() {
    let (_db, repo) = setup().await;

    let created = repo
        .append(entry(
            "u1",
            AuditAction::WalletWithdrawal,
            "w1",
            AuditSeverity::Notice,
        ))
        .await
        .unwrap();

    assert_eq!(created.actor_id.as_deref(), Some("u1"));
    assert_eq!(created.actor_ip.as_deref(), Some("10.0.0.1"));
    assert_eq!(created.action, AuditAction::WalletWithdrawal);
    assert_eq!(created.severity, AuditSeverity::Notice);
    assert_eq!(
        created.metadata,
        Some(serde_json::json!({ "amount": 60, "nested": { "k": "v" } }))
    );

    let history = repo.entity_history("Wallet", "w1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, created.id);
}

#[tokio::test]
async fn query_filters_and_orders_newest_first() {
    let (_db, repo) = setup().await;

    let first = repo
        .append(entry("u1", AuditAction::WalletDeposit, "w1", AuditSeverity::Info))
        .await
        .unwrap();
    let second = repo
        .append(entry("u1", AuditAction::WalletDeposit, "w1", AuditSeverity::Info))
        .await
        .unwrap();
    repo.append(entry("u2", AuditAction::UserBan, "c9", AuditSeverity::Critical))
        .await
        .unwrap();

    let rows = repo
        .query(AuditLogFilter {
            actor_id: Some("u1".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        rows.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    let critical = repo
        .query(AuditLogFilter {
            severity: Some(AuditSeverity::Critical),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].action, AuditAction::UserBan);

    let limited = repo
        .query(AuditLogFilter {
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn count_since_counts_recent_entries() {
    let (_db, repo) = setup().await;
    let before = chrono::Utc::now() - chrono::Duration::minutes(1);

    repo.append(entry("u1", AuditAction::Login, "s1", AuditSeverity::Info))
        .await
        .unwrap();
    repo.append(entry("u1", AuditAction::Logout, "s1", AuditSeverity::Info))
        .await
        .unwrap();

    assert_eq!(repo.count_since(before).await.unwrap(), 2);
    let later = chrono::Utc::now() + chrono::Duration::minutes(1);
    assert_eq!(repo.count_since(later).await.unwrap(), 0);
}

#[tokio::test]
async fn blob_values_read_back_as_written() {
    let (_db, repo) = setup().await;

    let mut input = entry("u1", AuditAction::CreditLimitChange, "c1", AuditSeverity::Warning);
    input.old_value = Some(serde_json::json!(5000));
    input.new_value = Some(serde_json::json!({ "value": 7500 }));
    input.changes = Some(serde_json::json!(["limit"]));
    let created = repo.append(input).await.unwrap();

    assert_eq!(created.old_value, Some(serde_json::json!(5000)));
    assert_eq!(created.new_value, Some(serde_json::json!({ "value": 7500 })));
    assert_eq!(created.changes, Some(serde_json::json!(["limit"])));

    let history = repo.entity_history("Wallet", "c1").await.unwrap();
    assert_eq!(history[0].old_value, Some(serde_json::json!(5000)));
}
