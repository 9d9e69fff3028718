//! Integration tests for the restriction repository using in-memory
//! SurrealDB.

use chrono::{Duration, Utc};
use integrity_core::models::restriction::{
    AccountFlags, AppealStatus, AppealUpdate, CreateRestriction, LiftRestriction,
    RestrictionFilter, RestrictionType,
};
use integrity_core::repository::{AccountFlagRepository, RestrictionRepository};
use integrity_db::repository::{SurrealAccountFlagRepository, SurrealRestrictionRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> (Surreal<Db>, SurrealRestrictionRepository<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    integrity_db::run_migrations(&db).await.unwrap();
    let repo = SurrealRestrictionRepository::new(db.clone());
    (db, repo)
}

fn restriction(
    customer: &str,
    kind: RestrictionType,
    end: Option<chrono::DateTime<Utc>>,
) -> CreateRestriction {
    CreateRestriction {
        customer_id: customer.into(),
        restriction_type: kind,
        reason: "policy violation".into(),
        evidence: Some(serde_json::json!({ "alert": "a1" })),
        imposed_by: "admin-1".into(),
        imposed_by_name: Some("Admin".into()),
        start_date: Utc::now() - Duration::days(1),
        end_date: end,
    }
}

fn stamp(reason: &str) -> LiftRestriction {
    LiftRestriction {
        lifted_by: None,
        lift_reason: reason.into(),
        lifted_at: Utc::now(),
    }
}

#[tokio::test]
async fn create_and_list_effective() {
    let (_db, repo) = setup().await;
    let now = Utc::now();

    let permanent = repo
        .create(restriction("c1", RestrictionType::WalletHold, None))
        .await
        .unwrap();
    assert!(permanent.is_active);
    assert_eq!(permanent.appeal_status, AppealStatus::None);
    assert_eq!(permanent.end_date, None);

    // Lapsed but not yet swept: no longer effective.
    repo.create(restriction(
        "c1",
        RestrictionType::BiddingBan,
        Some(now - Duration::hours(1)),
    ))
    .await
    .unwrap();
    repo.create(restriction("c2", RestrictionType::FullBan, None))
        .await
        .unwrap();

    let effective = repo.list_effective("c1", Utc::now()).await.unwrap();
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].id, permanent.id);
}

#[tokio::test]
async fn deactivate_keeps_the_row() {
    let (_db, repo) = setup().await;
    let created = repo
        .create(restriction("c1", RestrictionType::ReviewBan, None))
        .await
        .unwrap();

    let lifted = repo
        .deactivate(
            created.id,
            LiftRestriction {
                lifted_by: Some("admin-2".into()),
                lift_reason: "mistake".into(),
                lifted_at: Utc::now(),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!lifted.is_active);
    assert_eq!(lifted.lifted_by.as_deref(), Some("admin-2"));

    // A second lift changes nothing and keeps the first stamp.
    let again = repo
        .deactivate(
            created.id,
            LiftRestriction {
                lifted_by: Some("admin-3".into()),
                lift_reason: "duplicate".into(),
                lifted_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(again.is_none());

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert!(!fetched.is_active);
    assert_eq!(fetched.lift_reason.as_deref(), Some("mistake"));
    assert_eq!(fetched.lifted_by.as_deref(), Some("admin-2"));

    let all = repo
        .list(
            RestrictionFilter {
                customer_id: Some("c1".into()),
                effective_only: false,
                limit: 10,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn expire_due_only_touches_lapsed_rows_once() {
    let (_db, repo) = setup().await;
    let now = Utc::now();

    let lapsed = repo
        .create(restriction(
            "c1",
            RestrictionType::WalletHold,
            Some(now - Duration::minutes(5)),
        ))
        .await
        .unwrap();
    repo.create(restriction(
        "c1",
        RestrictionType::MarketplaceBan,
        Some(now + Duration::days(5)),
    ))
    .await
    .unwrap();
    repo.create(restriction("c1", RestrictionType::FullBan, None))
        .await
        .unwrap();

    let expired = repo.expire_due(now, stamp("expired")).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, lapsed.id);
    assert!(!expired[0].is_active);
    assert_eq!(expired[0].lifted_by, None);

    assert!(repo.expire_due(now, stamp("expired")).await.unwrap().is_empty());
}

#[tokio::test]
async fn appeals_and_counts() {
    let (_db, repo) = setup().await;
    let created = repo
        .create(restriction("c1", RestrictionType::CreditFreeze, None))
        .await
        .unwrap();
    repo.create(restriction("c2", RestrictionType::CreditFreeze, None))
        .await
        .unwrap();

    let appealed = repo
        .update_appeal(
            created.id,
            AppealUpdate {
                status: AppealStatus::Pending,
                reason: Some("please".into()),
                reviewed_by: None,
                reviewed_at: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(appealed.appeal_status, AppealStatus::Pending);
    assert_eq!(appealed.appeal_reason.as_deref(), Some("please"));

    let open = repo.list_open_appeals().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, created.id);

    let counts = repo.count_effective_by_type(Utc::now()).await.unwrap();
    assert_eq!(counts, vec![(RestrictionType::CreditFreeze, 2)]);
}

#[tokio::test]
async fn account_flags_upsert() {
    let (db, _repo) = setup().await;
    let flags = SurrealAccountFlagRepository::new(db.clone());

    flags
        .set_flags("c1", AccountFlags { credit_hold: true })
        .await
        .unwrap();
    flags
        .set_flags("c1", AccountFlags { credit_hold: false })
        .await
        .unwrap();

    let mut result = db
        .query("SELECT * FROM account_flag WHERE customer_id = 'c1'")
        .await
        .unwrap();
    let rows: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(rows.len(), 1);
}
