//! Integration tests for the device session repository using in-memory
//! SurrealDB.

use chrono::{Duration, Utc};
use integrity_core::error::IntegrityError;
use integrity_core::models::device::{CreateDeviceSession, DeviceInfo, TouchDeviceSession};
use integrity_core::repository::DeviceSessionRepository;
use integrity_db::repository::SurrealDeviceSessionRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> SurrealDeviceSessionRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    integrity_db::run_migrations(&db).await.unwrap();
    SurrealDeviceSessionRepository::new(db)
}

fn sighting(fingerprint: &str, ip: &str, user: &str, customer: &str) -> CreateDeviceSession {
    CreateDeviceSession {
        fingerprint: fingerprint.into(),
        user_id: Some(user.into()),
        customer_id: Some(customer.into()),
        ip_address: ip.into(),
        device: DeviceInfo {
            user_agent: "Mozilla/5.0".into(),
            platform: Some("Linux".into()),
            browser: None,
            city: None,
            country: Some("NZ".into()),
        },
        session_token: None,
        seen_at: Utc::now(),
    }
}

#[tokio::test]
async fn create_then_get_by_fingerprint() {
    let repo = setup().await;

    let created = repo
        .create(sighting("fp-1", "10.0.0.1", "u1", "c1"))
        .await
        .unwrap();
    assert_eq!(created.linked_customer_ids, vec!["c1".to_string()]);
    assert_eq!(created.first_seen_at, created.last_active_at);

    let fetched = repo.get_by_fingerprint("fp-1").await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.country.as_deref(), Some("NZ"));
}

#[tokio::test]
async fn duplicate_fingerprint_conflicts() {
    let repo = setup().await;

    repo.create(sighting("fp-1", "10.0.0.1", "u1", "c1"))
        .await
        .unwrap();
    let err = repo
        .create(sighting("fp-1", "10.0.0.1", "u2", "c2"))
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrityError::AlreadyExists { .. }));
}

#[tokio::test]
async fn touch_merges_identity_links() {
    let repo = setup().await;
    let created = repo
        .create(sighting("fp-1", "10.0.0.1", "u1", "c1"))
        .await
        .unwrap();

    let later = created.first_seen_at + Duration::minutes(5);
    let touched = repo
        .touch(
            "fp-1",
            TouchDeviceSession {
                user_id: Some("u2".into()),
                customer_id: Some("c2".into()),
                session_token: Some("tok".into()),
                seen_at: later,
            },
        )
        .await
        .unwrap();

    assert_eq!(touched.id, created.id);
    assert_eq!(touched.customer_id.as_deref(), Some("c2"));
    assert!(touched.linked_customer_ids.contains(&"c1".to_string()));
    assert!(touched.linked_customer_ids.contains(&"c2".to_string()));
    assert_eq!(touched.last_active_at, later);
    assert_eq!(touched.first_seen_at, created.first_seen_at);
}

#[tokio::test]
async fn touch_unknown_fingerprint_is_not_found() {
    let repo = setup().await;
    let err = repo
        .touch(
            "missing",
            TouchDeviceSession {
                user_id: None,
                customer_id: None,
                session_token: None,
                seen_at: Utc::now(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrityError::NotFound { .. }));
}

#[tokio::test]
async fn ip_queries() {
    let repo = setup().await;
    repo.create(sighting("fp-1", "10.0.0.1", "u1", "c1"))
        .await
        .unwrap();
    repo.create(sighting("fp-2", "10.0.0.1", "u2", "c2"))
        .await
        .unwrap();
    repo.create(sighting("fp-3", "10.0.0.9", "u3", "c3"))
        .await
        .unwrap();

    let since = Utc::now() - Duration::days(30);
    let sessions = repo.list_by_ip_since("10.0.0.1", since).await.unwrap();
    assert_eq!(sessions.len(), 2);

    assert!(repo.customer_seen_from_ip("c1", "10.0.0.1").await.unwrap());
    assert!(!repo.customer_seen_from_ip("c3", "10.0.0.1").await.unwrap());
}
