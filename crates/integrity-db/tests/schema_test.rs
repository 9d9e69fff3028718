//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    integrity_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    assert!(info_str.contains("audit_log"), "missing audit_log table");
    assert!(
        info_str.contains("device_session"),
        "missing device_session table"
    );
    assert!(
        info_str.contains("suspicious_activity"),
        "missing suspicious_activity table"
    );
    assert!(
        info_str.contains("user_restriction"),
        "missing user_restriction table"
    );
    assert!(
        info_str.contains("account_flag"),
        "missing account_flag table"
    );
    assert!(info_str.contains("_migration"), "missing _migration table");
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    integrity_db::run_migrations(&db).await.unwrap();
    integrity_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 1, "expected exactly one migration record");
}

#[tokio::test]
async fn restriction_type_is_constrained() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    integrity_db::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE user_restriction SET customer_id = 'c1', \
             restriction_type = 'SHADOW_BAN', reason = 'x', \
             start_date = time::now(), imposed_by = 'admin', \
             appeal_status = 'NONE'",
        )
        .await
        .unwrap();
    assert!(result.check().is_err(), "unknown restriction type accepted");
}
