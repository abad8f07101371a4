//! Integration tests against a live PostgreSQL server.
//!
//! These tests need a reachable database and are ignored by default. Point
//! `TEST_DATABASE_URL` at a scratch database and run with
//! `cargo test -- --ignored` to exercise them. Each test creates its own
//! uniquely named table and drops it on the way out.

use std::sync::Arc;

use pg_schema_cache::config::{CatalogFilter, PoolSettings};
use pg_schema_cache::models::QueryParam;
use pg_schema_cache::{DbError, DbService, SchemaManager};

fn test_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must point at a scratch PostgreSQL database")
}

async fn setup() -> (Arc<DbService>, String) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let service = Arc::new(DbService::new(PoolSettings::default()));
    let identity = service.register(&test_url()).await.unwrap();
    (service, identity)
}

/// Unique table name per test run so parallel runs do not collide.
fn scratch_table(prefix: &str) -> String {
    format!("{prefix}_{}", std::process::id())
}

#[tokio::test]
#[ignore]
async fn test_read_only_transaction_rejects_writes() {
    let (service, identity) = setup().await;
    let table = scratch_table("ro_guard");

    service
        .execute_non_query(
            &identity,
            false,
            &format!("CREATE TABLE {table} (id bigint PRIMARY KEY)"),
            &[],
        )
        .await
        .unwrap();

    let err = service
        .execute_non_query(
            &identity,
            true,
            &format!("INSERT INTO {table} (id) VALUES (1)"),
            &[],
        )
        .await
        .unwrap_err();

    // 25006 = read_only_sql_transaction, raised by the server itself.
    match &err {
        DbError::Statement { code, .. } => assert_eq!(code.as_deref(), Some("25006")),
        other => panic!("expected Statement error, got {other:?}"),
    }

    let rows = service
        .execute_query(&identity, true, &format!("SELECT count(*) AS n FROM {table}"), &[])
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], serde_json::json!(0));

    service
        .execute_non_query(&identity, false, &format!("DROP TABLE {table}"), &[])
        .await
        .unwrap();
    service.close_all().await;
}

#[tokio::test]
#[ignore]
async fn test_failed_statement_leaves_no_partial_effect() {
    let (service, identity) = setup().await;
    let table = scratch_table("atomicity");

    service
        .execute_non_query(
            &identity,
            false,
            &format!("CREATE TABLE {table} (id bigint PRIMARY KEY)"),
            &[],
        )
        .await
        .unwrap();

    // The second row violates the primary key; the statement's transaction
    // rolls back, so the first row must not be visible either.
    let err = service
        .execute_non_query(
            &identity,
            false,
            &format!("INSERT INTO {table} (id) VALUES (1), (1)"),
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Statement { .. }));

    let rows = service
        .execute_query(&identity, true, &format!("SELECT count(*) AS n FROM {table}"), &[])
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], serde_json::json!(0));

    service
        .execute_non_query(&identity, false, &format!("DROP TABLE {table}"), &[])
        .await
        .unwrap();
    service.close_all().await;
}

#[tokio::test]
#[ignore]
async fn test_parameter_binding_and_column_order() {
    let (service, identity) = setup().await;

    let rows = service
        .execute_query(
            &identity,
            true,
            "SELECT $1::bigint AS first, $2::text AS second, $3::boolean AS third",
            &[
                QueryParam::Int(7),
                QueryParam::from("hello"),
                QueryParam::Bool(true),
            ],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let keys: Vec<&String> = rows[0].keys().collect();
    assert_eq!(keys, ["first", "second", "third"]);
    assert_eq!(rows[0]["first"], serde_json::json!(7));
    assert_eq!(rows[0]["second"], serde_json::json!("hello"));
    assert_eq!(rows[0]["third"], serde_json::json!(true));

    service.close_all().await;
}

#[tokio::test]
#[ignore]
async fn test_concurrent_get_pool_builds_one_pool() {
    let (service, identity) = setup().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        let identity = identity.clone();
        handles.push(tokio::spawn(async move {
            service.get_pool(&identity).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(service.pools_created(), 1);
    assert_eq!(service.pool_count().await, 1);

    service.close_all().await;
}

#[tokio::test]
#[ignore]
async fn test_close_all_then_reregister_recreates_pool() {
    let (service, identity) = setup().await;

    service.get_pool(&identity).await.unwrap();
    service.close_all().await;
    assert_eq!(service.pool_count().await, 0);

    // Registration is gone after close_all; the same string converges to
    // the same identity again.
    let again = service.register(&test_url()).await.unwrap();
    assert_eq!(again, identity);
    service.get_pool(&identity).await.unwrap();
    assert_eq!(service.pools_created(), 2);

    service.close_all().await;
}

#[tokio::test]
#[ignore]
async fn test_schema_crawl_describes_created_table() {
    let (service, identity) = setup().await;
    let parent = scratch_table("crawl_parent");
    let child = scratch_table("crawl_child");

    service
        .execute_non_query(
            &identity,
            false,
            &format!(
                "CREATE TABLE {parent} (
                     id bigint PRIMARY KEY,
                     email text NOT NULL UNIQUE
                 )"
            ),
            &[],
        )
        .await
        .unwrap();
    service
        .execute_non_query(
            &identity,
            false,
            &format!(
                "CREATE TABLE {child} (
                     id bigint PRIMARY KEY,
                     parent_id bigint NOT NULL REFERENCES {parent} (id)
                 )"
            ),
            &[],
        )
        .await
        .unwrap();

    let manager = SchemaManager::new(Arc::clone(&service), CatalogFilter::permissive());
    manager.load_schema(&identity).await.unwrap();

    let table = manager
        .get_table_info("public", &parent)
        .await
        .expect("crawled table should be present");
    let id_col = table.columns.iter().find(|c| c.name == "id").unwrap();
    assert!(!id_col.nullable);
    assert!(id_col
        .constraints
        .contains(&pg_schema_cache::models::ColumnConstraint::PrimaryKey));
    let email_col = table.columns.iter().find(|c| c.name == "email").unwrap();
    assert!(email_col
        .constraints
        .contains(&pg_schema_cache::models::ColumnConstraint::Unique));
    assert!(table.indexes.iter().any(|i| i.is_primary));

    let child_table = manager.get_table_info("public", &child).await.unwrap();
    let fk = &child_table.foreign_keys[0];
    assert_eq!(fk.columns, vec!["parent_id"]);
    assert_eq!(fk.referenced_table, parent);
    assert_eq!(fk.referenced_columns, vec!["id"]);

    service
        .execute_non_query(&identity, false, &format!("DROP TABLE {child}"), &[])
        .await
        .unwrap();
    service
        .execute_non_query(&identity, false, &format!("DROP TABLE {parent}"), &[])
        .await
        .unwrap();
    service.close_all().await;
}
