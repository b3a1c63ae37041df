use std::sync::Arc;
use std::time::Duration;

use quarry_adapters::mysql::MysqlDriver;
use quarry_core::driver::{ConnConfig, DbDriver, DbSession, DriverError};
use quarry_core::query_job::CancellationToken;

fn mysql_integration_enabled() -> bool {
    matches!(
        std::env::var("QUARRY_RUN_MYSQL_INTEGRATION").ok().as_deref(),
        Some("1")
    )
}

fn integration_config(database: &str) -> ConnConfig {
    ConnConfig {
        host: std::env::var("QUARRY_TEST_DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: std::env::var("QUARRY_TEST_DB_PORT")
            .ok()
            .and_then(|raw| raw.parse::<u16>().ok())
            .unwrap_or(3306),
        username: std::env::var("QUARRY_TEST_DB_USER").unwrap_or_else(|_| "root".to_string()),
        password: std::env::var("QUARRY_TEST_DB_PASSWORD").unwrap_or_default(),
        database: database.to_string(),
    }
}

async fn execute_sql(session: &Arc<dyn DbSession>, sql: &str) {
    session
        .query(sql, 1000, 0, &CancellationToken::new())
        .await
        .expect("statement should succeed");
}

#[tokio::test(flavor = "current_thread")]
async fn mysql_session_connection_schema_and_query_paths() {
    if !mysql_integration_enabled() {
        return;
    }

    let database = "quarry_adapters_cov";
    let driver = MysqlDriver;

    let admin = driver
        .connect(&integration_config(""))
        .await
        .expect("admin connect should succeed");
    execute_sql(&admin, &format!("CREATE DATABASE IF NOT EXISTS `{database}`")).await;
    admin.close().await.expect("admin close should succeed");

    let session = driver
        .connect(&integration_config(database))
        .await
        .expect("connect should succeed");
    session.set_timeout(Duration::from_secs(10));
    session.ping().await.expect("ping should succeed");

    execute_sql(&session, "DROP TABLE IF EXISTS integration_users").await;
    execute_sql(
        &session,
        "CREATE TABLE integration_users (\
         id BIGINT NOT NULL PRIMARY KEY,\
         email VARCHAR(64) NOT NULL,\
         age INT NULL\
         )",
    )
    .await;
    let inserted = session
        .query(
            "INSERT INTO integration_users (id, email, age) VALUES \
             (1, 'a@example.com', 22), (2, 'b@example.com', NULL), (3, 'c@example.com', 40)",
            1000,
            0,
            &CancellationToken::new(),
        )
        .await
        .expect("insert should succeed");
    assert!(inserted.columns.is_empty());
    assert_eq!(inserted.row_count, 3);

    let schemas = session
        .list_schemas()
        .await
        .expect("schema listing should succeed");
    let schema = schemas
        .iter()
        .find(|schema| schema.name == database)
        .expect("database should be listed");
    assert!(schema
        .tables
        .iter()
        .any(|table| table.name == "integration_users"));
    assert!(schemas.iter().all(|schema| schema.name != "mysql"));

    let first_page = session
        .query(
            "SELECT id, email, age FROM integration_users ORDER BY id",
            2,
            0,
            &CancellationToken::new(),
        )
        .await
        .expect("first page should load");
    assert_eq!(first_page.columns, vec!["id", "email", "age"]);
    assert_eq!(first_page.row_count, 2);
    assert!(first_page.has_more);
    assert_eq!(first_page.rows[1][2].to_string(), "NULL");

    let second_page = session
        .query(
            "SELECT id, email, age FROM integration_users ORDER BY id",
            2,
            2,
            &CancellationToken::new(),
        )
        .await
        .expect("second page should load");
    assert_eq!(second_page.row_count, 1);
    assert!(!second_page.has_more);
    assert_eq!(second_page.rows[0][0].to_string(), "3");

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = session
        .query("SELECT id FROM integration_users", 10, 0, &cancelled)
        .await
        .expect_err("cancelled query should stop");
    assert_eq!(err, DriverError::Cancelled);

    execute_sql(&session, "DROP TABLE IF EXISTS integration_users").await;
    session.close().await.expect("close should succeed");
    let closed = session.ping().await.expect_err("closed session rejects work");
    assert_eq!(closed, DriverError::Closed);
}
