// Live-server tests. Run with:
//   BROWSEROSO_TEST_CONNECTION="Server=localhost;User ID=sa;Password=...;TrustServerCertificate=yes" \
//   cargo test --test integration -- --ignored

use browseroso::{CellValue, Connection, SessionRegistry};
use std::time::Duration;

fn test_descriptor() -> Option<String> {
    std::env::var("BROWSEROSO_TEST_CONNECTION").ok()
}

async fn connected() -> Option<Connection> {
    let descriptor = test_descriptor()?;
    let conn = Connection::with_login_timeout(Duration::from_secs(15));
    conn.connect(&descriptor).await.expect("connect to test server");
    Some(conn)
}

#[tokio::test]
#[ignore]
async fn test_connect_and_list_databases() {
    let Some(conn) = connected().await else {
        return;
    };

    assert!(conn.is_connected().await);
    let databases = conn.list_databases().await.unwrap();
    assert!(databases.iter().any(|d| d == "master"));

    let mut sorted = databases.clone();
    sorted.sort();
    assert_eq!(databases, sorted);

    conn.disconnect().await;
    assert!(!conn.is_connected().await);
}

#[tokio::test]
#[ignore]
async fn test_use_database_updates_info() {
    let Some(conn) = connected().await else {
        return;
    };

    conn.use_database("tempdb").await.unwrap();
    assert_eq!(conn.connection_info().await, "Connected to tempdb");

    assert!(conn.use_database("no;such").await.is_err());
    assert_eq!(conn.connection_info().await, "Connected to tempdb");

    let masked = conn.masked_descriptor().await.unwrap();
    assert!(masked.contains("tempdb"));
}

#[tokio::test]
#[ignore]
async fn test_tables_and_columns() {
    let Some(conn) = connected().await else {
        return;
    };
    conn.use_database("master").await.unwrap();

    let tables = conn.list_tables().await.unwrap();
    assert!(tables
        .iter()
        .all(|t| t.schema_name != "sys" && t.schema_name != "INFORMATION_SCHEMA"));

    let missing = conn.list_columns("dbo", "definitely_missing").await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_select_system_view_paging() {
    let Some(conn) = connected().await else {
        return;
    };
    conn.use_database("master").await.unwrap();

    let columns = conn.list_columns("INFORMATION_SCHEMA", "TABLES").await.unwrap();
    assert!(columns.iter().any(|c| c.name == "TABLE_NAME"));

    let first = conn
        .select_data("INFORMATION_SCHEMA", "COLUMNS", "", "", 1, 5)
        .await;
    assert!(first.success, "{:?}", first.error);
    assert!(first.rows.len() <= 5);
    assert_eq!(first.total_pages, (first.total_rows + 4) / 5);
    assert!(first.columns.contains(&"COLUMN_NAME".to_string()));

    let filtered = conn
        .select_data("INFORMATION_SCHEMA", "COLUMNS", "COLUMN_NAME", "TABLE", 1, 50)
        .await;
    assert!(filtered.success, "{:?}", filtered.error);
    assert!(filtered.total_rows <= first.total_rows);
    for row in &filtered.rows {
        let (_, value) = row
            .iter()
            .find(|(name, _)| name == "COLUMN_NAME")
            .unwrap();
        assert!(value.as_text().unwrap().to_uppercase().contains("TABLE"));
    }

    let beyond = conn
        .select_data("INFORMATION_SCHEMA", "COLUMNS", "", "", 1_000_000, 5)
        .await;
    assert!(beyond.success);
    assert!(beyond.rows.is_empty());

    let rejected = conn
        .select_data("INFORMATION_SCHEMA", "COLUMNS; DROP", "", "", 1, 5)
        .await;
    assert!(!rejected.success);
    assert_eq!(rejected.error.as_deref(), Some("Invalid table or schema name"));
}

#[tokio::test]
#[ignore]
async fn test_nulls_stay_nulls() {
    let Some(conn) = connected().await else {
        return;
    };
    conn.use_database("master").await.unwrap();

    // CHARACTER_MAXIMUM_LENGTH is NULL for numeric columns.
    let result = conn
        .select_data("INFORMATION_SCHEMA", "COLUMNS", "DATA_TYPE", "int", 1, 20)
        .await;
    assert!(result.success, "{:?}", result.error);
    let has_null = result.rows.iter().any(|row| {
        row.iter()
            .any(|(name, value)| name == "CHARACTER_MAXIMUM_LENGTH" && *value == CellValue::Null)
    });
    assert!(has_null);
}

#[tokio::test]
#[ignore]
async fn test_registry_sessions_are_independent() {
    let Some(descriptor) = test_descriptor() else {
        return;
    };
    let registry = SessionRegistry::with_login_timeout(Duration::from_secs(15));

    let alice = registry.get_connection("alice").await;
    alice.connect(&descriptor).await.unwrap();
    alice.use_database("tempdb").await.unwrap();

    let bob = registry.get_connection("bob").await;
    assert!(registry.has_connection("alice").await);
    assert!(!registry.has_connection("bob").await);
    assert_eq!(bob.connection_info().await, "Not connected");

    assert!(registry.remove_connection("alice").await);
    alice.disconnect().await;
}
