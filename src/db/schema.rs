// Schema Introspection
// Queries SQL Server catalog views for databases, tables, columns and keys

use crate::db::handle::{DriverConnection, Statement};
use crate::db::identifier::{is_valid_identifier, quote};
use crate::db::types::{ColumnInfo, DatabaseError, TableInfo};
use tiberius::Row;
use tracing::{debug, warn};

/// Schemas owned by the server itself, never listed as user tables
pub const SYSTEM_SCHEMAS: [&str; 2] = ["sys", "INFORMATION_SCHEMA"];

/// Schema reported for a table whose schema comes back NULL
const DEFAULT_SCHEMA: &str = "dbo";

const DATABASES_QUERY: &str =
    "SELECT name FROM sys.databases WHERE state_desc = 'ONLINE' ORDER BY name";

const TABLES_QUERY: &str = r#"
    SELECT TABLE_SCHEMA, TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_SCHEMA, TABLE_NAME
"#;

// An empty schema argument resolves to the login's default schema.
const COLUMNS_QUERY: &str = r#"
    SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = COALESCE(NULLIF(@P1, ''), SCHEMA_NAME())
      AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT kcu.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
        ON tc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
        AND tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
      AND tc.TABLE_SCHEMA = COALESCE(NULLIF(@P1, ''), SCHEMA_NAME())
      AND tc.TABLE_NAME = @P2
    ORDER BY kcu.ORDINAL_POSITION
"#;

fn text(row: &Row, idx: usize) -> Result<Option<String>, DatabaseError> {
    Ok(row.try_get::<&str, _>(idx)?.map(|s| s.to_string()))
}

/// All online databases on the server, sorted by name
pub async fn list_databases(conn: &mut DriverConnection) -> Result<Vec<String>, DatabaseError> {
    let rows = Statement::execute_batch(conn, DATABASES_QUERY)
        .await?
        .fetch_all()
        .await?;

    let mut databases = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(name) = text(row, 0)? {
            databases.push(name);
        }
    }
    Ok(databases)
}

/// Switch the session's current database.
pub async fn use_database(conn: &mut DriverConnection, name: &str) -> Result<(), DatabaseError> {
    if !is_valid_identifier(name) {
        return Err(DatabaseError::InvalidDatabaseName);
    }

    let sql = format!("USE {}", quote(name));
    Statement::execute_batch(conn, &sql)
        .await?
        .fetch_all()
        .await?;

    debug!(database = name, "switched database");
    Ok(())
}

/// User tables, schema-qualified, with system schemas filtered out
pub async fn list_tables(conn: &mut DriverConnection) -> Result<Vec<TableInfo>, DatabaseError> {
    let rows = Statement::execute_batch(conn, TABLES_QUERY)
        .await?
        .fetch_all()
        .await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some(table_name) = text(row, 1)? else {
            continue;
        };
        let schema_name = text(row, 0)?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

        if is_system_schema(&schema_name) {
            continue;
        }
        tables.push(TableInfo {
            schema_name,
            table_name,
        });
    }
    Ok(tables)
}

pub fn is_system_schema(schema: &str) -> bool {
    SYSTEM_SCHEMAS.contains(&schema)
}

/// Columns of `schema.table` in ordinal order, primary keys flagged.
///
/// The primary-key lookup is best-effort: if it fails the columns are
/// still returned, all marked as non-key.
pub async fn list_columns(
    conn: &mut DriverConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnInfo>, DatabaseError> {
    let mut columns = {
        let rows = Statement::execute(conn, COLUMNS_QUERY, &[&schema, &table])
            .await?
            .fetch_all()
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(name) = text(row, 0)? else {
                continue;
            };
            columns.push(ColumnInfo {
                name,
                data_type: text(row, 1)?.unwrap_or_default(),
                is_nullable: text(row, 2)?.map(|s| s == "YES").unwrap_or(true),
                is_primary_key: false,
            });
        }
        columns
    };

    match primary_key_columns(conn, schema, table).await {
        Ok(keys) => mark_primary_keys(&mut columns, &keys),
        Err(e) => warn!(schema, table, error = %e, "primary key lookup failed"),
    }

    Ok(columns)
}

async fn primary_key_columns(
    conn: &mut DriverConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, DatabaseError> {
    let rows = Statement::execute(conn, PRIMARY_KEY_QUERY, &[&schema, &table])
        .await?
        .fetch_all()
        .await?;

    let mut keys = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(name) = text(row, 0)? {
            keys.push(name);
        }
    }
    Ok(keys)
}

/// Flag every column whose name appears in `keys`.
pub fn mark_primary_keys(columns: &mut [ColumnInfo], keys: &[String]) {
    for key in keys {
        if let Some(column) = columns.iter_mut().find(|c| &c.name == key) {
            column.is_primary_key = true;
        }
    }
}
