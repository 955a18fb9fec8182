// Shared data types for the browsing core
// Plain data returned to the serving layer plus the common error type

use serde::{Deserialize, Serialize};

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Not connected to database")]
    NotConnected,

    #[error("Invalid table or schema name")]
    InvalidObjectName,

    #[error("Invalid column name")]
    InvalidColumnName,

    #[error("Invalid database name")]
    InvalidDatabaseName,

    #[error("Invalid page or page size")]
    InvalidPage,

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout error")]
    Timeout,

    /// Diagnostic text reported by the driver or server, verbatim.
    #[error("{0}")]
    Driver(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tiberius::error::Error> for DatabaseError {
    fn from(err: tiberius::error::Error) -> Self {
        match &err {
            tiberius::error::Error::Server(e) => {
                DatabaseError::Driver(format!("{}: {}", e.code(), e.message()))
            }
            _ => DatabaseError::Driver(err.to_string()),
        }
    }
}

/// Table information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
}

/// Column information from introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

/// Cell value in a result set.
///
/// Every non-NULL value is rendered as text, so a stored string `"NULL"`
/// stays distinguishable from a database NULL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Null => None,
            CellValue::Text(s) => Some(s),
        }
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map(CellValue::Text).unwrap_or(CellValue::Null)
    }
}

/// One result row: `(column name, value)` pairs in select-list order
pub type DataRow = Vec<(String, CellValue)>;

/// Page of table data returned by `select_data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<DataRow>,
    pub total_rows: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub success: bool,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            total_rows: 0,
            page,
            page_size,
            total_pages: 0,
            success: false,
            error: None,
        }
    }

    pub fn with_error(page: i64, page_size: i64, error: String) -> Self {
        let mut result = Self::new(page, page_size);
        result.error = Some(error);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(DatabaseError::NotConnected.to_string(), "Not connected to database");
        assert_eq!(
            DatabaseError::InvalidObjectName.to_string(),
            "Invalid table or schema name"
        );
        assert_eq!(DatabaseError::InvalidColumnName.to_string(), "Invalid column name");
        assert_eq!(
            DatabaseError::Driver("42S02: Invalid object name 'X'.".to_string()).to_string(),
            "42S02: Invalid object name 'X'."
        );
    }

    #[test]
    fn test_null_is_distinct_from_null_string() {
        let null = CellValue::Null;
        let text = CellValue::Text("NULL".to_string());

        assert_ne!(null, text);
        assert!(null.is_null());
        assert_eq!(text.as_text(), Some("NULL"));
        assert_eq!(serde_json::to_string(&null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&text).unwrap(), "\"NULL\"");
    }

    #[test]
    fn test_cell_from_option() {
        assert_eq!(CellValue::from(None), CellValue::Null);
        assert_eq!(
            CellValue::from(Some("abc".to_string())),
            CellValue::Text("abc".to_string())
        );
    }

    #[test]
    fn test_query_result_with_error() {
        let result = QueryResult::with_error(1, 10, "boom".to_string());
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.rows.is_empty());
        assert_eq!(result.total_rows, 0);
    }
}
