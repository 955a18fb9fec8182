//! Session-scoped SQL Server browsing core.
//!
//! Each caller session owns one [`Connection`], looked up through a
//! [`SessionRegistry`] that evicts idle sessions. A connection can list
//! databases, tables and columns, switch databases, and read tables one
//! page at a time with an optional `LIKE` filter.

pub mod config;
pub mod db;
pub mod logging;

pub use config::BrowserConfig;
pub use db::{
    spawn_session_sweeper, CellValue, ColumnInfo, Connection, ConnectionState, DataRow,
    DatabaseError, QueryResult, SessionRegistry, TableInfo,
};
pub use logging::{init_logging, LogConfig};
