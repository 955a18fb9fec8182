// Database Module
// Handles SQL Server sessions, schema metadata and paged table reads

// Driver plumbing
pub mod connection_string;
pub mod handle;
pub mod identifier;

// Operations
pub mod query;
pub mod schema;

// Sessions
pub mod connection;
pub mod registry;

pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionState, DEFAULT_LOGIN_TIMEOUT};
pub use connection_string::{ConnectionDescriptor, NativeConnectString, NativeKey, ServerAddress};
pub use handle::{Handle, HandleKind};
pub use query::{PageRequest, DEFAULT_PAGE_SIZE};
pub use registry::{spawn_session_sweeper, SessionRegistry};
pub use types::{CellValue, ColumnInfo, DataRow, DatabaseError, QueryResult, TableInfo};
