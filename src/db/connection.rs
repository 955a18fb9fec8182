// Session Connection
// One native session per Connection. Every public operation holds the
// connection lock for its full duration, so work on one connection never
// interleaves.

use crate::db::connection_string::ConnectionDescriptor;
use crate::db::handle::{DriverConnection, Environment, Handle};
use crate::db::query::{self, PageRequest, SelectPlan};
use crate::db::schema;
use crate::db::types::{ColumnInfo, DatabaseError, QueryResult, TableInfo};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Login timeout applied when none is configured
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

struct Inner {
    state: ConnectionState,
    // Field order matters: the session is released before its environment.
    conn: Handle<DriverConnection>,
    env: Handle<Environment>,
    descriptor: Option<ConnectionDescriptor>,
    last_error: Option<String>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            conn: Handle::empty(),
            env: Handle::empty(),
            descriptor: None,
            last_error: None,
        }
    }

    async fn open(&mut self, descriptor: &str, login_timeout: Duration) -> Result<(), DatabaseError> {
        let parsed = ConnectionDescriptor::parse(descriptor);
        let native = parsed.translate();
        debug!(native = %native, "translated connection descriptor");

        let env = Handle::new(Environment::new(native, login_timeout)?);
        let driver = match env.get() {
            Some(e) => DriverConnection::open(e).await?,
            None => return Err(DatabaseError::ConnectionFailed("no driver environment".to_string())),
        };

        self.env = env;
        self.conn = Handle::new(driver);
        self.descriptor = Some(parsed);
        self.state = ConnectionState::Connected;
        self.last_error = None;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "error while closing driver connection");
            }
        }
        self.conn.release();
        self.env.release();
        self.descriptor = None;
        self.state = ConnectionState::Disconnected;
    }

    fn driver(&mut self) -> Result<&mut DriverConnection, DatabaseError> {
        match self.state {
            ConnectionState::Connected => self.conn.get_mut().ok_or(DatabaseError::NotConnected),
            ConnectionState::Disconnected => Err(DatabaseError::NotConnected),
        }
    }

    fn remember<T>(&mut self, result: Result<T, DatabaseError>) -> Result<T, DatabaseError> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }
}

/// Human-readable status line for a connection
pub fn describe(state: ConnectionState, descriptor: Option<&ConnectionDescriptor>) -> String {
    match state {
        ConnectionState::Disconnected => "Not connected".to_string(),
        ConnectionState::Connected => match descriptor.and_then(|d| d.catalog()) {
            Some(catalog) if !catalog.is_empty() => format!("Connected to {}", catalog),
            _ => "Connected".to_string(),
        },
    }
}

/// A database connection owned by one session
pub struct Connection {
    id: Uuid,
    login_timeout: Duration,
    inner: Mutex<Inner>,
}

impl Connection {
    pub fn new() -> Self {
        Self::with_login_timeout(DEFAULT_LOGIN_TIMEOUT)
    }

    pub fn with_login_timeout(login_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            login_timeout,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Open a session from a portable descriptor, dropping any previous one first.
    pub async fn connect(&self, descriptor: &str) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        inner.close().await;

        match inner.open(descriptor, self.login_timeout).await {
            Ok(()) => {
                info!(connection = %self.id, "connected");
                Ok(())
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "connect failed");
                inner.close().await;
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Close the session. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Connected {
            info!(connection = %self.id, "disconnecting");
        }
        inner.close().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Text of the most recent failure, if any
    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.last_error.clone()
    }

    /// All online databases; empty when not connected.
    pub async fn list_databases(&self) -> Result<Vec<String>, DatabaseError> {
        let mut inner = self.inner.lock().await;
        let result = match inner.driver() {
            Ok(driver) => schema::list_databases(driver).await,
            Err(_) => return Ok(Vec::new()),
        };
        inner.remember(result)
    }

    /// Switch the current database and point the stored descriptor at it.
    pub async fn use_database(&self, name: &str) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        let result = match inner.driver() {
            Ok(driver) => schema::use_database(driver, name).await,
            Err(e) => Err(e),
        };

        if result.is_ok() {
            if let Some(descriptor) = inner.descriptor.as_mut() {
                descriptor.set_catalog(name);
            }
        }
        inner.remember(result)
    }

    /// User tables; empty when not connected.
    pub async fn list_tables(&self) -> Result<Vec<TableInfo>, DatabaseError> {
        let mut inner = self.inner.lock().await;
        let result = match inner.driver() {
            Ok(driver) => schema::list_tables(driver).await,
            Err(_) => return Ok(Vec::new()),
        };
        inner.remember(result)
    }

    /// Columns of a table; empty when not connected.
    pub async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let mut inner = self.inner.lock().await;
        let result = match inner.driver() {
            Ok(driver) => schema::list_columns(driver, schema, table).await,
            Err(_) => return Ok(Vec::new()),
        };
        inner.remember(result)
    }

    /// One page of table rows, optionally filtered with `filter_column LIKE %filter_value%`.
    /// Failures are reported inside the result.
    pub async fn select_data(
        &self,
        schema: &str,
        table: &str,
        filter_column: &str,
        filter_value: &str,
        page: i64,
        page_size: i64,
    ) -> QueryResult {
        let mut inner = self.inner.lock().await;
        let request = PageRequest::new(page, page_size);

        let outcome = match inner.driver() {
            Ok(driver) => match SelectPlan::build(schema, table, filter_column, filter_value, request) {
                Ok(plan) => query::select_page(driver, &plan).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match inner.remember(outcome) {
            Ok(result) => result,
            Err(e) => {
                debug!(connection = %self.id, schema, table, error = %e, "select failed");
                QueryResult::with_error(page, page_size, e.to_string())
            }
        }
    }

    /// `"Not connected"`, `"Connected to <catalog>"` or `"Connected"`
    pub async fn connection_info(&self) -> String {
        let inner = self.inner.lock().await;
        describe(inner.state, inner.descriptor.as_ref())
    }

    /// The descriptor in use, password hidden
    pub async fn masked_descriptor(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.descriptor.as_ref().map(|d| d.masked())
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Connection {
    /// Hold the connection lock for `duration` the way a slow query would,
    /// signalling `locked` once it is held.
    pub(crate) async fn hold_lock(&self, locked: tokio::sync::oneshot::Sender<()>, duration: Duration) {
        let _inner = self.inner.lock().await;
        let _ = locked.send(());
        tokio::time::sleep(duration).await;
    }
}
