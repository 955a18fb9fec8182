// Driver Handles
// Owned wrappers around the three kinds of native driver resources.
// Each handle holds at most one resource and gives it back exactly once,
// either through `release` or when the handle goes out of scope.

use crate::db::connection_string::NativeConnectString;
use crate::db::types::DatabaseError;
use futures::TryStreamExt;
use std::fmt;
use std::time::Duration;
use tiberius::{Client, Config, QueryItem, QueryStream, Row, SqlBrowser, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, trace};

/// Type alias for a raw (non-pooled) TDS client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// The kinds of native resource a handle can own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Environment,
    Connection,
    Statement,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Environment => "environment",
            HandleKind::Connection => "connection",
            HandleKind::Statement => "statement",
        };
        f.write_str(name)
    }
}

/// A native driver resource that can be owned by a [`Handle`].
pub trait NativeResource {
    const KIND: HandleKind;

    /// Give the resource back to the driver.
    fn release(self)
    where
        Self: Sized,
    {
    }
}

/// Owns zero or one native resource of kind `R::KIND`.
pub struct Handle<R: NativeResource> {
    resource: Option<R>,
}

impl<R: NativeResource> Handle<R> {
    /// A handle that owns nothing yet
    pub fn empty() -> Self {
        Self { resource: None }
    }

    pub fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// Take ownership of `resource`, releasing whatever was held before.
    pub fn acquire(&mut self, resource: R) {
        self.release();
        self.resource = Some(resource);
    }

    pub fn is_acquired(&self) -> bool {
        self.resource.is_some()
    }

    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut R> {
        self.resource.as_mut()
    }

    /// Move the resource out without releasing it.
    pub fn take(&mut self) -> Option<R> {
        self.resource.take()
    }

    /// Release the resource if one is held. Returns whether anything was released.
    pub fn release(&mut self) -> bool {
        match self.resource.take() {
            Some(resource) => {
                trace!(kind = %R::KIND, "releasing handle");
                resource.release();
                true
            }
            None => false,
        }
    }
}

impl<R: NativeResource> Default for Handle<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: NativeResource> Drop for Handle<R> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Driver environment: the translated configuration every connection is opened from
pub struct Environment {
    native: NativeConnectString,
    config: Config,
    login_timeout: Duration,
}

impl Environment {
    pub fn new(native: NativeConnectString, login_timeout: Duration) -> Result<Self, DatabaseError> {
        let config = native.to_tiberius_config()?;
        Ok(Self {
            native,
            config,
            login_timeout,
        })
    }

    pub fn native(&self) -> &NativeConnectString {
        &self.native
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn login_timeout(&self) -> Duration {
        self.login_timeout
    }
}

impl NativeResource for Environment {
    const KIND: HandleKind = HandleKind::Environment;
}

/// An open TDS session with the server
pub struct DriverConnection {
    client: MssqlClient,
}

impl DriverConnection {
    /// Open a session, bounded by the environment's login timeout.
    pub async fn open(env: &Environment) -> Result<Self, DatabaseError> {
        debug!(target_addr = %env.config().get_addr(), "opening driver connection");

        tokio::time::timeout(env.login_timeout(), Self::login(env.config().clone()))
            .await
            .map_err(|_| DatabaseError::Timeout)?
    }

    async fn login(config: Config) -> Result<Self, DatabaseError> {
        let tcp = TcpStream::connect_named(&config).await?;
        tcp.set_nodelay(true)?;

        match Client::connect(config.clone(), tcp.compat_write()).await {
            Ok(client) => Ok(Self { client }),
            // Gateways (Azure SQL) may redirect the login to another node once.
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!(%host, port, "following server routing redirect");
                let mut config = config;
                config.host(&host);
                config.port(port);

                let tcp = TcpStream::connect(config.get_addr()).await?;
                tcp.set_nodelay(true)?;

                let client = Client::connect(config, tcp.compat_write()).await?;
                Ok(Self { client })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn client(&mut self) -> &mut MssqlClient {
        &mut self.client
    }

    /// Log out and close the socket.
    pub async fn close(self) -> Result<(), DatabaseError> {
        self.client.close().await?;
        Ok(())
    }
}

impl NativeResource for DriverConnection {
    const KIND: HandleKind = HandleKind::Connection;
}

/// An executed statement with its result cursor still open
pub struct Statement<'c> {
    stream: QueryStream<'c>,
}

impl<'c> Statement<'c> {
    /// Execute `sql` with positional `@P1..` parameters.
    pub async fn execute(
        conn: &'c mut DriverConnection,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Statement<'c>, DatabaseError> {
        debug!(sql, params = params.len(), "executing statement");
        let stream = conn.client.query(sql.to_string(), params).await?;
        Ok(Self { stream })
    }

    /// Send `sql` as a plain batch. Session-level statements such as `USE`
    /// must go this way, parameterized execution scopes them to the call.
    pub async fn execute_batch(
        conn: &'c mut DriverConnection,
        sql: &str,
    ) -> Result<Statement<'c>, DatabaseError> {
        debug!(sql, "executing batch");
        let stream = conn.client.simple_query(sql.to_string()).await?;
        Ok(Self { stream })
    }

    /// Names of the result columns, in select-list order.
    pub async fn column_names(&mut self) -> Result<Vec<String>, DatabaseError> {
        let names = self
            .stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        Ok(names)
    }

    /// Next row of the result, or `None` once the cursor is exhausted.
    pub async fn fetch(&mut self) -> Result<Option<Row>, DatabaseError> {
        while let Some(item) = self.stream.try_next().await? {
            if let QueryItem::Row(row) = item {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Drain the cursor.
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>, DatabaseError> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl NativeResource for Statement<'_> {
    const KIND: HandleKind = HandleKind::Statement;
}
