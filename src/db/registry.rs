// Session Registry
// Maps session identifiers to their Connection and evicts idle sessions.
// The map lock is only held for lookup/insert/erase, never across queries.

use crate::db::connection::{Connection, DEFAULT_LOGIN_TIMEOUT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A connection plus the last time its session was looked up
struct Session {
    connection: Arc<Connection>,
    last_access: Instant,
}

/// Registry for per-session connections
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    login_timeout: Duration,
}

impl SessionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::with_login_timeout(DEFAULT_LOGIN_TIMEOUT)
    }

    /// Registry whose connections use `login_timeout` when connecting
    pub fn with_login_timeout(login_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            login_timeout,
        }
    }

    /// Get the session's connection, creating an empty one on first use.
    /// Refreshes the session's last-access time.
    pub async fn get_connection(&self, session_id: &str) -> Arc<Connection> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();

        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session = session_id, "creating session");
            Session {
                connection: Arc::new(Connection::with_login_timeout(self.login_timeout)),
                last_access: now,
            }
        });
        session.last_access = now;
        Arc::clone(&session.connection)
    }

    /// True if the session exists and its connection is live
    pub async fn has_connection(&self, session_id: &str) -> bool {
        let connection = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).map(|s| Arc::clone(&s.connection))
        };

        match connection {
            Some(connection) => connection.is_connected().await,
            None => false,
        }
    }

    /// Drop a session. Its connection closes once no caller still holds it.
    pub async fn remove_connection(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(session_id).is_some();
        if removed {
            debug!(session = session_id, "removed session");
        }
        removed
    }

    /// Remove every session idle for more than `max_idle_seconds` whole
    /// seconds; partial seconds of idle time are not counted.
    /// Returns how many were removed.
    pub async fn cleanup_expired_sessions(&self, max_idle_seconds: u64) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();

        let before = sessions.len();
        sessions.retain(|_, session| {
            now.duration_since(session.last_access).as_secs() <= max_idle_seconds
        });
        let removed = before - sessions.len();

        if removed > 0 {
            info!(removed, remaining = sessions.len(), "evicted idle sessions");
        }
        removed
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shortest period the sweeper runs at
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn a background task that evicts idle sessions every `every`,
/// raised to [`MIN_SWEEP_INTERVAL`] if shorter.
pub fn spawn_session_sweeper(
    registry: Arc<SessionRegistry>,
    every: Duration,
    max_idle_seconds: u64,
) -> JoinHandle<()> {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            registry.cleanup_expired_sessions(max_idle_seconds).await;
        }
    })
}
