// Browser Configuration
// Runtime knobs for sessions, paging and logging. Defaults match the
// values the core uses when nothing is configured.

use crate::db::{spawn_session_sweeper, DatabaseError, SessionRegistry};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const ENV_PREFIX: &str = "BROWSEROSO_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Seconds allowed for a login before `connect` gives up
    pub login_timeout_secs: u64,
    /// Sessions idle longer than this are evicted
    pub max_idle_secs: u64,
    /// How often the sweeper looks for idle sessions
    pub sweep_interval_secs: u64,
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub log: LogConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            login_timeout_secs: 10,
            max_idle_secs: 3600,
            sweep_interval_secs: 60,
            default_page_size: crate::db::DEFAULT_PAGE_SIZE,
            max_page_size: 1000,
            log: LogConfig::default(),
        }
    }
}

impl BrowserConfig {
    /// Defaults overlaid with `BROWSEROSO_*` environment variables.
    pub fn from_env() -> Result<Self, DatabaseError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DatabaseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(v) = var("LOGIN_TIMEOUT_SECS") {
            config.login_timeout_secs = parse_number("LOGIN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("MAX_IDLE_SECS") {
            config.max_idle_secs = parse_number("MAX_IDLE_SECS", &v)?;
        }
        if let Some(v) = var("SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = parse_number("SWEEP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("DEFAULT_PAGE_SIZE") {
            config.default_page_size = parse_number("DEFAULT_PAGE_SIZE", &v)?;
        }
        if let Some(v) = var("MAX_PAGE_SIZE") {
            config.max_page_size = parse_number("MAX_PAGE_SIZE", &v)?;
        }
        if let Some(v) = var("LOG_LEVEL") {
            config.log.level = Some(v);
        }
        if let Some(v) = var("LOG_FILE") {
            config.log.file = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.login_timeout_secs == 0 {
            return Err(DatabaseError::InvalidConfig(
                "login_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_idle_secs == 0 {
            return Err(DatabaseError::InvalidConfig(
                "max_idle_secs must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(DatabaseError::InvalidConfig(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_page_size < 1 {
            return Err(DatabaseError::InvalidConfig(
                "max_page_size must be at least 1".to_string(),
            ));
        }
        if self.default_page_size < 1 || self.default_page_size > self.max_page_size {
            return Err(DatabaseError::InvalidConfig(format!(
                "default_page_size must be between 1 and {}",
                self.max_page_size
            )));
        }
        Ok(())
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Page size to use for a request: the default when none was asked for,
    /// otherwise the request capped at `max_page_size`. Non-positive sizes
    /// pass through so the query layer can reject them.
    pub fn page_size(&self, requested: Option<i64>) -> i64 {
        match requested {
            None => self.default_page_size,
            Some(size) => size.min(self.max_page_size),
        }
    }

    /// A registry whose connections use the configured login timeout
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::with_login_timeout(self.login_timeout()))
    }

    /// Start the idle-session sweeper for `registry` on the current runtime.
    pub fn spawn_sweeper(&self, registry: Arc<SessionRegistry>) -> JoinHandle<()> {
        spawn_session_sweeper(registry, self.sweep_interval(), self.max_idle_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, DatabaseError> {
    value.trim().parse().map_err(|_| {
        DatabaseError::InvalidConfig(format!("{}{} is not a valid number: {}", ENV_PREFIX, name, value))
    })
}
