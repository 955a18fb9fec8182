//! Logging setup for the browsing core.
//!
//! Initializes a `tracing-subscriber` with file or stderr output.
//!
//! ## Configuration priority
//!
//! 1. [`LogConfig::level`] / [`LogConfig::file`] (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `browseroso=info`
//!
//! ```bash
//! RUST_LOG=browseroso=debug ./server
//! ```

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: "off", "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    pub file: Option<String>,
}

/// Initialize the tracing subscriber.
///
/// Only the first call in a process has any effect, and an already
/// installed global subscriber is left alone.
pub fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        if let Some(ref level) = config.level {
            if level.eq_ignore_ascii_case("off") {
                return;
            }
        }

        let filter = match config.level {
            Some(ref level) => EnvFilter::new(format!("browseroso={}", level.to_lowercase())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("browseroso=info")),
        };

        if let Some(ref path) = config.file {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("browseroso: failed to open log file {}: {}", path, e);
                    return;
                }
            };

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.level.is_none());
        assert!(config.file.is_none());
    }

    #[test]
    fn test_init_is_repeatable() {
        let config = LogConfig {
            level: Some("debug".to_string()),
            file: None,
        };
        init_logging(&config);
        init_logging(&config);
        tracing::debug!("logging initialized twice without panicking");
    }
}
