//! # Observability
//!
//! Centralized logging setup for outbox relay services.
//!
//! Services call [`init_with_config`] once at startup and use standard
//! `tracing` macros everywhere else. They do not know where logs end up.
//!
//! ## File sink
//!
//! With the default `dev` feature every service appends structured JSONL to
//! one file, `~/.outbox-relay/logs/relay.jsonl` unless overridden:
//!
//! - `tail -f ~/.outbox-relay/logs/relay.jsonl | jq`
//! - `jq 'select(.fields.destination == "orders")'` to follow one destination
//!
//! Several processes may share the file; each line is written and flushed
//! in a single append.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "outbox-relay".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;

pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default filter (e.g. "info", "integration_outbox=debug").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// Custom log file path. Defaults to the shared relay log.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Shared log file location.
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".outbox-relay")
        .join("logs")
        .join("relay.jsonl")
}

/// Initialize logging with default settings for a service.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    install(&config)
}

#[cfg(feature = "dev")]
fn install(config: &LogConfig) -> io::Result<()> {
    dev::init_dev_subscriber(config)
}

#[cfg(not(feature = "dev"))]
fn install(config: &LogConfig) -> io::Result<()> {
    use tracing_subscriber::util::SubscriberInitExt;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_target(true)
        .with_writer(io::stderr)
        .compact()
        .finish()
        .try_init()
        .map_err(io::Error::other)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

pub use tracing::Level;
