//! Outbox error types.

use crate::EventId;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a bus sender.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Network or broker unreachable. Retried on the next cycle.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credentials or permissions rejected. Retried, but usually persists
    /// until configuration is fixed.
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Broker asked us to slow down.
    #[error("Throttled by broker{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    Throttled {
        /// Server-provided backoff hint, if any.
        retry_after: Option<Duration>,
    },
}

impl BusError {
    /// Whether the failure is expected to clear on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Throttled { .. })
    }
}

/// Failure reported by an event source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Event disappeared between fetch and mark.
    #[error("Event not found: {0}")]
    NotFound(EventId),

    /// Backing store could not be reached.
    #[error("Event source unavailable: {0}")]
    Unavailable(String),
}

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Bus transport error
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Event source error
    #[error(transparent)]
    Source(#[from] SourceError),

    /// No connection settings for a destination
    #[error("Unknown destination: {0}")]
    UnknownDestination(String),

    /// Dispatch cycle exceeded its budget
    #[error("Dispatch cycle timed out after {}ms", .0.as_millis())]
    SchedulerTimeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
