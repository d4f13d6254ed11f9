//! Integration event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identity of an integration event.
///
/// Carried on every outbound message so consumers can deduplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Delivery state of an event held by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

impl Default for DeliveryState {
    fn default() -> Self {
        Self::Pending
    }
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// An integration event waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub id: EventId,
    /// Logical event name, used as the message subject.
    pub event_name: String,
    /// Minor schema version of the payload.
    pub minor_version: u32,
    /// Logical destination the event is published to.
    pub destination: String,
    pub payload: Vec<u8>,
    /// Session/partition key for ordered entities.
    pub partition_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: DeliveryState,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingEvent {
    /// Create a new pending event with a fresh id.
    pub fn new(
        destination: impl Into<String>,
        event_name: impl Into<String>,
        minor_version: u32,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_name: event_name.into(),
            minor_version,
            destination: destination.into(),
            payload: payload.into(),
            partition_key: None,
            created_at: Utc::now(),
            state: DeliveryState::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }
}
