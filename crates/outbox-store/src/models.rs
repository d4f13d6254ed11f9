//! Outbox row types.

use integration_outbox::DeliveryState;
use serde::{Deserialize, Serialize};

/// An integration event a producer wants published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIntegrationEvent {
    pub event_name: String,
    pub minor_version: u32,
    pub destination: String,
    pub payload: Vec<u8>,
    pub partition_key: Option<String>,
}

impl NewIntegrationEvent {
    pub fn new(
        destination: impl Into<String>,
        event_name: impl Into<String>,
        minor_version: u32,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            minor_version,
            destination: destination.into(),
            payload: payload.into(),
            partition_key: None,
        }
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }
}

/// Number of outbox rows per delivery state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxCounts {
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
}

impl OutboxCounts {
    pub(crate) fn add(&mut self, state: DeliveryState, count: u64) {
        match state {
            DeliveryState::Pending => self.pending += count,
            DeliveryState::Sent => self.sent += count,
            DeliveryState::Failed => self.failed += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.sent + self.failed
    }
}
