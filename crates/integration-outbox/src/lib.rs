//! Reliable delivery of integration events through the outbox pattern.
//!
//! Domain code writes integration events into an outbox alongside its own
//! state changes. A background trigger periodically drains the outbox and
//! publishes each event to its message-bus destination, marking it sent only
//! after the broker acknowledged it. Delivery is at-least-once.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   tick    ┌──────────────┐  fetch/mark  ┌─────────────┐
//! │ RepeatingTrigger │──────────▶│ OutboxSender │─────────────▶│ EventSource │
//! │  (heartbeat)     │           └──────┬───────┘              └─────────────┘
//! └────────┬─────────┘                  │ get_sender / send
//!          │ read                ┌──────▼─────────┐  create   ┌────────────┐
//! ┌────────▼──────────┐          │ SenderProvider │─────────▶│ BusClient  │
//! │ HealthCheck       │          │ (one per dest) │          └────────────┘
//! └───────────────────┘          └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`source`]: the `EventSource` port and an in-memory source
//! - [`message`]: mapping from pending events to outbound bus messages
//! - [`transport`]: the `BusClient`/`BusSender` ports and the HTTP client
//! - [`provider`]: lazily constructed, cached per-destination senders
//! - [`sender`]: the dispatch cycle
//! - [`trigger`]: the non-overlapping periodic runner
//! - [`health`]: heartbeat-based health checks

pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod heartbeat;
pub mod message;
pub mod provider;
pub mod sender;
pub mod source;
pub mod transport;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use config::{DestinationSettings, HealthCheckConfig, OutboxConfig};
pub use error::{BusError, OutboxError, OutboxResult, SourceError};
pub use event::{DeliveryState, EventId, PendingEvent};
pub use health::{
    HealthCheck, HealthRegistry, HealthReport, HealthStatus, RepeatingTriggerHealthCheck,
};
pub use heartbeat::HeartbeatView;
pub use message::{BusMessageFactory, OutboundMessage, DEFAULT_CONTENT_TYPE};
pub use provider::SenderProvider;
pub use sender::{
    DeliveryFailure, DestinationFailure, DispatchResult, OutboxSender, OUTBOX_TRIGGER_NAME,
};
pub use source::{EventSource, InMemoryEventSource};
pub use transport::{BusClient, BusSender, HttpBusClient};
pub use trigger::{
    CycleOutcome, OutboxTrigger, RepeatingTrigger, TriggerHandle, TriggerSettings, TriggerState,
    TriggerStats, TriggerTask,
};
