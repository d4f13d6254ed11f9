//! Conversion of integration events into bus messages.

use crate::PendingEvent;
use chrono::SecondsFormat;
use std::collections::BTreeMap;

/// Application property carrying the event id.
pub const PROPERTY_EVENT_ID: &str = "EventIdentification";
/// Application property carrying the event name.
pub const PROPERTY_EVENT_NAME: &str = "EventName";
/// Application property carrying the payload minor version.
pub const PROPERTY_MINOR_VERSION: &str = "EventMinorVersion";
/// Application property carrying the event creation time (RFC 3339).
pub const PROPERTY_CREATED_AT: &str = "CreatedAt";

/// Default content type for opaque payloads.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A wire message derived from a pending event. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Broker-level message id. Always the event id, so re-sends dedupe.
    pub message_id: String,
    pub subject: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub application_properties: BTreeMap<String, String>,
    pub session_id: Option<String>,
    pub partition_key: Option<String>,
}

/// Builds bus messages from pending events.
///
/// Conversion is pure: the same event always yields the same message.
#[derive(Debug, Clone)]
pub struct BusMessageFactory {
    content_type: String,
}

impl Default for BusMessageFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_TYPE)
    }
}

impl BusMessageFactory {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }

    pub fn to_message(&self, event: &PendingEvent) -> OutboundMessage {
        let id = event.id.to_string();

        let mut properties = BTreeMap::new();
        properties.insert(PROPERTY_EVENT_ID.to_string(), id.clone());
        properties.insert(PROPERTY_EVENT_NAME.to_string(), event.event_name.clone());
        properties.insert(
            PROPERTY_MINOR_VERSION.to_string(),
            event.minor_version.to_string(),
        );
        properties.insert(
            PROPERTY_CREATED_AT.to_string(),
            event.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        OutboundMessage {
            message_id: id,
            subject: event.event_name.clone(),
            body: event.payload.clone(),
            content_type: self.content_type.clone(),
            application_properties: properties,
            // Session-enabled entities require both keys to match.
            session_id: event.partition_key.clone(),
            partition_key: event.partition_key.clone(),
        }
    }
}
