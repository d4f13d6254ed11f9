//! Event source port and an in-memory implementation.

use crate::{DeliveryState, EventId, PendingEvent, SourceError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Store of not-yet-published integration events.
///
/// The outbox sender only reads events and requests state transitions;
/// persistence is the source's responsibility.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Return up to `batch_size` pending events in source order.
    async fn fetch_pending(&self, batch_size: usize) -> Result<Vec<PendingEvent>, SourceError>;

    /// Mark an event as delivered. Fails with `NotFound` for unknown ids.
    async fn mark_sent(&self, id: EventId) -> Result<(), SourceError>;

    /// Record a failed delivery attempt and return the resulting state.
    ///
    /// Sources that enforce a retry threshold move the event to `Failed`
    /// once it is reached; otherwise the event stays `Pending`.
    async fn record_failure(&self, id: EventId, error: &str) -> Result<DeliveryState, SourceError>;
}

#[derive(Default)]
struct InMemoryState {
    events: Vec<PendingEvent>,
    mark_sent_calls: HashMap<EventId, usize>,
}

/// Thread-safe, order-preserving in-memory event source.
#[derive(Default)]
pub struct InMemoryEventSource {
    state: Mutex<InMemoryState>,
    /// Attempts after which an event moves to `Failed`. 0 disables.
    max_attempts: u32,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that fails events after `max_attempts` failed sends.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            max_attempts,
        }
    }

    /// Append an event.
    pub fn push(&self, event: PendingEvent) -> EventId {
        let id = event.id;
        self.state.lock().events.push(event);
        id
    }

    /// Drop an event entirely, as if another process deleted it.
    pub fn remove(&self, id: EventId) -> Option<PendingEvent> {
        let mut state = self.state.lock();
        let index = state.events.iter().position(|e| e.id == id)?;
        Some(state.events.remove(index))
    }

    pub fn get(&self, id: EventId) -> Option<PendingEvent> {
        self.state.lock().events.iter().find(|e| e.id == id).cloned()
    }

    pub fn state_of(&self, id: EventId) -> Option<DeliveryState> {
        self.get(id).map(|e| e.state)
    }

    pub fn pending_count(&self) -> usize {
        self.count(DeliveryState::Pending)
    }

    pub fn sent_count(&self) -> usize {
        self.count(DeliveryState::Sent)
    }

    pub fn failed_count(&self) -> usize {
        self.count(DeliveryState::Failed)
    }

    /// How many times `mark_sent` was called for an id.
    pub fn mark_sent_calls(&self, id: EventId) -> usize {
        self.state.lock().mark_sent_calls.get(&id).copied().unwrap_or(0)
    }

    fn count(&self, state: DeliveryState) -> usize {
        self.state.lock().events.iter().filter(|e| e.state == state).count()
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn fetch_pending(&self, batch_size: usize) -> Result<Vec<PendingEvent>, SourceError> {
        let state = self.state.lock();
        Ok(state
            .events
            .iter()
            .filter(|e| e.state == DeliveryState::Pending)
            .take(batch_size)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: EventId) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(SourceError::NotFound(id))?;
        event.state = DeliveryState::Sent;
        *state.mark_sent_calls.entry(id).or_insert(0) += 1;
        Ok(())
    }

    async fn record_failure(&self, id: EventId, error: &str) -> Result<DeliveryState, SourceError> {
        let mut state = self.state.lock();
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(SourceError::NotFound(id))?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        if self.max_attempts > 0 && event.attempts >= self.max_attempts {
            event.state = DeliveryState::Failed;
        }
        Ok(event.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(destination: &str) -> PendingEvent {
        PendingEvent::new(destination, "Something", 1, b"payload".to_vec())
    }

    #[tokio::test]
    async fn test_fetch_respects_order_and_batch_size() {
        let source = InMemoryEventSource::new();
        let ids: Vec<_> = (0..5).map(|_| source.push(event("a"))).collect();

        let batch = source.fetch_pending(3).await.unwrap();
        let fetched: Vec<_> = batch.iter().map(|e| e.id).collect();
        assert_eq!(fetched, ids[..3]);
    }

    #[tokio::test]
    async fn test_sent_events_are_not_refetched() {
        let source = InMemoryEventSource::new();
        let first = source.push(event("a"));
        let second = source.push(event("a"));

        source.mark_sent(first).await.unwrap();

        let batch = source.fetch_pending(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, second);
        assert_eq!(source.mark_sent_calls(first), 1);
    }

    #[tokio::test]
    async fn test_mark_unknown_is_not_found() {
        let source = InMemoryEventSource::new();
        let id = EventId::new();
        assert_eq!(source.mark_sent(id).await, Err(SourceError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_failure_threshold_moves_to_failed() {
        let source = InMemoryEventSource::with_max_attempts(2);
        let id = source.push(event("a"));

        assert_eq!(source.record_failure(id, "boom").await.unwrap(), DeliveryState::Pending);
        assert_eq!(source.record_failure(id, "boom").await.unwrap(), DeliveryState::Failed);
        assert!(source.fetch_pending(10).await.unwrap().is_empty());
        assert_eq!(source.get(id).unwrap().last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_no_threshold_keeps_pending() {
        let source = InMemoryEventSource::new();
        let id = source.push(event("a"));
        for _ in 0..25 {
            source.record_failure(id, "down").await.unwrap();
        }
        assert_eq!(source.state_of(id), Some(DeliveryState::Pending));
        assert_eq!(source.get(id).unwrap().attempts, 25);
    }
}
