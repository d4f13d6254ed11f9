//! Outbox sender: pull pending events, publish them, mark them sent.

use crate::trigger::TriggerTask;
use crate::{
    BusClient, BusError, BusMessageFactory, DeliveryState, EventId, EventSource, OutboxConfig,
    OutboxResult, PendingEvent, SenderProvider, SourceError,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Name the outbox trigger registers its heartbeat under.
pub const OUTBOX_TRIGGER_NAME: &str = "outbox-sender";

/// A single event that could not be delivered this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub event_id: EventId,
    pub destination: String,
    pub error: String,
    /// State the source reported after the failure was recorded.
    pub state: DeliveryState,
}

/// A destination that could not be used at all this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationFailure {
    pub destination: String,
    pub error: String,
}

/// Summary of one dispatch cycle.
#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    /// Sends attempted.
    pub attempted: usize,
    /// Sends acknowledged by the bus.
    pub succeeded: usize,
    /// Sends that failed; the events stay in the source for retry.
    pub failed: usize,
    /// Events skipped because their destination was unusable or throttled.
    pub deferred: usize,
    pub failures: Vec<DeliveryFailure>,
    pub destination_failures: Vec<DestinationFailure>,
    pub elapsed: Duration,
}

impl DispatchResult {
    /// Whether this cycle should refresh the heartbeat.
    ///
    /// Per-event failures that leave events pending for retry are fine;
    /// a destination that could not be used at all is not.
    pub fn is_successful_cycle(&self) -> bool {
        self.destination_failures.is_empty()
    }
}

/// Orchestrates one outbox delivery pass.
pub struct OutboxSender {
    source: Arc<dyn EventSource>,
    provider: Arc<SenderProvider>,
    factory: BusMessageFactory,
    batch_size: usize,
}

impl OutboxSender {
    pub fn new(
        source: Arc<dyn EventSource>,
        provider: Arc<SenderProvider>,
        factory: BusMessageFactory,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            provider,
            factory,
            batch_size,
        }
    }

    /// Build a sender, provider and factory from configuration.
    pub fn from_config(
        source: Arc<dyn EventSource>,
        client: Arc<dyn BusClient>,
        config: &OutboxConfig,
    ) -> Self {
        let provider = Arc::new(SenderProvider::new(client, config.destinations.clone()));
        Self::new(
            source,
            provider,
            BusMessageFactory::new(config.content_type.clone()),
            config.batch_size,
        )
    }

    pub fn provider(&self) -> &Arc<SenderProvider> {
        &self.provider
    }

    /// Run one delivery pass over the current batch of pending events.
    ///
    /// Per-event failures never abort the batch. An error is returned only
    /// when the batch itself could not be fetched.
    pub async fn dispatch(&self) -> OutboxResult<DispatchResult> {
        let started = Instant::now();
        let events = self.source.fetch_pending(self.batch_size).await?;
        let mut result = DispatchResult::default();

        if events.is_empty() {
            debug!("No pending integration events");
            result.elapsed = started.elapsed();
            return Ok(result);
        }

        // Destinations skipped for the remainder of this cycle.
        let mut blocked: HashSet<String> = HashSet::new();

        for event in events {
            if blocked.contains(&event.destination) {
                result.deferred += 1;
                continue;
            }

            let sender = match self.provider.get_sender(&event.destination).await {
                Ok(sender) => sender,
                Err(e) => {
                    error!(
                        destination = %event.destination,
                        error = %e,
                        "Could not obtain bus sender"
                    );
                    result.destination_failures.push(DestinationFailure {
                        destination: event.destination.clone(),
                        error: e.to_string(),
                    });
                    result.deferred += 1;
                    blocked.insert(event.destination);
                    continue;
                }
            };

            let message = self.factory.to_message(&event);
            result.attempted += 1;

            match sender.send(&message).await {
                Ok(()) => {
                    self.confirm_sent(&event).await;
                    result.succeeded += 1;
                }
                Err(err) => {
                    let state = self.handle_send_failure(&event, &err).await;
                    result.failed += 1;
                    result.failures.push(DeliveryFailure {
                        event_id: event.id,
                        destination: event.destination.clone(),
                        error: err.to_string(),
                        state,
                    });

                    match err {
                        BusError::Auth(_) => {
                            result.destination_failures.push(DestinationFailure {
                                destination: event.destination.clone(),
                                error: err.to_string(),
                            });
                            blocked.insert(event.destination);
                        }
                        BusError::Throttled { .. } => {
                            blocked.insert(event.destination);
                        }
                        BusError::Transport(_) => {}
                    }
                }
            }
        }

        result.elapsed = started.elapsed();

        if result.succeeded > 0 {
            info!(
                count = result.succeeded,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "Sent {} integration events in {}ms",
                result.succeeded,
                result.elapsed.as_millis()
            );
        }
        if result.failed > 0 || result.deferred > 0 {
            warn!(
                attempted = result.attempted,
                succeeded = result.succeeded,
                failed = result.failed,
                deferred = result.deferred,
                "Dispatch cycle left events pending"
            );
        }

        Ok(result)
    }

    async fn confirm_sent(&self, event: &PendingEvent) {
        match self.source.mark_sent(event.id).await {
            Ok(()) => {
                debug!(event_id = %event.id, destination = %event.destination, "Event marked sent");
            }
            Err(SourceError::NotFound(_)) => {
                warn!(
                    event_id = %event.id,
                    destination = %event.destination,
                    "Event vanished before it could be marked sent"
                );
            }
            Err(e) => {
                // The bus has the message; the next cycle may send it again.
                error!(
                    event_id = %event.id,
                    destination = %event.destination,
                    error = %e,
                    "Failed to mark event sent"
                );
            }
        }
    }

    /// Record a failed send against the event and return its resulting state.
    ///
    /// Only transport failures count toward the source's retry threshold;
    /// auth and throttling are not the event's fault.
    async fn handle_send_failure(&self, event: &PendingEvent, err: &BusError) -> DeliveryState {
        warn!(
            event_id = %event.id,
            destination = %event.destination,
            attempts = event.attempts,
            error = %err,
            "Send failed, event left for retry"
        );

        if !matches!(err, BusError::Transport(_)) {
            return event.state;
        }

        match self.source.record_failure(event.id, &err.to_string()).await {
            Ok(DeliveryState::Failed) => {
                error!(
                    event_id = %event.id,
                    destination = %event.destination,
                    "Event exceeded delivery attempts and was marked failed"
                );
                DeliveryState::Failed
            }
            Ok(state) => state,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Failed to record delivery failure");
                event.state
            }
        }
    }
}

#[async_trait]
impl TriggerTask for OutboxSender {
    async fn run_cycle(&self) -> OutboxResult<bool> {
        let result = self.dispatch().await?;
        Ok(result.is_successful_cycle())
    }

    async fn on_shutdown(&self) {
        self.provider.dispose_all().await;
    }
}
