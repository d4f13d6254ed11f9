//! Per-destination sender cache.

use crate::{BusClient, BusSender, DestinationSettings, OutboundMessage, OutboxError, OutboxResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

type SenderSlot = Arc<OnceCell<Arc<dyn BusSender>>>;

/// Owns one long-lived sender per destination.
///
/// Senders are created lazily on first use and cached for the lifetime of
/// the provider. Construction runs at most once per destination even when
/// several callers race; a failed construction leaves the slot empty so a
/// later call can retry.
pub struct SenderProvider {
    client: Arc<dyn BusClient>,
    destinations: HashMap<String, DestinationSettings>,
    senders: RwLock<HashMap<String, SenderSlot>>,
}

impl SenderProvider {
    pub fn new(
        client: Arc<dyn BusClient>,
        destinations: HashMap<String, DestinationSettings>,
    ) -> Self {
        Self {
            client,
            destinations,
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// Get the cached sender for a destination, creating it if needed.
    ///
    /// Transport and auth failures from construction are returned as-is;
    /// there is no internal retry.
    pub async fn get_sender(&self, destination: &str) -> OutboxResult<Arc<dyn BusSender>> {
        let settings = self
            .destinations
            .get(destination)
            .ok_or_else(|| OutboxError::UnknownDestination(destination.to_string()))?;

        let slot = self.slot(destination);
        let sender = slot
            .get_or_try_init(|| async {
                debug!(destination = %destination, "Creating bus sender");
                self.client.create_sender(destination, settings).await
            })
            .await?;

        Ok(sender.clone())
    }

    /// Send a message through the destination's cached sender.
    pub async fn send(&self, destination: &str, message: &OutboundMessage) -> OutboxResult<()> {
        let sender = self.get_sender(destination).await?;
        sender.send(message).await?;
        Ok(())
    }

    /// Close every cached sender and empty the cache.
    pub async fn dispose_all(&self) {
        let slots: Vec<(String, SenderSlot)> = self.senders.write().drain().collect();

        let mut closed = 0;
        for (destination, slot) in slots {
            if let Some(sender) = slot.get() {
                sender.close().await;
                debug!(destination = %destination, "Disposed bus sender");
                closed += 1;
            }
        }

        info!(count = closed, "Disposed bus senders");
    }

    /// Destinations with a live sender, sorted.
    pub fn cached_destinations(&self) -> Vec<String> {
        let senders = self.senders.read();
        let mut names: Vec<String> = senders
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn has_destination(&self, destination: &str) -> bool {
        self.destinations.contains_key(destination)
    }

    fn slot(&self, destination: &str) -> SenderSlot {
        if let Some(slot) = self.senders.read().get(destination) {
            return slot.clone();
        }

        self.senders
            .write()
            .entry(destination.to_string())
            .or_default()
            .clone()
    }
}
