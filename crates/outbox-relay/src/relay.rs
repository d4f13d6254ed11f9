//! Relay wiring: trigger, health registry and the shutdown path.

use integration_outbox::{
    BusClient, EventSource, HealthRegistry, HealthReport, HealthStatus, OutboxConfig,
    OutboxSender, OutboxTrigger, RepeatingTrigger, RepeatingTriggerHealthCheck, TriggerSettings,
    TriggerStats, OUTBOX_TRIGGER_NAME,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// A configured outbox relay, ready to run.
pub struct Relay {
    trigger: Arc<OutboxTrigger>,
    health: Arc<HealthRegistry>,
    health_log_interval: Duration,
}

impl Relay {
    pub fn new(
        config: &OutboxConfig,
        source: Arc<dyn EventSource>,
        client: Arc<dyn BusClient>,
        health_log_interval: Duration,
    ) -> Self {
        let sender = OutboxSender::from_config(source, client, config);
        let trigger = Arc::new(RepeatingTrigger::new(
            sender,
            TriggerSettings::from_config(OUTBOX_TRIGGER_NAME, config),
        ));

        let health = Arc::new(HealthRegistry::new());
        health.register(Arc::new(RepeatingTriggerHealthCheck::for_trigger(
            &trigger,
            &config.health,
        )));

        Self {
            trigger,
            health,
            health_log_interval,
        }
    }

    pub fn trigger(&self) -> &Arc<OutboxTrigger> {
        &self.trigger
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    /// Run until `shutdown` resolves, then stop the trigger and release
    /// every bus sender.
    pub async fn run<F>(self, shutdown: F) -> TriggerStats
    where
        F: Future<Output = ()>,
    {
        let handle = self.trigger.start();

        let mut health_ticker = interval(self.health_log_interval);
        health_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick is immediate; the first report waits one interval.
        health_ticker.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = health_ticker.tick() => log_health(&self.health.check_all()),
            }
        }

        info!("Shutting down outbox relay");
        handle.shutdown().await;

        let stats = self.trigger.stats();
        info!(
            cycles_started = stats.cycles_started,
            cycles_succeeded = stats.cycles_succeeded,
            cycles_failed = stats.cycles_failed,
            cycles_skipped = stats.cycles_skipped,
            "Outbox relay stopped"
        );
        stats
    }
}

fn log_health(reports: &[HealthReport]) {
    for report in reports {
        let json = serde_json::to_string(report).unwrap_or_default();
        match report.status {
            HealthStatus::Healthy => info!(
                check = %report.name,
                status = report.status.as_str(),
                report = %json,
                "{}",
                report.description
            ),
            HealthStatus::Degraded => warn!(
                check = %report.name,
                status = report.status.as_str(),
                report = %json,
                "{}",
                report.description
            ),
            HealthStatus::Unhealthy => error!(
                check = %report.name,
                status = report.status.as_str(),
                report = %json,
                "{}",
                report.description
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use integration_outbox::{BusError, BusSender, DestinationSettings, OutboundMessage};
    use outbox_store::{NewIntegrationEvent, SqliteEventSource};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingClient {
        sent: Arc<Mutex<Vec<OutboundMessage>>>,
        closed: Arc<Mutex<usize>>,
    }

    struct RecordingSender {
        sent: Arc<Mutex<Vec<OutboundMessage>>>,
        closed: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl BusClient for RecordingClient {
        async fn create_sender(
            &self,
            _destination: &str,
            _settings: &DestinationSettings,
        ) -> Result<Arc<dyn BusSender>, BusError> {
            Ok(Arc::new(RecordingSender {
                sent: self.sent.clone(),
                closed: self.closed.clone(),
            }))
        }
    }

    #[async_trait]
    impl BusSender for RecordingSender {
        async fn send(&self, message: &OutboundMessage) -> Result<(), BusError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn close(&self) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    fn test_config() -> OutboxConfig {
        let mut config = OutboxConfig {
            dispatch_interval_ms: 20,
            ..Default::default()
        };
        config.destinations.insert(
            "orders".to_string(),
            DestinationSettings::new("https://bus.example.com", "orders"),
        );
        config
    }

    #[tokio::test]
    async fn test_relay_drains_sqlite_outbox_and_shuts_down() {
        let dir = tempdir().unwrap();
        let source = SqliteEventSource::open(&dir.path().join("outbox.db"), 3)
            .await
            .unwrap();
        for name in ["OrderPlaced", "OrderPaid"] {
            source
                .enqueue(NewIntegrationEvent::new("orders", name, 1, b"{}".to_vec()))
                .await
                .unwrap();
        }

        let client = Arc::new(RecordingClient::default());
        let sent = client.sent.clone();
        let closed = client.closed.clone();
        let relay = Relay::new(
            &test_config(),
            Arc::new(source.clone()),
            client,
            Duration::from_millis(10),
        );
        let health = relay.health().clone();

        let probe = source.clone();
        let stats = relay
            .run(async move {
                for _ in 0..250 {
                    if probe.counts().await.unwrap().sent == 2 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await;

        assert!(stats.cycles_succeeded >= 1);
        assert_eq!(source.counts().await.unwrap().sent, 2);
        let subjects: Vec<String> = sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.subject.clone())
            .collect();
        assert_eq!(subjects, vec!["OrderPlaced", "OrderPaid"]);
        assert_eq!(*closed.lock().unwrap(), 1);
        assert_eq!(
            health.check(OUTBOX_TRIGGER_NAME).map(|r| r.status),
            Some(HealthStatus::Healthy)
        );
    }
}
