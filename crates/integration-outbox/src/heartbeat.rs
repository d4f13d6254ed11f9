//! Liveness heartbeat for repeating triggers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const NEVER: u64 = u64::MAX;

/// Last-success timestamp of a named trigger.
///
/// Single writer (the owning trigger), many readers. The timestamp is kept
/// as nanoseconds since registration in one atomic so reads never tear.
/// Process-scoped: a restart starts with no recorded success.
#[derive(Debug)]
pub struct Heartbeat {
    name: String,
    registered_at: Instant,
    last_success_nanos: AtomicU64,
}

impl Heartbeat {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registered_at: Instant::now(),
            last_success_nanos: AtomicU64::new(NEVER),
        }
    }

    pub(crate) fn beat(&self) {
        self.record(Instant::now());
    }

    fn record(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.registered_at).as_nanos();
        let nanos = u64::try_from(nanos).unwrap_or(NEVER - 1).min(NEVER - 1);
        self.last_success_nanos.store(nanos, Ordering::Release);
    }
}

/// Read-only handle to a trigger's heartbeat.
#[derive(Debug, Clone)]
pub struct HeartbeatView {
    inner: Arc<Heartbeat>,
}

impl HeartbeatView {
    pub(crate) fn new(inner: Arc<Heartbeat>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// When the trigger was registered.
    pub fn registered_at(&self) -> Instant {
        self.inner.registered_at
    }

    /// Time of the last successful cycle, if any.
    pub fn last_success(&self) -> Option<Instant> {
        match self.inner.last_success_nanos.load(Ordering::Acquire) {
            NEVER => None,
            nanos => Some(self.inner.registered_at + Duration::from_nanos(nanos)),
        }
    }

    /// Time since registration, measured at `now`.
    pub fn uptime_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inner.registered_at)
    }

    /// Age of the last success at `now`.
    pub fn age_at(&self, now: Instant) -> Option<Duration> {
        self.last_success()
            .map(|last| now.saturating_duration_since(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_starts_empty() {
        let heartbeat = Arc::new(Heartbeat::new("outbox"));
        let view = HeartbeatView::new(heartbeat);
        assert_eq!(view.name(), "outbox");
        assert!(view.last_success().is_none());
        assert!(view.age_at(Instant::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_beat_records_current_time() {
        let heartbeat = Arc::new(Heartbeat::new("outbox"));
        let view = HeartbeatView::new(heartbeat.clone());

        tokio::time::advance(Duration::from_secs(5)).await;
        heartbeat.beat();
        tokio::time::advance(Duration::from_secs(3)).await;

        let now = Instant::now();
        assert_eq!(view.age_at(now), Some(Duration::from_secs(3)));
        assert_eq!(view.uptime_at(now), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_beat_replaces_earlier() {
        let heartbeat = Arc::new(Heartbeat::new("outbox"));
        let view = HeartbeatView::new(heartbeat.clone());

        heartbeat.beat();
        let first = view.last_success().unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        heartbeat.beat();

        assert_eq!(view.last_success().unwrap() - first, Duration::from_secs(10));
    }
}
