//! Health reporting for repeating triggers.
//!
//! Checks are read-only: they only look at a trigger's heartbeat and never
//! touch the dispatch path.

use crate::heartbeat::HeartbeatView;
use crate::{HealthCheckConfig, RepeatingTrigger, TriggerTask};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Reported health. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Result of a named health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub name: String,
    pub status: HealthStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_secs_ago: Option<u64>,
}

/// A named check polled by the host's health aggregator.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self) -> HealthReport;
}

/// Reports whether a repeating trigger is still completing cycles.
///
/// - Healthy: last success no older than the staleness window.
/// - Degraded: older than that but within the degraded window.
/// - Unhealthy: older than the degraded window, or never succeeded while
///   the trigger has been registered for more than one interval.
///
/// A trigger still inside its first interval is always Healthy.
#[derive(Debug, Clone)]
pub struct RepeatingTriggerHealthCheck {
    heartbeat: HeartbeatView,
    interval: Duration,
    staleness_window: Duration,
    degraded_window: Duration,
}

impl RepeatingTriggerHealthCheck {
    pub fn new(
        heartbeat: HeartbeatView,
        interval: Duration,
        staleness_window: Duration,
        degraded_window: Duration,
    ) -> Self {
        // A window shorter than the interval would go stale between ticks.
        let staleness_window = staleness_window.max(interval);
        Self {
            heartbeat,
            interval,
            staleness_window,
            degraded_window: degraded_window.max(staleness_window),
        }
    }

    /// Build a check for a trigger using configured thresholds.
    pub fn for_trigger<T: TriggerTask>(
        trigger: &RepeatingTrigger<T>,
        config: &HealthCheckConfig,
    ) -> Self {
        Self::new(
            trigger.heartbeat(),
            trigger.settings().interval,
            config.staleness_window(),
            config.degraded_window(),
        )
    }

    /// Evaluate the policy at a given instant.
    pub fn evaluate(&self, now: Instant) -> HealthReport {
        let uptime = self.heartbeat.uptime_at(now);
        let age = self.heartbeat.age_at(now);

        let (status, description) = match age {
            None if uptime <= self.interval => (
                HealthStatus::Healthy,
                "No run recorded yet; first run not yet due".to_string(),
            ),
            None => (
                HealthStatus::Unhealthy,
                format!("No successful run in {}s since startup", uptime.as_secs()),
            ),
            Some(age) if age <= self.staleness_window => (
                HealthStatus::Healthy,
                format!("Last successful run {}s ago", age.as_secs()),
            ),
            Some(age) if age <= self.degraded_window => (
                HealthStatus::Degraded,
                format!(
                    "Last successful run {}s ago exceeds the {}s staleness window",
                    age.as_secs(),
                    self.staleness_window.as_secs()
                ),
            ),
            Some(age) => (
                HealthStatus::Unhealthy,
                format!(
                    "Last successful run {}s ago exceeds the {}s degraded window",
                    age.as_secs(),
                    self.degraded_window.as_secs()
                ),
            ),
        };

        HealthReport {
            name: self.heartbeat.name().to_string(),
            status,
            description,
            last_success_secs_ago: age.map(|a| a.as_secs()),
        }
    }
}

impl HealthCheck for RepeatingTriggerHealthCheck {
    fn name(&self) -> &str {
        self.heartbeat.name()
    }

    fn check(&self) -> HealthReport {
        self.evaluate(Instant::now())
    }
}

/// Named health checks, polled together.
#[derive(Default)]
pub struct HealthRegistry {
    checks: RwLock<BTreeMap<String, Arc<dyn HealthCheck>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check under its name, replacing any previous one.
    pub fn register(&self, check: Arc<dyn HealthCheck>) {
        self.checks.write().insert(check.name().to_string(), check);
    }

    pub fn check(&self, name: &str) -> Option<HealthReport> {
        let check = self.checks.read().get(name).cloned()?;
        Some(check.check())
    }

    pub fn check_all(&self) -> Vec<HealthReport> {
        let checks: Vec<_> = self.checks.read().values().cloned().collect();
        checks.iter().map(|c| c.check()).collect()
    }

    /// Worst status across all checks; Healthy when none are registered.
    pub fn overall(&self) -> HealthStatus {
        self.check_all()
            .into_iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }
}
