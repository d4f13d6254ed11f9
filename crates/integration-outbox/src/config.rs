//! Outbox configuration.
//!
//! Supplied by the host at startup; there is no dynamic reconfiguration.
//! Values load from a JSON file, then environment variables override the
//! scalar settings.

use crate::message::DEFAULT_CONTENT_TYPE;
use crate::{OutboxError, OutboxResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Connection settings for one logical destination.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationSettings {
    /// Base URL of the bus namespace.
    pub endpoint: String,
    /// Queue or topic path within the namespace.
    pub entity_path: String,
    /// Bearer token presented on every send.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl DestinationSettings {
    pub fn new(endpoint: impl Into<String>, entity_path: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            entity_path: entity_path.into(),
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// URL messages for this destination are posted to.
    pub fn messages_url(&self) -> OutboxResult<Url> {
        let mut base = Url::parse(&self.endpoint)?;
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        let path = format!("{}/messages", self.entity_path.trim_matches('/'));
        Ok(base.join(&path)?)
    }
}

impl fmt::Debug for DestinationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationSettings")
            .field("endpoint", &self.endpoint)
            .field("entity_path", &self.entity_path)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Health check thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Maximum heartbeat age still reported as healthy.
    pub staleness_window_ms: u64,
    /// Degraded window as a multiple of the staleness window.
    pub degraded_multiplier: f64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            staleness_window_ms: 60_000,
            degraded_multiplier: 2.0,
        }
    }
}

impl HealthCheckConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    /// Saturates at `Duration::MAX` for multipliers too large to represent.
    pub fn degraded_window(&self) -> Duration {
        Duration::try_from_secs_f64(
            self.staleness_window().as_secs_f64() * self.degraded_multiplier,
        )
        .unwrap_or(Duration::MAX)
    }
}

/// Outbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutboxConfig {
    /// Delay between dispatch cycles.
    pub dispatch_interval_ms: u64,
    /// Maximum events fetched per cycle.
    pub batch_size: usize,
    /// Budget for a single dispatch cycle.
    pub cycle_timeout_ms: u64,
    /// How long shutdown waits for an in-flight cycle.
    pub shutdown_grace_ms: u64,
    /// Failed attempts before an event moves to Failed. 0 disables.
    pub max_delivery_attempts: u32,
    /// Content type stamped on outbound messages.
    pub content_type: String,
    pub health: HealthCheckConfig,
    /// Connection settings keyed by logical destination name.
    pub destinations: HashMap<String, DestinationSettings>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 10_000,
            batch_size: 50,
            cycle_timeout_ms: 30_000,
            shutdown_grace_ms: 5_000,
            max_delivery_attempts: 10,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            health: HealthCheckConfig::default(),
            destinations: HashMap::new(),
        }
    }
}

impl OutboxConfig {
    /// Load from a JSON file, apply environment overrides and validate.
    pub fn load(path: &Path) -> OutboxResult<Self> {
        let mut config = Self::load_from_file(path)?;
        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> OutboxResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OutboxConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override scalar settings from environment variables.
    pub fn load_from_env(&mut self) {
        if let Some(v) = env_parse("OUTBOX_DISPATCH_INTERVAL_MS") {
            self.dispatch_interval_ms = v;
        }
        if let Some(v) = env_parse("OUTBOX_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_parse("OUTBOX_CYCLE_TIMEOUT_MS") {
            self.cycle_timeout_ms = v;
        }
        if let Some(v) = env_parse("OUTBOX_MAX_DELIVERY_ATTEMPTS") {
            self.max_delivery_attempts = v;
        }
        if let Some(v) = env_parse("OUTBOX_HEALTH_WINDOW_MS") {
            self.health.staleness_window_ms = v;
        }
    }

    pub fn validate(&self) -> OutboxResult<()> {
        if self.dispatch_interval_ms == 0 {
            return Err(OutboxError::Config("dispatch_interval_ms must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(OutboxError::Config("batch_size must be > 0".into()));
        }
        if self.cycle_timeout_ms == 0 {
            return Err(OutboxError::Config("cycle_timeout_ms must be > 0".into()));
        }
        if self.health.staleness_window_ms == 0 {
            return Err(OutboxError::Config("health.staleness_window_ms must be > 0".into()));
        }
        if self.health.staleness_window_ms < self.dispatch_interval_ms {
            return Err(OutboxError::Config(
                "health.staleness_window_ms must be >= dispatch_interval_ms".into(),
            ));
        }
        let multiplier = self.health.degraded_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(OutboxError::Config(
                "health.degraded_multiplier must be a finite value >= 1".into(),
            ));
        }
        if Duration::try_from_secs_f64(self.health.staleness_window().as_secs_f64() * multiplier)
            .is_err()
        {
            return Err(OutboxError::Config(
                "health.degraded_multiplier is too large for the staleness window".into(),
            ));
        }
        for (name, settings) in &self.destinations {
            if settings.entity_path.trim_matches('/').is_empty() {
                return Err(OutboxError::Config(format!(
                    "destination {name}: entity_path is empty"
                )));
            }
            settings.messages_url().map_err(|e| {
                OutboxError::Config(format!("destination {name}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = OutboxConfig::default();
        assert_eq!(config.dispatch_interval(), Duration::from_secs(10));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_delivery_attempts, 10);
        assert_eq!(config.health.staleness_window(), Duration::from_secs(60));
        assert_eq!(config.health.degraded_window(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outbox.json");
        std::fs::write(
            &path,
            r#"{
                "dispatch_interval_ms": 2500,
                "batch_size": 10,
                "destinations": {
                    "orders": {
                        "endpoint": "https://bus.example.com",
                        "entity_path": "orders-topic",
                        "access_token": "secret"
                    }
                }
            }"#,
        )
        .unwrap();

        let config = OutboxConfig::load_from_file(&path).unwrap();
        assert_eq!(config.dispatch_interval_ms, 2500);
        assert_eq!(config.batch_size, 10);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.cycle_timeout_ms, 30_000);

        let orders = &config.destinations["orders"];
        assert_eq!(orders.request_timeout_secs, 30);
        assert_eq!(
            orders.messages_url().unwrap().as_str(),
            "https://bus.example.com/orders-topic/messages"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut settings = DestinationSettings::new("https://bus.example.com", "orders");
        settings.access_token = Some("super-secret".into());
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = OutboxConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OutboxError::Config(_))));

        let mut config = OutboxConfig::default();
        config.health.degraded_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = OutboxConfig::default();
        config.health.degraded_multiplier = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = OutboxConfig::default();
        config
            .destinations
            .insert("bad".into(), DestinationSettings::new("not a url", "q"));
        assert!(config.validate().is_err());

        let mut config = OutboxConfig::default();
        config
            .destinations
            .insert("empty".into(), DestinationSettings::new("https://bus.example.com", "/"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_window_shorter_than_interval() {
        let mut config = OutboxConfig {
            dispatch_interval_ms: 120_000,
            ..Default::default()
        };
        config.health.staleness_window_ms = 30_000;
        assert!(matches!(config.validate(), Err(OutboxError::Config(_))));

        config.health.staleness_window_ms = 120_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_degraded_multiplier_is_rejected_not_panicking() {
        let mut config = OutboxConfig::default();
        config.health.degraded_multiplier = 1e20;

        assert!(matches!(config.validate(), Err(OutboxError::Config(_))));
        assert_eq!(config.health.degraded_window(), Duration::MAX);
    }
}
