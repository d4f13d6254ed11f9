//! Bus transport port and the HTTP implementation.

use crate::{BusError, DestinationSettings, OutboundMessage};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// A long-lived, destination-bound publisher.
#[async_trait]
pub trait BusSender: Send + Sync {
    /// Publish one message. Returns once the broker acknowledged it.
    async fn send(&self, message: &OutboundMessage) -> Result<(), BusError>;

    /// Release the underlying connection. Called once at shutdown.
    async fn close(&self) {}
}

/// Factory for per-destination senders.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn create_sender(
        &self,
        destination: &str,
        settings: &DestinationSettings,
    ) -> Result<Arc<dyn BusSender>, BusError>;
}

/// Broker-level properties, sent as a JSON header.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties<'a> {
    message_id: &'a str,
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition_key: Option<&'a str>,
}

/// Bus client speaking the broker's HTTP messaging API.
#[derive(Debug, Clone, Default)]
pub struct HttpBusClient;

impl HttpBusClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BusClient for HttpBusClient {
    async fn create_sender(
        &self,
        destination: &str,
        settings: &DestinationSettings,
    ) -> Result<Arc<dyn BusSender>, BusError> {
        let url = settings
            .messages_url()
            .map_err(|e| BusError::Transport(format!("invalid endpoint: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| BusError::Transport(format!("failed to build HTTP client: {e}")))?;

        info!(destination = %destination, url = %url, "Created HTTP bus sender");

        Ok(Arc::new(HttpBusSender {
            destination: destination.to_string(),
            url,
            client,
            access_token: settings.access_token.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Sender posting messages to `{endpoint}/{entity_path}/messages`.
pub struct HttpBusSender {
    destination: String,
    url: Url,
    client: Client,
    access_token: Option<String>,
    closed: AtomicBool,
}

impl HttpBusSender {
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl BusSender for HttpBusSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Transport(format!(
                "sender for {} is closed",
                self.destination
            )));
        }

        let broker = BrokerProperties {
            message_id: &message.message_id,
            label: &message.subject,
            session_id: message.session_id.as_deref(),
            partition_key: message.partition_key.as_deref(),
        };
        let broker = serde_json::to_string(&broker)
            .map_err(|e| BusError::Transport(format!("invalid broker properties: {e}")))?;

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, message.content_type.as_str())
            .header("BrokerProperties", broker)
            .body(message.body.clone());

        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        // Custom properties travel as headers with JSON-quoted values.
        for (name, value) in &message.application_properties {
            let quoted = serde_json::Value::String(value.clone()).to_string();
            request = request.header(name.as_str(), quoted);
        }

        debug!(
            destination = %self.destination,
            message_id = %message.message_id,
            bytes = message.body.len(),
            "Sending message"
        );

        let response = request
            .send()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, retry_after.as_deref(), &body))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(destination = %self.destination, "Closed HTTP bus sender");
        }
    }
}

/// Map a non-success response onto the bus error taxonomy.
pub fn classify_status(status: StatusCode, retry_after: Option<&str>, body: &str) -> BusError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BusError::Auth(format!("HTTP {}: {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => BusError::Throttled {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        _ => BusError::Transport(format!("HTTP {}: {}", status, body)),
    }
}
