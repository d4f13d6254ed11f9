//! Outbox relay binary entry point.
//!
//! Usage: outbox-relay --config <file> --database <sqlite path>
//!
//! Drains the SQLite integration event outbox into the message bus until
//! interrupted with Ctrl-C.

mod relay;

use anyhow::Context;
use clap::Parser;
use integration_outbox::{HttpBusClient, OutboxConfig};
use outbox_store::SqliteEventSource;
use relay::Relay;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Outbox relay: publishes integration events to the message bus.
#[derive(Parser, Debug)]
#[command(name = "outbox-relay")]
#[command(about = "Publishes the integration event outbox to the message bus")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "OUTBOX_CONFIG")]
    config: PathBuf,

    /// Path to the SQLite outbox database.
    #[arg(long, env = "OUTBOX_DATABASE")]
    database: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "OUTBOX_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Seconds between health report log lines.
    #[arg(long, env = "OUTBOX_HEALTH_LOG_INTERVAL_SECS", default_value = "60")]
    health_log_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "outbox-relay".into(),
        default_level: args.log_level.clone(),
        also_stderr: true,
        ..Default::default()
    })
    .context("failed to initialize logging")?;

    info!("Outbox relay starting...");

    let config = OutboxConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    info!(
        interval_ms = config.dispatch_interval_ms,
        batch_size = config.batch_size,
        cycle_timeout_ms = config.cycle_timeout_ms,
        max_delivery_attempts = config.max_delivery_attempts,
        destinations = config.destinations.len(),
        "Configuration loaded"
    );

    let source = SqliteEventSource::open(&args.database, config.max_delivery_attempts)
        .await
        .with_context(|| format!("failed to open outbox database {}", args.database.display()))?;

    let counts = source.counts().await?;
    info!(
        pending = counts.pending,
        sent = counts.sent,
        failed = counts.failed,
        "Outbox opened"
    );

    let relay = Relay::new(
        &config,
        Arc::new(source),
        Arc::new(HttpBusClient::new()),
        Duration::from_secs(args.health_log_interval_secs.max(1)),
    );

    relay
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        })
        .await;

    Ok(())
}
