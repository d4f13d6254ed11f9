//! Database migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table.

use crate::StoreResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_integration_event_outbox(conn)?;
    }
    if current_version < 2 {
        migrate_v2_delivery_tracking(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: the outbox table.
///
/// `seq` preserves insertion order for dispatch.
fn migrate_v1_integration_event_outbox(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: integration event outbox");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS integration_event_outbox (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL UNIQUE,
            event_name TEXT NOT NULL,
            minor_version INTEGER NOT NULL DEFAULT 0,
            destination TEXT NOT NULL,
            payload BLOB NOT NULL,
            partition_key TEXT,
            state TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            sent_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_integration_event_outbox_state_seq
            ON integration_event_outbox(state, seq);
        ",
    )?;

    record_migration(conn, 1, "integration_event_outbox")?;
    Ok(())
}

/// V2: per-event attempt counter and last error.
fn migrate_v2_delivery_tracking(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v2: delivery tracking");

    conn.execute_batch(
        "
        ALTER TABLE integration_event_outbox
            ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE integration_event_outbox
            ADD COLUMN last_error TEXT;
        ALTER TABLE integration_event_outbox
            ADD COLUMN last_attempt_at TEXT;
        ",
    )?;

    record_migration(conn, 2, "delivery_tracking")?;
    Ok(())
}
