//! Standalone outbox query functions.
//!
//! Each function takes a `&Connection` as its first parameter so it can run
//! on the executor thread or inside a producer's own transaction.

use crate::{NewIntegrationEvent, OutboxCounts, StoreResult};
use chrono::{DateTime, Utc};
use integration_outbox::{DeliveryState, EventId, PendingEvent};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use tracing::debug;

/// Insert a new pending event and return its id.
pub fn insert_event(conn: &Connection, event: &NewIntegrationEvent) -> StoreResult<EventId> {
    let id = EventId::new();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO integration_event_outbox (event_id, event_name, minor_version, destination, payload, partition_key, state, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
        params![
            id.to_string(),
            event.event_name,
            event.minor_version,
            event.destination,
            event.payload,
            event.partition_key,
            now,
        ],
    )?;
    debug!(event_id = %id, destination = %event.destination, "Integration event enqueued");
    Ok(id)
}

/// Get pending events in insertion order (limited to batch size).
pub fn get_pending_events(conn: &Connection, limit: usize) -> StoreResult<Vec<PendingEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT event_id, event_name, minor_version, destination, payload, partition_key, state, attempts, last_error, created_at
         FROM integration_event_outbox
         WHERE state = 'pending'
         ORDER BY seq ASC
         LIMIT ?1",
    )?;

    let events = stmt
        .query_map(params![limit_param(limit)], |row| {
            let raw_id: String = row.get(0)?;
            let id = EventId::from_str(&raw_id)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
            Ok(PendingEvent {
                id,
                event_name: row.get(1)?,
                minor_version: row.get(2)?,
                destination: row.get(3)?,
                payload: row.get(4)?,
                partition_key: row.get(5)?,
                state: DeliveryState::from_str(&row.get::<_, String>(6)?),
                attempts: row.get(7)?,
                last_error: row.get(8)?,
                created_at: parse_datetime(9, row.get::<_, String>(9)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Mark an event as sent. Returns false if no such event exists.
pub fn mark_event_sent(conn: &Connection, id: &EventId) -> StoreResult<bool> {
    let now = Utc::now().to_rfc3339();
    let count = conn.execute(
        "UPDATE integration_event_outbox
         SET state = 'sent', sent_at = ?1
         WHERE event_id = ?2",
        params![now, id.to_string()],
    )?;
    Ok(count > 0)
}

/// Record a failed attempt and return the resulting state.
///
/// The event moves to `failed` once its attempts reach `max_attempts`;
/// a threshold of 0 never fails it. Returns `None` for unknown ids.
pub fn record_event_failure(
    conn: &Connection,
    id: &EventId,
    error: &str,
    max_attempts: u32,
) -> StoreResult<Option<DeliveryState>> {
    let now = Utc::now().to_rfc3339();
    let count = conn.execute(
        "UPDATE integration_event_outbox
         SET attempts = attempts + 1,
             last_error = ?1,
             last_attempt_at = ?2,
             state = CASE
                 WHEN state = 'pending' AND ?3 > 0 AND attempts + 1 >= ?3 THEN 'failed'
                 ELSE state
             END
         WHERE event_id = ?4",
        params![error, now, max_attempts, id.to_string()],
    )?;
    if count == 0 {
        return Ok(None);
    }

    let state: Option<String> = conn
        .query_row(
            "SELECT state FROM integration_event_outbox WHERE event_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(state.map(|s| DeliveryState::from_str(&s)))
}

/// Row counts per delivery state.
pub fn count_events(conn: &Connection) -> StoreResult<OutboxCounts> {
    let mut stmt = conn.prepare_cached(
        "SELECT state, COUNT(*) FROM integration_event_outbox GROUP BY state",
    )?;
    let mut counts = OutboxCounts::default();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (state, count) = row?;
        counts.add(DeliveryState::from_str(&state), count.max(0) as u64);
    }
    Ok(counts)
}

/// Move every failed event back to pending with a fresh attempt budget.
pub fn requeue_failed_events(conn: &Connection) -> StoreResult<usize> {
    let count = conn.execute(
        "UPDATE integration_event_outbox
         SET state = 'pending', attempts = 0
         WHERE state = 'failed'",
        [],
    )?;
    Ok(count)
}

/// Get a single event regardless of state.
pub fn get_event(conn: &Connection, id: &EventId) -> StoreResult<Option<PendingEvent>> {
    let event = conn
        .query_row(
            "SELECT event_name, minor_version, destination, payload, partition_key, state, attempts, last_error, created_at
             FROM integration_event_outbox
             WHERE event_id = ?1",
            params![id.to_string()],
            |row| {
                Ok(PendingEvent {
                    id: *id,
                    event_name: row.get(0)?,
                    minor_version: row.get(1)?,
                    destination: row.get(2)?,
                    payload: row.get(3)?,
                    partition_key: row.get(4)?,
                    state: DeliveryState::from_str(&row.get::<_, String>(5)?),
                    attempts: row.get(6)?,
                    last_error: row.get(7)?,
                    created_at: parse_datetime(8, row.get::<_, String>(8)?)?,
                })
            },
        )
        .optional()?;
    Ok(event)
}

/// SQLite treats a negative LIMIT as unbounded, so clamp instead of wrapping.
pub(crate) fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_datetime(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
