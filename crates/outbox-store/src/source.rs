//! SQLite-backed event source.

use crate::{queries, AsyncDatabase, NewIntegrationEvent, OutboxCounts, StoreResult};
use async_trait::async_trait;
use integration_outbox::{DeliveryState, EventId, EventSource, PendingEvent, SourceError};
use rusqlite::Transaction;
use std::path::Path;
use tracing::{info, warn};

/// Durable outbox backed by the `integration_event_outbox` table.
///
/// Producers write rows with [`SqliteEventSource::enqueue_with`] inside the
/// same transaction as their domain change; the outbox sender drains them
/// through the [`EventSource`] implementation.
#[derive(Clone)]
pub struct SqliteEventSource {
    db: AsyncDatabase,
    max_attempts: u32,
}

impl SqliteEventSource {
    /// Open (or create) the outbox database at `path`.
    pub async fn open(path: &Path, max_attempts: u32) -> StoreResult<Self> {
        Ok(Self::new(AsyncDatabase::open(path).await?, max_attempts))
    }

    /// Open a private in-memory outbox.
    pub async fn open_in_memory(max_attempts: u32) -> StoreResult<Self> {
        Ok(Self::new(AsyncDatabase::open_in_memory().await?, max_attempts))
    }

    /// Wrap an already opened database. `max_attempts` of 0 never fails events.
    pub fn new(db: AsyncDatabase, max_attempts: u32) -> Self {
        Self { db, max_attempts }
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    /// Enqueue an event in its own implicit transaction.
    pub async fn enqueue(&self, event: NewIntegrationEvent) -> StoreResult<EventId> {
        self.db
            .call(move |conn| queries::insert_event(conn, &event))
            .await
    }

    /// Enqueue an event inside a caller-owned transaction.
    ///
    /// The row becomes visible to the sender only if the transaction commits.
    pub fn enqueue_with(tx: &Transaction<'_>, event: &NewIntegrationEvent) -> StoreResult<EventId> {
        queries::insert_event(tx, event)
    }

    /// Run a producer closure in a transaction on the outbox database.
    pub async fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.db.transaction(f).await
    }

    pub async fn get(&self, id: EventId) -> StoreResult<Option<PendingEvent>> {
        self.db.call(move |conn| queries::get_event(conn, &id)).await
    }

    pub async fn counts(&self) -> StoreResult<OutboxCounts> {
        self.db.call(queries::count_events).await
    }

    /// Move failed events back to pending with their attempts reset.
    pub async fn requeue_failed(&self) -> StoreResult<usize> {
        let count = self.db.call(queries::requeue_failed_events).await?;
        if count > 0 {
            info!(count, "Requeued failed integration events");
        }
        Ok(count)
    }
}

#[async_trait]
impl EventSource for SqliteEventSource {
    async fn fetch_pending(&self, batch_size: usize) -> Result<Vec<PendingEvent>, SourceError> {
        Ok(self
            .db
            .call(move |conn| queries::get_pending_events(conn, batch_size))
            .await?)
    }

    async fn mark_sent(&self, id: EventId) -> Result<(), SourceError> {
        let found = self
            .db
            .call(move |conn| queries::mark_event_sent(conn, &id))
            .await?;
        if found {
            Ok(())
        } else {
            Err(SourceError::NotFound(id))
        }
    }

    async fn record_failure(&self, id: EventId, error: &str) -> Result<DeliveryState, SourceError> {
        let error = error.to_string();
        let max_attempts = self.max_attempts;
        let state = self
            .db
            .call(move |conn| queries::record_event_failure(conn, &id, &error, max_attempts))
            .await?
            .ok_or(SourceError::NotFound(id))?;

        if state == DeliveryState::Failed {
            warn!(event_id = %id, max_attempts, "Integration event moved to failed");
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use tempfile::tempdir;

    fn event(destination: &str, name: &str) -> NewIntegrationEvent {
        NewIntegrationEvent::new(destination, name, 1, name.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_enqueue_and_fetch_in_order() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        let first = source.enqueue(event("orders", "OrderPlaced")).await.unwrap();
        let second = source
            .enqueue(event("billing", "InvoiceIssued").with_partition_key("customer-1"))
            .await
            .unwrap();

        let pending = source.fetch_pending(10).await.unwrap();

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[0].event_name, "OrderPlaced");
        assert_eq!(pending[0].payload, b"OrderPlaced");
        assert_eq!(pending[1].id, second);
        assert_eq!(pending[1].partition_key.as_deref(), Some("customer-1"));
        assert!(pending.iter().all(|e| e.state == DeliveryState::Pending));
    }

    #[tokio::test]
    async fn test_fetch_respects_batch_size() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        for i in 0..5 {
            source.enqueue(event("orders", &format!("E{i}"))).await.unwrap();
        }

        let pending = source.fetch_pending(3).await.unwrap();
        assert_eq!(
            pending.iter().map(|e| e.event_name.as_str()).collect::<Vec<_>>(),
            vec!["E0", "E1", "E2"]
        );
    }

    #[tokio::test]
    async fn test_fetch_with_oversized_batch_returns_everything() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        for i in 0..3 {
            source.enqueue(event("orders", &format!("E{i}"))).await.unwrap();
        }

        assert_eq!(source.fetch_pending(usize::MAX).await.unwrap().len(), 3);
        assert_eq!(
            queries::limit_param(usize::MAX),
            i64::MAX
        );
    }

    #[tokio::test]
    async fn test_corrupt_created_at_is_an_error() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        let id = source.enqueue(event("orders", "OrderPlaced")).await.unwrap();
        source
            .database()
            .call(move |conn| {
                conn.execute(
                    "UPDATE integration_event_outbox SET created_at = 'yesterday' WHERE event_id = ?1",
                    [id.to_string()],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(
            source.get(id).await,
            Err(StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(8, _, _)))
        ));
        assert!(matches!(
            source.fetch_pending(10).await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_sent_removes_from_pending() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        let id = source.enqueue(event("orders", "OrderPlaced")).await.unwrap();

        source.mark_sent(id).await.unwrap();

        assert!(source.fetch_pending(10).await.unwrap().is_empty());
        assert_eq!(source.get(id).await.unwrap().unwrap().state, DeliveryState::Sent);
        assert_eq!(source.counts().await.unwrap().sent, 1);
    }

    #[tokio::test]
    async fn test_mark_sent_unknown_is_not_found() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        let id = EventId::new();

        assert_eq!(source.mark_sent(id).await, Err(SourceError::NotFound(id)));
        assert_eq!(
            source.record_failure(id, "boom").await,
            Err(SourceError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_record_failure_reaches_threshold() {
        let source = SqliteEventSource::open_in_memory(2).await.unwrap();
        let id = source.enqueue(event("orders", "OrderPlaced")).await.unwrap();

        assert_eq!(
            source.record_failure(id, "timeout").await.unwrap(),
            DeliveryState::Pending
        );
        assert_eq!(
            source.record_failure(id, "reset").await.unwrap(),
            DeliveryState::Failed
        );

        let stored = source.get(id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("reset"));
        assert!(source.fetch_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_threshold_never_fails() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        let id = source.enqueue(event("orders", "OrderPlaced")).await.unwrap();

        for _ in 0..20 {
            source.record_failure(id, "timeout").await.unwrap();
        }

        assert_eq!(source.get(id).await.unwrap().unwrap().state, DeliveryState::Pending);
    }

    #[tokio::test]
    async fn test_requeue_failed() {
        let source = SqliteEventSource::open_in_memory(1).await.unwrap();
        let id = source.enqueue(event("orders", "OrderPlaced")).await.unwrap();
        source.record_failure(id, "timeout").await.unwrap();
        assert_eq!(source.counts().await.unwrap().failed, 1);

        assert_eq!(source.requeue_failed().await.unwrap(), 1);

        let stored = source.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, DeliveryState::Pending);
        assert_eq!(stored.attempts, 0);
        assert_eq!(source.fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_with_commits_alongside_domain_write() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();
        source
            .database()
            .call(|conn| {
                conn.execute("CREATE TABLE orders (id TEXT PRIMARY KEY)", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let id = source
            .transaction(|tx| {
                tx.execute("INSERT INTO orders (id) VALUES ('o-1')", [])?;
                SqliteEventSource::enqueue_with(tx, &event("orders", "OrderPlaced"))
            })
            .await
            .unwrap();

        let pending = source.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn test_enqueue_with_rolls_back_with_domain_write() {
        let source = SqliteEventSource::open_in_memory(0).await.unwrap();

        let result = source
            .transaction(|tx| {
                SqliteEventSource::enqueue_with(tx, &event("orders", "OrderPlaced"))?;
                tx.execute("INSERT INTO missing_table (id) VALUES (1)", [])?;
                Ok(())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(source.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_events_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outbox.db");

        let id = {
            let source = SqliteEventSource::open(&path, 0).await.unwrap();
            source.enqueue(event("orders", "OrderPlaced")).await.unwrap()
        };

        let source = SqliteEventSource::open(&path, 0).await.unwrap();
        let pending = source.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }
}
