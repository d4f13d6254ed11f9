//! Async SQLite executor using a dedicated background thread.
//!
//! All statements are sent through a channel to one thread that owns the
//! connection, so the Tokio runtime is never blocked on SQLite and queries
//! run in FIFO order.
//!
//! Only SQL and lightweight row mapping belong inside `call()`. Anything
//! else blocks every other query queued behind it.

use crate::{migrations, StoreError, StoreResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA temp_store = MEMORY;
    PRAGMA busy_timeout = 5000;
";

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database file, creating it and its parent directory if needed.
    ///
    /// Enables WAL mode and runs pending migrations before returning.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening outbox database");

        let conn = Connection::open(path_str.clone())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::initialize(conn, path_str).await
    }

    /// Open a private in-memory database. Mostly useful for tests.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::initialize(conn, ":memory:".to_string()).await
    }

    async fn initialize(conn: Connection, path: String) -> StoreResult<Self> {
        let db = Self { conn, path };

        db.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            migrations::run_migrations(conn)
        })
        .await?;

        info!(path = %db.path, "Outbox database initialized");
        Ok(db)
    }

    /// Execute a closure on the connection's dedicated thread.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our result rides inside tokio_rusqlite's Ok so domain errors
        // survive the channel untouched.
        let outer = self.conn.call(move |conn| Ok(f(conn))).await;

        match outer {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure inside a transaction.
    ///
    /// Commits when the closure returns `Ok`, rolls back otherwise.
    pub async fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let result = f(&tx);
                if result.is_ok() {
                    tx.commit()?;
                }
                Ok(result)
            })
            .await;

        match outer {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check the database answers a trivial query.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Close the connection once queued operations have drained.
    pub async fn close(self) -> StoreResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}
