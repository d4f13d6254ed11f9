//! SQLite storage for the integration event outbox.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread
//! - Schema migrations for the `integration_event_outbox` table
//! - Query helpers usable inside a producer's own transaction
//! - `SqliteEventSource`, the durable `EventSource` drained by the sender
//!
//! ```ignore
//! let source = SqliteEventSource::open(path, config.max_delivery_attempts).await?;
//!
//! // Producer side: write the outbox row with the domain change.
//! source.transaction(|tx| {
//!     tx.execute("UPDATE orders SET status = 'placed' WHERE id = ?1", [&order_id])?;
//!     SqliteEventSource::enqueue_with(tx, &event)
//! }).await?;
//! ```
//!
//! **Important**: only SQL runs inside `call()` and `transaction()`.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;
mod source;

pub use error::{StoreError, StoreResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{NewIntegrationEvent, OutboxCounts};
pub use source::SqliteEventSource;
