//! Scenario tests for outbox delivery.
//!
//! - `harness.rs`  - Scripted bus client, scripted source, probe task and fixture
//! - `dispatch.rs` - Happy-path delivery and at-least-once marking
//! - `failures.rs` - Per-event and per-destination failure isolation
//! - `trigger.rs`  - Periodic scheduling, non-overlap, timeouts and shutdown
//! - `health.rs`   - Heartbeat-driven health reporting through real cycles
