//! Repeating trigger: runs a task on a fixed period and records a heartbeat
//! after every successful cycle.
//!
//! ```text
//!   Idle ──tick──▶ Running ──ok──▶ Succeeded ──▶ Idle
//!                     │
//!                     └──err/timeout──▶ Failed ──▶ Idle
//!
//!   (any) ──shutdown──▶ Stopped
//! ```
//!
//! Cycles never overlap. Ticks that fire while a cycle is still running
//! are skipped, and `run_once` refuses to start while another cycle is in
//! flight.

use crate::heartbeat::{Heartbeat, HeartbeatView};
use crate::{OutboxConfig, OutboxError, OutboxResult, OutboxSender};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Work performed on every trigger cycle.
#[async_trait]
pub trait TriggerTask: Send + Sync + 'static {
    /// Run one cycle. `Ok(true)` refreshes the heartbeat, `Ok(false)`
    /// completes the cycle without refreshing it.
    async fn run_cycle(&self) -> OutboxResult<bool>;

    /// Release resources once the trigger has stopped.
    async fn on_shutdown(&self) {}
}

/// Lifecycle state of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

/// Outcome of a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Succeeded,
    Failed { reason: String },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Timing settings for a trigger.
#[derive(Debug, Clone)]
pub struct TriggerSettings {
    pub name: String,
    /// Delay between cycle starts.
    pub interval: Duration,
    /// Budget for one cycle before it is treated as failed.
    pub cycle_timeout: Duration,
    /// How long shutdown waits for an in-flight cycle.
    pub shutdown_grace: Duration,
}

impl TriggerSettings {
    pub fn from_config(name: impl Into<String>, config: &OutboxConfig) -> Self {
        Self {
            name: name.into(),
            interval: config.dispatch_interval(),
            cycle_timeout: config.cycle_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Counters describing trigger activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    /// Cycles refused because another was still running.
    pub cycles_skipped: u64,
    /// Highest number of cycles ever observed running at once.
    pub max_concurrent_cycles: usize,
}

/// Recurring background runner for a [`TriggerTask`].
pub struct RepeatingTrigger<T: TriggerTask> {
    task: T,
    settings: TriggerSettings,
    heartbeat: Arc<Heartbeat>,
    state: watch::Sender<TriggerState>,
    in_flight: AtomicBool,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// The trigger driving outbox delivery.
pub type OutboxTrigger = RepeatingTrigger<OutboxSender>;

impl<T: TriggerTask> RepeatingTrigger<T> {
    /// Register a trigger. The heartbeat exists from this point on.
    pub fn new(task: T, settings: TriggerSettings) -> Self {
        let (state, _) = watch::channel(TriggerState::Idle);
        Self {
            heartbeat: Arc::new(Heartbeat::new(settings.name.clone())),
            task,
            settings,
            state,
            in_flight: AtomicBool::new(false),
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            started: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn heartbeat(&self) -> HeartbeatView {
        HeartbeatView::new(self.heartbeat.clone())
    }

    pub fn state(&self) -> TriggerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TriggerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> TriggerStats {
        TriggerStats {
            cycles_started: self.started.load(Ordering::Relaxed),
            cycles_succeeded: self.succeeded.load(Ordering::Relaxed),
            cycles_failed: self.failed.load(Ordering::Relaxed),
            cycles_skipped: self.skipped.load(Ordering::Relaxed),
            max_concurrent_cycles: self.max_concurrent.load(Ordering::Relaxed),
        }
    }

    /// Run a single cycle now.
    ///
    /// Returns `None` without doing anything if a cycle is already running.
    pub async fn run_once(&self) -> Option<CycleOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(trigger = %self.settings.name, "Cycle already running, skipping");
            return None;
        }
        let _guard = CycleGuard::enter(self);

        self.started.fetch_add(1, Ordering::Relaxed);
        self.state.send_replace(TriggerState::Running);

        let outcome = match timeout(self.settings.cycle_timeout, self.task.run_cycle()).await {
            Ok(Ok(true)) => CycleOutcome::Succeeded,
            Ok(Ok(false)) => CycleOutcome::Failed {
                reason: "cycle completed with unusable destinations".to_string(),
            },
            Ok(Err(e)) => CycleOutcome::Failed {
                reason: e.to_string(),
            },
            Err(_) => CycleOutcome::Failed {
                reason: OutboxError::SchedulerTimeout(self.settings.cycle_timeout).to_string(),
            },
        };

        match &outcome {
            CycleOutcome::Succeeded => {
                self.heartbeat.beat();
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.state.send_replace(TriggerState::Succeeded);
                debug!(trigger = %self.settings.name, "Cycle succeeded");
            }
            CycleOutcome::Failed { reason } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.state.send_replace(TriggerState::Failed);
                error!(trigger = %self.settings.name, reason = %reason, "Cycle failed");
            }
        }

        self.state.send_replace(TriggerState::Idle);
        Some(outcome)
    }

    /// Spawn the periodic loop.
    ///
    /// The first cycle runs immediately. Dropping the returned handle
    /// also stops the loop.
    pub fn start(self: &Arc<Self>) -> TriggerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let trigger = self.clone();
        let join = tokio::spawn(async move { trigger.run_loop(shutdown_rx).await });
        TriggerHandle { shutdown_tx, join }
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            trigger = %self.settings.name,
            interval_ms = self.settings.interval.as_millis() as u64,
            "Repeating trigger started"
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let cycle = self.run_once();
            tokio::pin!(cycle);

            tokio::select! {
                biased;
                _ = &mut cycle => {}
                _ = shutdown.changed() => {
                    info!(trigger = %self.settings.name, "Shutdown requested, waiting for in-flight cycle");
                    if timeout(self.settings.shutdown_grace, &mut cycle).await.is_err() {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        self.state.send_replace(TriggerState::Failed);
                        warn!(
                            trigger = %self.settings.name,
                            grace_ms = self.settings.shutdown_grace.as_millis() as u64,
                            "In-flight cycle cancelled after shutdown grace period"
                        );
                    }
                    break;
                }
            }
        }

        self.task.on_shutdown().await;
        self.state.send_replace(TriggerState::Stopped);
        info!(trigger = %self.settings.name, "Repeating trigger stopped");
    }
}

/// Releases the in-flight flag even when a cycle is cancelled.
struct CycleGuard<'a, T: TriggerTask> {
    trigger: &'a RepeatingTrigger<T>,
}

impl<'a, T: TriggerTask> CycleGuard<'a, T> {
    fn enter(trigger: &'a RepeatingTrigger<T>) -> Self {
        let running = trigger.concurrent.fetch_add(1, Ordering::AcqRel) + 1;
        trigger.max_concurrent.fetch_max(running, Ordering::AcqRel);
        Self { trigger }
    }
}

impl<T: TriggerTask> Drop for CycleGuard<'_, T> {
    fn drop(&mut self) {
        self.trigger.concurrent.fetch_sub(1, Ordering::AcqRel);
        self.trigger.in_flight.store(false, Ordering::Release);
    }
}

/// Handle to a running trigger loop.
pub struct TriggerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TriggerHandle {
    /// Stop scheduling cycles and wait for the loop to exit.
    ///
    /// An in-flight cycle gets the configured grace period to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "Trigger loop terminated abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
