//! Periodic driver for the escalation sweep.
//!
//! A tick that arrives while the previous sweep is still running is skipped, never
//! queued. Each sweep bounds its own work through the engine's soft deadline.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use supportdesk_core::engine::{EscalationEngine, SweepReport};
use supportdesk_core::errors::EngineIssue;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub sweeps_completed: u64,
    pub ticks_skipped: u64,
    pub last_report: Option<SweepReport>,
    pub last_skip: Option<EngineIssue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Started,
    Skipped,
}

#[derive(Clone)]
pub struct SweepScheduler {
    engine: Arc<EscalationEngine>,
    interval: Duration,
    running: Arc<Mutex<()>>,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SweepScheduler {
    pub fn new(engine: Arc<EscalationEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            running: Arc::new(Mutex::new(())),
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
        }
    }

    pub fn status_handle(&self) -> Arc<RwLock<SchedulerStatus>> {
        self.status.clone()
    }

    /// Starts a sweep in the background unless one is already in flight.
    pub async fn tick(&self) -> (TickOutcome, Option<JoinHandle<()>>) {
        let guard = match self.running.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    event_name = "scheduler.tick.skipped",
                    correlation_id = "scheduler",
                    "previous sweep still running; skipping this tick"
                );
                let mut status = self.status.write().await;
                status.ticks_skipped += 1;
                status.last_skip = Some(EngineIssue::SchedulerOverrun);
                return (TickOutcome::Skipped, None);
            }
        };

        let engine = self.engine.clone();
        let status = self.status.clone();
        let handle = tokio::spawn(async move {
            let report = engine.sweep().await;
            let mut status = status.write().await;
            status.sweeps_completed += 1;
            status.last_report = Some(report);
            drop(guard);
        });

        (TickOutcome::Started, Some(handle))
    }

    /// Ticks on the configured interval until `shutdown` flips to `true`, then waits
    /// for an in-flight sweep to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            event_name = "scheduler.started",
            correlation_id = "scheduler",
            interval_secs = self.interval.as_secs(),
            "sweep scheduler started"
        );

        let mut in_flight: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let (_, handle) = self.tick().await;
                    if let Some(handle) = handle {
                        in_flight = Some(handle);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!(
                    event_name = "scheduler.draining",
                    correlation_id = "scheduler",
                    "waiting for in-flight sweep before shutdown"
                );
            }
            let _ = handle.await;
        }

        info!(event_name = "scheduler.stopped", correlation_id = "scheduler", "sweep scheduler stopped");
    }
}
