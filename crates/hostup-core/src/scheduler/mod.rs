//! Interval and manual-trigger scheduling of reconciliation cycles
//!
//! The scheduler owns the overlap guard. A tick or manual trigger that finds
//! a cycle already running is skipped and reported as
//! [`EngineEvent::CycleSkipped`]; it is never queued.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info};

use crate::config::ScheduleConfig;
use crate::engine::{CycleReport, EngineEvent, ReconciliationEngine};
use crate::shutdown::Shutdown;

/// Pending manual triggers beyond this are dropped
const TRIGGER_QUEUE_DEPTH: usize = 8;

/// Handle for requesting an immediate cycle
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Ask for a cycle now
    ///
    /// Returns `false` if the scheduler is gone or already has triggers pending.
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
enum CycleCause {
    Tick,
    Manual,
}

impl std::fmt::Display for CycleCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleCause::Tick => f.write_str("interval tick"),
            CycleCause::Manual => f.write_str("manual trigger"),
        }
    }
}

/// Drives a [`ReconciliationEngine`] on a fixed interval
///
/// ## Lifecycle
///
/// 1. Create with [`Scheduler::new()`]
/// 2. Hand out [`TriggerHandle`]s with [`Scheduler::trigger_handle()`]
/// 3. [`Scheduler::run()`] until the [`Shutdown`] fires
///
/// The first tick fires immediately. Missed ticks are skipped rather than
/// bunched up, and a manual trigger does not shift the interval's phase.
pub struct Scheduler {
    engine: Arc<ReconciliationEngine>,
    interval: Duration,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: mpsc::Receiver<()>,
    cycle_guard: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, config: &ScheduleConfig) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        Self {
            engine,
            interval: config.interval(),
            trigger_tx,
            trigger_rx,
            cycle_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        TriggerHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Run until `shutdown` fires, then wait for the in-flight cycle
    pub async fn run(mut self, shutdown: Shutdown) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        let mut in_flight: Option<JoinHandle<CycleReport>> = None;

        info!(
            "Scheduler started for {} (interval: {:?})",
            self.engine.record().hostname,
            self.interval
        );

        loop {
            let cause = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                Some(_) = ticks.next() => CycleCause::Tick,
                Some(()) = self.trigger_rx.recv() => CycleCause::Manual,
            };

            if let Some(handle) = self.start_cycle(cause, &shutdown) {
                in_flight = Some(handle);
            }
        }

        info!("Shutdown signal received");
        if let Some(handle) = in_flight.take() {
            if !handle.is_finished() {
                info!("Waiting for in-flight cycle to finish");
            }
            if let Err(e) = handle.await {
                error!("Cycle task failed: {}", e);
            }
        }

        self.engine.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Scheduler stopped");
    }

    /// Spawn a cycle unless one is already running
    fn start_cycle(&self, cause: CycleCause, shutdown: &Shutdown) -> Option<JoinHandle<CycleReport>> {
        let permit = match self.cycle_guard.clone().try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => {
                info!("Cycle already running, skipping {}", cause);
                self.engine.emit_event(EngineEvent::CycleSkipped {
                    reason: format!("{} while a cycle was running", cause),
                });
                return None;
            }
        };

        debug!("Starting cycle ({})", cause);
        let engine = Arc::clone(&self.engine);
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            let _permit = permit;
            engine.run_cycle(&shutdown).await
        }))
    }
}
