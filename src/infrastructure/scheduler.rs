//! Cycle Scheduler
//!
//! Periodic trigger that starts a dispatch cycle every interval.
//!
//! Each tick spawns its cycle instead of awaiting it, so a tick that lands
//! while the previous cycle is still running reaches the service's run-lock
//! and can flag a stuck cycle for cancellation.

use crate::application::{CycleOutcome, SyndicationService};
use crate::infrastructure::shutdown::ShutdownController;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct Scheduler {
    service: Arc<SyndicationService>,
    interval: Duration,
    shutdown: ShutdownController,
}

impl Scheduler {
    pub fn new(service: Arc<SyndicationService>, interval: Duration, shutdown: ShutdownController) -> Self {
        Self {
            service,
            interval: interval.max(Duration::from_millis(1)),
            shutdown,
        }
    }

    /// Run the trigger loop in the background until shutdown.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("scheduler started: cycle every {}s", self.interval.as_secs_f64());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.shutdown.is_shutdown() {
                        break;
                    }
                    self.trigger();
                }
                _ = self.shutdown.stopped() => break,
            }
        }

        tracing::info!("scheduler stopped");
    }

    /// Start one cycle in the background. The cycle is registered with the
    /// shutdown controller, which cancels it on shutdown.
    pub fn trigger(&self) -> JoinHandle<Option<CycleOutcome>> {
        let service = self.service.clone();
        let cycle = self.shutdown.begin_cycle();
        tokio::spawn(async move {
            match service.run_cycle_with(cycle.cancel_flag()).await {
                Ok(outcome) => {
                    if outcome == CycleOutcome::Skipped {
                        tracing::debug!("tick skipped: previous cycle still running");
                    }
                    Some(outcome)
                }
                Err(e) => {
                    tracing::error!("cycle failed: {}", e);
                    None
                }
            }
        })
    }
}
