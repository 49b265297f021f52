//! Cycle Lifecycle and Shutdown
//!
//! Owns the cancel flag of every dispatch cycle the scheduler starts. A
//! shutdown raises all of them, so each running cycle stops at its next job
//! boundary, and `wait_for_drain` then waits for those cycles to return.

use crate::application::CancelFlag;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Inner {
    stop: watch::Sender<bool>,
    /// Cycle number -> its cancel flag
    cycles: Mutex<BTreeMap<u64, CancelFlag>>,
    in_flight: watch::Sender<usize>,
    next_cycle: AtomicU64,
}

/// Stop signal plus the set of cycles still in flight.
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                stop,
                cycles: Mutex::new(BTreeMap::new()),
                in_flight,
                next_cycle: AtomicU64::new(0),
            }),
        }
    }

    /// Raise the stop signal and cancel every cycle in flight.
    pub fn shutdown(&self) {
        if self.inner.stop.send_replace(true) {
            return;
        }
        let cycles = self.inner.cycles.lock();
        for cancel in cycles.values() {
            cancel.store(true, Ordering::SeqCst);
        }
        tracing::info!("shutdown initiated; {} cycle(s) asked to stop", cycles.len());
    }

    pub fn is_shutdown(&self) -> bool {
        *self.inner.stop.borrow()
    }

    /// Resolves once `shutdown` has been called.
    pub async fn stopped(&self) {
        let mut rx = self.inner.stop.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Register a cycle for the lifetime of the returned guard. A cycle
    /// begun after shutdown starts out cancelled.
    pub fn begin_cycle(&self) -> CycleGuard {
        let id = self.inner.next_cycle.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        {
            let mut cycles = self.inner.cycles.lock();
            cancel.store(self.is_shutdown(), Ordering::SeqCst);
            cycles.insert(id, cancel.clone());
            self.inner.in_flight.send_replace(cycles.len());
        }
        CycleGuard {
            id,
            cancel,
            controller: self.clone(),
        }
    }

    pub fn cycles_in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Wait until no cycle is in flight. False when `timeout` ran out first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.in_flight.subscribe();
        let drained = match tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!("drain timeout: {} cycle(s) still running", self.cycles_in_flight());
                false
            }
        };
        drained
    }

    fn end_cycle(&self, id: u64) {
        let mut cycles = self.inner.cycles.lock();
        cycles.remove(&id);
        self.inner.in_flight.send_replace(cycles.len());
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered cycle; dropping it marks the cycle finished.
pub struct CycleGuard {
    id: u64,
    cancel: CancelFlag,
    controller: ShutdownController,
}

impl CycleGuard {
    /// Flag to hand to `SyndicationService::run_cycle_with`.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.controller.end_cycle(self.id);
    }
}

/// Resolves on Ctrl+C or SIGTERM and then shuts `controller` down.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    controller.shutdown();
}
