//! Periodic refresh of one config entry
//!
//! The scheduler wakes every scan interval, runs one coordinator cycle under
//! the cycle deadline and records the outcome in a shared [`RefreshStatus`].
//! Cycles never overlap: the loop awaits each one before waiting for the
//! next tick.
//!
//! ```text
//!          ┌──────────── tick ◀───────────┐
//!          ▼                              │
//!   refresh_within(deadline) ──ok/failed──┘
//!          │
//!          └── AuthRequired ──▶ state = ReauthRequired, loop exits
//! ```
//!
//! Flipping the stop signal ends the loop, dropping any cycle in flight.

pub mod status;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::api::InsiderApi;
use crate::config::PollingConfig;
use crate::coordinator::UpdateCoordinator;

pub use status::{EntryState, RefreshStatus};

/// Coordinator handle shared by the entry and its scheduler
pub type SharedCoordinator<A> = Arc<Mutex<UpdateCoordinator<A>>>;

/// Runs coordinator cycles on a fixed interval
pub struct RefreshScheduler<A> {
    coordinator: SharedCoordinator<A>,
    status: Arc<RwLock<RefreshStatus>>,
    scan_interval: Duration,
    cycle_timeout: Duration,
}

impl<A: InsiderApi + 'static> RefreshScheduler<A> {
    pub fn new(
        coordinator: SharedCoordinator<A>,
        status: Arc<RwLock<RefreshStatus>>,
        polling: &PollingConfig,
    ) -> Self {
        Self {
            coordinator,
            status,
            scan_interval: polling.scan_interval(),
            cycle_timeout: polling.cycle_timeout(),
        }
    }

    /// Override the interval and deadline, mostly for tests
    pub fn with_timing(mut self, scan_interval: Duration, cycle_timeout: Duration) -> Self {
        self.scan_interval = scan_interval;
        self.cycle_timeout = cycle_timeout;
        self
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    /// Shared refresh status
    pub fn status(&self) -> Arc<RwLock<RefreshStatus>> {
        Arc::clone(&self.status)
    }

    /// Run one cycle and record it, returning false when polling must stop
    pub async fn run_once(&self) -> bool {
        let result = {
            let mut coordinator = self.coordinator.lock().await;
            coordinator.refresh_within(self.cycle_timeout).await
        };

        let mut status = self.status.write().await;
        match result {
            Ok(report) => {
                status.record_success(&report);
                true
            }
            Err(e) => {
                status.record_failure(&e);
                if e.is_recoverable() {
                    tracing::warn!(
                        error = %e,
                        consecutive_failures = status.consecutive_failures,
                        "Scheduled refresh failed, retrying next interval"
                    );
                    true
                } else {
                    tracing::error!(error = %e, "Credentials rejected, polling stopped");
                    false
                }
            }
        }
    }

    /// Poll until stopped or credentials are rejected
    ///
    /// The first cycle runs one interval after start; the initial refresh is
    /// the caller's job.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.scan_interval, self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.scan_interval.as_secs(),
            deadline_secs = self.cycle_timeout.as_secs(),
            "Refresh scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_requested(&mut stop) => break,
            }

            let keep_going = tokio::select! {
                keep_going = self.run_once() => keep_going,
                _ = stop_requested(&mut stop) => break,
            };

            if !keep_going {
                break;
            }
        }

        tracing::info!("Refresh scheduler stopped");
    }

    /// Run the scheduler on its own task
    pub fn spawn(self, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }
}

/// Resolves once the stop flag is true or its sender is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if *stop.borrow_and_update() {
        return;
    }
    while stop.changed().await.is_ok() {
        if *stop.borrow_and_update() {
            return;
        }
    }
}
