//! Liveness watchdog.
//!
//! Sleeps through a startup grace period, then ticks at a fixed interval
//! and emits a heartbeat every `report_every` ticks until `RunState` clears.
//! The grace period and ticks are sliced so a shutdown is noticed within
//! one tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::SupervisorConfig;
use crate::engine::RunState;
use crate::error::LifecycleError;
use crate::telemetry;

/// Dropping an unjoined watchdog clears `RunState` and joins the thread.
pub struct Watchdog {
    ticks: Arc<AtomicU64>,
    run_state: RunState,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn the watchdog thread
    ///
    /// # Errors
    /// `LifecycleError::WatchdogFailed` if the thread cannot be spawned.
    pub fn spawn(config: &SupervisorConfig, run_state: RunState) -> Result<Self, LifecycleError> {
        let ticks = Arc::new(AtomicU64::new(0));
        let startup = config.watchdog_startup();
        let tick = config.watchdog_tick().max(Duration::from_millis(1));
        let report_every = config.watchdog_report_every;

        let counter = Arc::clone(&ticks);
        let thread_state = run_state.clone();
        let handle = thread::Builder::new()
            .name("ambient-watchdog".to_string())
            .spawn(move || run(startup, tick, report_every, thread_state, counter))
            .map_err(|e| LifecycleError::WatchdogFailed {
                reason: e.to_string(),
            })?;

        Ok(Self {
            ticks,
            run_state,
            handle: Some(handle),
        })
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Join the thread. The caller must have cleared `RunState` first.
    pub fn join(mut self) -> Result<u64, LifecycleError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| LifecycleError::WatchdogFailed {
                reason: "watchdog thread panicked".to_string(),
            })?;
        }
        Ok(self.ticks())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::warn!("[Watchdog] Dropped while running, stopping");
            self.run_state.request_stop();
            let _ = handle.join();
        }
    }
}

fn run(
    startup: Duration,
    tick: Duration,
    report_every: u64,
    run_state: RunState,
    ticks: Arc<AtomicU64>,
) {
    tracing::debug!("[Watchdog] Startup grace {:?}", startup);
    let grace_end = Instant::now() + startup;
    while run_state.is_running() && Instant::now() < grace_end {
        thread::sleep(tick.min(grace_end.saturating_duration_since(Instant::now())));
    }

    while run_state.is_running() {
        thread::sleep(tick);
        let count = ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if report_every > 0 && count % report_every == 0 {
            tracing::info!("[Watchdog] Alive, {} ticks", count);
            telemetry::hub().record_heartbeat(count);
        }
    }

    tracing::debug!("[Watchdog] Exiting after {} ticks", ticks.load(Ordering::Relaxed));
}
