//! Supervisor: wires the collaborators together and owns the run lifecycle.
//!
//! `run()` validates configuration, starts the watchdog, drives the
//! monitoring loop on the caller's thread, and tears everything down in a
//! fixed order once `RunState` clears or the cycle limit is hit:
//! playback stop (join) → history reset → watchdog join → device release.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioSink, ClipStore, SampleSource};
use crate::config::AppConfig;
use crate::engine::monitor::Monitor;
use crate::engine::watchdog::Watchdog;
use crate::engine::RunState;
use crate::error::{log_audio_error, log_lifecycle_error, LifecycleError};
use crate::playback::PlaybackController;
use crate::telemetry::{self, LifecyclePhase};

/// Totals reported when a run ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub triggers: u64,
    pub pauses: u64,
    pub faults: u64,
    pub reinits: u64,
    pub sink_resets: u64,
    pub bytes_played: u64,
    pub watchdog_ticks: u64,
}

pub struct Supervisor {
    config: AppConfig,
    run_state: RunState,
    max_cycles: Option<u64>,
    active: AtomicBool,
}

impl Supervisor {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            run_state: RunState::new(),
            max_cycles: None,
            active: AtomicBool::new(false),
        }
    }

    /// Stop after `cycles` monitoring cycles even if still running
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Share an externally owned run flag (e.g. one cleared by Ctrl-C)
    pub fn with_run_state(mut self, run_state: RunState) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn run_state(&self) -> RunState {
        self.run_state.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run until `RunState` clears or the cycle limit is reached
    ///
    /// Collaborators are released before returning, on success and on
    /// initialization failure alike.
    ///
    /// # Errors
    /// - `InvalidConfig` if the configuration fails validation
    /// - `InitFailed` if the configured clip is missing
    /// - `AlreadyRunning` if called while another `run()` is active
    /// - `WatchdogFailed` if the watchdog cannot start or panicked
    pub fn run(
        &self,
        mut source: Box<dyn SampleSource>,
        mut sink: Box<dyn AudioSink>,
        clips: Arc<dyn ClipStore>,
    ) -> Result<RunSummary, LifecycleError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyRunning);
        }
        let _active = ActiveGuard(&self.active);

        match self.initialize(clips.as_ref()) {
            Ok(()) => self.run_initialized(&mut source, sink, clips),
            Err(err) => {
                log_lifecycle_error(&err, "Supervisor::initialize");
                source.release();
                sink.release();
                Err(err)
            }
        }
    }

    fn initialize(&self, clips: &dyn ClipStore) -> Result<(), LifecycleError> {
        self.config.validate()?;

        let clip = &self.config.playback.clip;
        if !clips.contains(clip) {
            return Err(LifecycleError::InitFailed {
                component: "clip_store".to_string(),
                reason: format!("clip '{}' not found", clip),
            });
        }
        Ok(())
    }

    fn run_initialized(
        &self,
        source: &mut Box<dyn SampleSource>,
        mut sink: Box<dyn AudioSink>,
        clips: Arc<dyn ClipStore>,
    ) -> Result<RunSummary, LifecycleError> {
        let supervisor_config = &self.config.supervisor;

        let watchdog = match Watchdog::spawn(supervisor_config, self.run_state.clone()) {
            Ok(watchdog) => watchdog,
            Err(err) => {
                log_lifecycle_error(&err, "Supervisor::run");
                source.release();
                sink.release();
                return Err(err);
            }
        };

        let controller = PlaybackController::new(
            clips,
            sink,
            self.config.playback.clone(),
            self.run_state.clone(),
        );
        let mut monitor = Monitor::new(&self.config);
        let interval = supervisor_config.cycle_interval();

        tracing::info!(
            "[Supervisor] Monitoring started (policy={:?}, clip='{}')",
            self.config.trigger.policy,
            self.config.playback.clip
        );
        telemetry::hub().record_phase(LifecyclePhase::Started);

        while self.run_state.is_running() && !self.limit_reached(monitor.counters().cycles) {
            let started = Instant::now();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| monitor.cycle(source.as_mut(), &controller)));
            if let Err(payload) = outcome {
                monitor.record_panic(payload.as_ref());
            }
            telemetry::hub().record_cycle_time(started.elapsed());

            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }

        tracing::info!("[Supervisor] Shutting down");
        telemetry::hub().record_phase(LifecyclePhase::ShuttingDown);

        let mut summary = RunSummary::default();
        if let Err(err) = controller.stop() {
            log_audio_error(&err, "Supervisor::shutdown");
            summary.faults += 1;
        }

        monitor.reset();

        self.run_state.request_stop();
        let watchdog_result = watchdog.join();

        source.release();
        controller.release_sink();

        let counters = monitor.counters();
        let playback = controller.snapshot();
        summary.cycles = counters.cycles;
        summary.triggers = counters.triggers;
        summary.pauses = counters.pauses;
        summary.faults += counters.faults;
        summary.reinits = counters.reinits;
        summary.sink_resets = playback.sink_resets;
        summary.bytes_played = playback.bytes_written;

        telemetry::hub().record_phase(LifecyclePhase::Stopped);

        match watchdog_result {
            Ok(ticks) => {
                summary.watchdog_ticks = ticks;
                tracing::info!(
                    "[Supervisor] Stopped after {} cycles ({} triggers, {} faults)",
                    summary.cycles,
                    summary.triggers,
                    summary.faults
                );
                Ok(summary)
            }
            Err(err) => {
                log_lifecycle_error(&err, "Supervisor::shutdown");
                Err(err)
            }
        }
    }

    fn limit_reached(&self, cycles: u64) -> bool {
        self.max_cycles.map(|max| cycles >= max).unwrap_or(false)
    }
}

/// Clears the supervisor's active flag however `run` exits
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests;
