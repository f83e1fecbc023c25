// Monitor - one estimator → evaluator → controller cycle
//
// Faults are absorbed here, at the loop boundary:
// - acquisition errors skip the cycle; after N in a row the mic is reinitialized
// - decode errors feed the neutral reading to the evaluator
// - controller errors are logged and counted

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::analysis::{LevelEstimator, LoudnessReading, TriggerAction, TriggerEvaluator};
use crate::audio::SampleSource;
use crate::config::AppConfig;
use crate::error::{log_audio_error, log_lifecycle_error, AudioError, LifecycleError};
use crate::playback::{PlaybackController, PlaybackState, StartOutcome};
use crate::telemetry::{self, DeviceKind};

/// Counters accumulated over a supervisor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorCounters {
    pub cycles: u64,
    /// Play edges that started or resumed playback
    pub triggers: u64,
    /// Pause edges that paused playback
    pub pauses: u64,
    pub faults: u64,
    pub reinits: u64,
}

/// What a single cycle produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// A reading was evaluated (possibly the neutral one after a decode error)
    Evaluated {
        reading: LoudnessReading,
        action: Option<TriggerAction>,
    },
    /// The source failed; nothing was evaluated
    AcquisitionFailed,
}

pub struct Monitor {
    estimator: LevelEstimator,
    evaluator: TriggerEvaluator,
    buffer: Vec<u8>,
    clip: String,
    reinit_after: u32,
    log_every: u64,
    consecutive_failures: u32,
    counters: MonitorCounters,
}

impl Monitor {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            estimator: LevelEstimator::new(config.audio.sample_format, &config.level),
            evaluator: TriggerEvaluator::new(config.trigger.clone()),
            buffer: vec![0u8; config.audio.buffer_bytes],
            clip: config.playback.clip.clone(),
            reinit_after: config.supervisor.reinit_after_failures.max(1),
            log_every: config.supervisor.log_every_n_cycles,
            consecutive_failures: 0,
            counters: MonitorCounters::default(),
        }
    }

    pub fn counters(&self) -> MonitorCounters {
        self.counters
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one monitoring cycle
    pub fn cycle(
        &mut self,
        source: &mut dyn SampleSource,
        controller: &PlaybackController,
    ) -> CycleOutcome {
        self.counters.cycles += 1;
        let cycle = self.counters.cycles;

        let reading = match self.estimator.measure(source, &mut self.buffer) {
            Ok(reading) => {
                self.consecutive_failures = 0;
                reading
            }
            Err(err @ AudioError::Decode { .. }) => {
                self.consecutive_failures = 0;
                self.record_fault(&err, "Monitor::decode");
                LoudnessReading::neutral()
            }
            Err(err) => {
                self.record_fault(&err, "Monitor::acquire");
                self.on_acquisition_failure(source);
                return CycleOutcome::AcquisitionFailed;
            }
        };

        if self.log_every > 0 && cycle % self.log_every == 0 {
            tracing::debug!(
                "[Monitor] cycle={} rms={:.1} avg={:.1} level={:.1} d={:.1}",
                cycle,
                reading.rms,
                reading.avg_rms,
                reading.level,
                reading.derivative
            );
            telemetry::hub().record_reading(cycle, &reading);
        }

        let action = self.evaluator.evaluate(&reading).action();
        match action {
            Some(TriggerAction::Play) => self.apply_play(cycle, controller),
            Some(TriggerAction::Pause) => self.apply_pause(cycle, controller),
            // Playback dropped to Idle mid-streak; the edge will not fire again
            None if self.evaluator.sustains_play()
                && controller.state() == PlaybackState::Idle =>
            {
                tracing::debug!("[Monitor] Still loud with playback idle, restarting");
                self.apply_play(cycle, controller)
            }
            None => {}
        }

        CycleOutcome::Evaluated { reading, action }
    }

    fn apply_play(&mut self, cycle: u64, controller: &PlaybackController) {
        match controller.start(&self.clip) {
            Ok(StartOutcome::Started) | Ok(StartOutcome::Resumed) => {
                self.counters.triggers += 1;
                tracing::info!("[Monitor] Sound detected at cycle {}, playing", cycle);
                telemetry::hub().record_trigger(cycle, TriggerAction::Play);
            }
            Ok(StartOutcome::AlreadyPlaying) => {}
            // start() already logged it
            Err(err) => {
                self.counters.faults += 1;
                telemetry::hub().record_fault(&err, "Monitor::play");
            }
        }
    }

    fn apply_pause(&mut self, cycle: u64, controller: &PlaybackController) {
        match controller.pause() {
            Ok(true) => {
                self.counters.pauses += 1;
                tracing::info!("[Monitor] Quiet at cycle {}, pausing", cycle);
                telemetry::hub().record_trigger(cycle, TriggerAction::Pause);
            }
            Ok(false) => {}
            Err(err) => self.record_fault(&err, "Monitor::pause"),
        }
    }

    fn on_acquisition_failure(&mut self, source: &mut dyn SampleSource) {
        self.consecutive_failures += 1;
        if self.consecutive_failures < self.reinit_after {
            return;
        }

        tracing::warn!(
            "[Monitor] {} consecutive read failures, reinitializing microphone",
            self.consecutive_failures
        );
        self.consecutive_failures = 0;
        self.counters.reinits += 1;

        match source.reinit() {
            Ok(()) => telemetry::hub().record_reinit(DeviceKind::Microphone, true),
            Err(err) => {
                telemetry::hub().record_reinit(DeviceKind::Microphone, false);
                self.record_fault(&err, "Monitor::reinit");
            }
        }
    }

    fn record_fault(&mut self, err: &AudioError, context: &str) {
        self.counters.faults += 1;
        log_audio_error(err, context);
        telemetry::hub().record_fault(err, context);
    }

    /// Count a panic that unwound out of [`Self::cycle`]
    pub fn record_panic(&mut self, payload: &(dyn Any + Send)) {
        let err = LifecycleError::CyclePanicked {
            cycle: self.counters.cycles,
            reason: panic_reason(payload),
        };
        self.counters.faults += 1;
        log_lifecycle_error(&err, "Monitor::cycle");
        telemetry::hub().record_fault(&err, "Monitor::cycle");
    }

    /// Clear level history and trigger counters
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.evaluator.reset();
        self.consecutive_failures = 0;
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::decode::encode_s16le;
    use crate::analysis::TriggerPolicy;
    use crate::audio::stubs::{MemoryClipStore, NullSink, ScriptedSource};
    use crate::engine::RunState;
    use std::sync::Arc;

    fn acquisition_error() -> Result<Vec<u8>, AudioError> {
        Err(AudioError::Acquisition {
            reason: "dma timeout".to_string(),
        })
    }

    fn loud() -> Result<Vec<u8>, AudioError> {
        Ok(encode_s16le(&vec![4000i16; 1024]))
    }

    fn setup() -> (AppConfig, PlaybackController) {
        let mut config = AppConfig::default();
        config.trigger.policy = TriggerPolicy::Hysteresis;
        config.trigger.above_required = 1;
        let store = MemoryClipStore::new().with_clip("joey.raw", vec![0u8; 8192]);
        let controller = PlaybackController::new(
            Arc::new(store),
            Box::new(NullSink),
            config.playback.clone(),
            RunState::new(),
        );
        (config, controller)
    }

    #[test]
    fn test_reinit_after_consecutive_failures() {
        let (config, controller) = setup();
        let mut monitor = Monitor::new(&config);
        let mut source = ScriptedSource::new(vec![
            acquisition_error(),
            acquisition_error(),
            acquisition_error(),
            acquisition_error(),
        ]);
        let probe = source.probe();

        for _ in 0..4 {
            assert_eq!(
                monitor.cycle(&mut source, &controller),
                CycleOutcome::AcquisitionFailed
            );
        }
        assert_eq!(probe.reinits(), 1);
        assert_eq!(monitor.counters().reinits, 1);
        assert_eq!(monitor.consecutive_failures(), 1);
        assert_eq!(monitor.counters().faults, 4);
    }

    #[test]
    fn test_failed_reinit_counts_as_fault() {
        let (mut config, controller) = setup();
        config.supervisor.reinit_after_failures = 1;
        let mut monitor = Monitor::new(&config);
        let mut source = ScriptedSource::new(vec![acquisition_error()]).failing_reinit(
            AudioError::StreamOpenFailed {
                reason: "no device".to_string(),
            },
        );

        monitor.cycle(&mut source, &controller);
        assert_eq!(source.probe().reinits(), 1);
        assert_eq!(monitor.counters().reinits, 1);
        assert_eq!(monitor.counters().faults, 2);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let (config, controller) = setup();
        let mut monitor = Monitor::new(&config);
        let mut source = ScriptedSource::new(vec![
            acquisition_error(),
            acquisition_error(),
            Ok(vec![0u8; 2048]),
            acquisition_error(),
            acquisition_error(),
        ]);
        let probe = source.probe();
        for _ in 0..5 {
            monitor.cycle(&mut source, &controller);
        }
        assert_eq!(probe.reinits(), 0);
        assert_eq!(monitor.consecutive_failures(), 2);
    }

    #[test]
    fn test_decode_error_uses_neutral_reading() {
        let (config, controller) = setup();
        let mut monitor = Monitor::new(&config);
        let mut source = ScriptedSource::new(vec![Ok(vec![1, 2, 3])]);
        let outcome = monitor.cycle(&mut source, &controller);
        match outcome {
            CycleOutcome::Evaluated { reading, .. } => {
                assert_eq!(reading, LoudnessReading::neutral())
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(monitor.counters().faults, 1);
    }

    #[test]
    fn test_loud_cycle_starts_playback() {
        let (config, controller) = setup();
        let mut monitor = Monitor::new(&config);
        let mut source = ScriptedSource::new(vec![loud()]);
        let outcome = monitor.cycle(&mut source, &controller);
        assert!(matches!(
            outcome,
            CycleOutcome::Evaluated {
                action: Some(TriggerAction::Play),
                ..
            }
        ));
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(monitor.counters().triggers, 1);
        controller.stop().unwrap();
    }

    #[test]
    fn test_sustained_loudness_restarts_idle_playback() {
        let (config, controller) = setup();
        let mut monitor = Monitor::new(&config);
        let mut source = ScriptedSource::new(vec![loud(), loud(), loud()]);

        monitor.cycle(&mut source, &controller);
        assert_eq!(controller.state(), PlaybackState::Playing);
        // Playback ends on its own while the room stays loud
        controller.stop().unwrap();

        monitor.cycle(&mut source, &controller);
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(monitor.counters().triggers, 2);

        // Already playing: no extra trigger
        monitor.cycle(&mut source, &controller);
        assert_eq!(monitor.counters().triggers, 2);
        controller.stop().unwrap();
    }
}
