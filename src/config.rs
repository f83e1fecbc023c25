//! Configuration management for dynamic parameter tuning
//!
//! Every threshold, interval and calibration constant of the device lives
//! here instead of being scattered through the loops. Values are loaded
//! from a JSON file so a deployed unit can be re-tuned without a rebuild;
//! missing fields fall back to the defaults below, which match the
//! calibration of the first hardware units.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::analysis::normalize::NormalizationCurve;
use crate::analysis::trigger::{RmsSource, TriggerPolicy};
use crate::error::LifecycleError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub level: LevelConfig,
    pub trigger: TriggerConfig,
    pub playback: PlaybackConfig,
    pub supervisor: SupervisorConfig,
}

/// Raw PCM encoding of the sample source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 16-bit signed little-endian
    S16Le,
    /// 32-bit signed little-endian, downsampled to the high 16 bits
    S32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S32Le => 4,
        }
    }
}

/// Sample source parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz (mono)
    pub sample_rate: u32,
    /// Bytes read from the source per monitoring cycle
    pub buffer_bytes: usize,
    pub sample_format: SampleFormat,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            buffer_bytes: 2048,
            sample_format: SampleFormat::S16Le,
        }
    }
}

impl AudioConfig {
    /// Duration of audio covered by one sample buffer
    pub fn buffer_duration(&self) -> Duration {
        let samples = self.buffer_bytes / self.sample_format.bytes_per_sample();
        Duration::from_micros(samples as u64 * 1_000_000 / self.sample_rate.max(1) as u64)
    }
}

/// Level estimator calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Integer gain applied before clamping to the 16-bit range
    pub gain: i32,
    /// Right shift applied before gain (SPH0645 data alignment correction)
    pub correction_shift: u32,
    /// RMS at or below which the level reads 0
    pub min_rms: f64,
    /// RMS at or above which the level reads 100
    pub max_rms: f64,
    pub curve: NormalizationCurve,
    /// Capacity of the averaging history (~1 second of buffers)
    pub history_size: usize,
    /// Number of raw RMS values the derivative is measured against
    pub trend_window: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            gain: 5,
            correction_shift: 0,
            min_rms: 3550.0,
            max_rms: 4100.0,
            curve: NormalizationCurve::Logarithmic,
            history_size: 10,
            trend_window: 3,
        }
    }
}

/// Trigger evaluator thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub policy: TriggerPolicy,
    pub rms_source: RmsSource,
    pub rms_threshold: f64,
    pub derivative_threshold: f64,
    /// Consecutive loud cycles before playback starts (hysteresis policy)
    pub above_required: u32,
    /// Consecutive quiet cycles before playback pauses (hysteresis policy)
    pub below_required: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            policy: TriggerPolicy::Instantaneous,
            rms_source: RmsSource::Average,
            rms_threshold: 18_300.0,
            derivative_threshold: 1000.0,
            above_required: 5,
            below_required: 2,
        }
    }
}

/// Playback controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Clip identifier played on trigger
    pub clip: String,
    /// Bytes moved from clip to sink per write
    pub chunk_bytes: usize,
    /// Sleep after each chunk write, in milliseconds
    pub write_yield_ms: u64,
    /// Poll interval while paused, in milliseconds
    pub pause_poll_ms: u64,
    /// Restart the clip from byte 0 at end-of-clip while still playing
    pub loop_playback: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            clip: "joey.raw".to_string(),
            chunk_bytes: 1024,
            write_yield_ms: 1,
            pause_poll_ms: 100,
            loop_playback: true,
        }
    }
}

impl PlaybackConfig {
    pub fn write_yield(&self) -> Duration {
        Duration::from_millis(self.write_yield_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

/// Supervisor and watchdog parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Sleep between monitoring cycles, in milliseconds (0 = paced by the source)
    pub cycle_interval_ms: u64,
    /// Consecutive acquisition failures before the source is reinitialized
    pub reinit_after_failures: u32,
    /// Watchdog grace period before the first tick, in milliseconds
    pub watchdog_startup_ms: u64,
    /// Watchdog tick interval, in milliseconds
    pub watchdog_tick_ms: u64,
    /// Ticks between watchdog heartbeat log lines
    pub watchdog_report_every: u64,
    /// Publish a reading to telemetry every N cycles
    pub log_every_n_cycles: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 0,
            reinit_after_failures: 3,
            watchdog_startup_ms: 5000,
            watchdog_tick_ms: 100,
            watchdog_report_every: 300,
            log_every_n_cycles: 1,
        }
    }
}

impl SupervisorConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn watchdog_startup(&self) -> Duration {
        Duration::from_millis(self.watchdog_startup_ms)
    }

    pub fn watchdog_tick(&self) -> Duration {
        Duration::from_millis(self.watchdog_tick_ms)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LifecycleError {
    LifecycleError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// `InvalidConfig` if the file cannot be read, parsed or validated.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LifecycleError> {
        let contents = fs::read_to_string(&path)
            .map_err(|err| invalid("config_file", format!("{:?}: {}", path.as_ref(), err)))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .map_err(|err| invalid("config_file", format!("{:?}: {}", path.as_ref(), err)))?;
        config.validate()?;
        log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("[Config] {}. Using defaults.", err);
                Self::default()
            }
        }
    }

    /// Reject values that would make the loops misbehave
    pub fn validate(&self) -> Result<(), LifecycleError> {
        let width = self.audio.sample_format.bytes_per_sample();
        if self.audio.buffer_bytes == 0 || self.audio.buffer_bytes % width != 0 {
            return Err(invalid(
                "audio.buffer_bytes",
                format!("must be a non-zero multiple of {}", width),
            ));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than 0"));
        }
        if self.level.gain <= 0 {
            return Err(invalid("level.gain", "must be greater than 0"));
        }
        if self.level.correction_shift > 15 {
            return Err(invalid("level.correction_shift", "must be at most 15"));
        }
        if !(self.level.min_rms >= 0.0 && self.level.max_rms > self.level.min_rms) {
            return Err(invalid(
                "level.max_rms",
                format!(
                    "band [{}, {}] must be non-negative and non-empty",
                    self.level.min_rms, self.level.max_rms
                ),
            ));
        }
        if let NormalizationCurve::Power { exponent } = self.level.curve {
            if !(exponent > 0.0 && exponent.is_finite()) {
                return Err(invalid("level.curve.exponent", "must be positive"));
            }
        }
        if self.level.history_size == 0 {
            return Err(invalid("level.history_size", "must be greater than 0"));
        }
        if self.level.trend_window == 0 {
            return Err(invalid("level.trend_window", "must be greater than 0"));
        }
        if self.trigger.above_required == 0 {
            return Err(invalid("trigger.above_required", "must be at least 1"));
        }
        if self.trigger.below_required == 0 {
            return Err(invalid("trigger.below_required", "must be at least 1"));
        }
        if self.playback.chunk_bytes == 0 || self.playback.chunk_bytes % 2 != 0 {
            return Err(invalid(
                "playback.chunk_bytes",
                "must be a non-zero multiple of 2",
            ));
        }
        if self.playback.clip.is_empty() {
            return Err(invalid("playback.clip", "must not be empty"));
        }
        if self.playback.pause_poll_ms == 0 {
            return Err(invalid("playback.pause_poll_ms", "must be greater than 0"));
        }
        if self.supervisor.watchdog_tick_ms == 0 {
            return Err(invalid("supervisor.watchdog_tick_ms", "must be greater than 0"));
        }
        Ok(())
    }
}
