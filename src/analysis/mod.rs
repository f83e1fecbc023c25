// Analysis module - loudness estimation and trigger evaluation
//
// This module holds the per-cycle signal pipeline run by the monitoring loop.
//
// Architecture:
// - decode: raw PCM bytes → gain-adjusted, clamped i16 samples
// - level: RMS, rolling average, normalized level, derivative
// - trigger: play/pause decision (instantaneous or hysteresis policy)
//
// Nothing in here touches threads or devices; the engine module owns both.

use serde::{Deserialize, Serialize};

pub mod decode;
pub mod history;
pub mod level;
pub mod normalize;
pub mod trigger;

pub use history::RollingHistory;
pub use level::LevelEstimator;
pub use normalize::NormalizationCurve;
pub use trigger::{
    decide, RmsSource, TriggerAction, TriggerDecision, TriggerEvaluator, TriggerPolicy,
    TriggerState,
};

/// Loudness metrics for one sample buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoudnessReading {
    /// Population RMS of the current buffer (post gain/clamp)
    pub rms: f64,
    /// Mean RMS over the rolling history
    pub avg_rms: f64,
    /// Normalized loudness in [0, 100]
    pub level: f64,
    /// Current RMS minus the mean of the recent raw RMS values
    pub derivative: f64,
}

impl LoudnessReading {
    /// Reading substituted when a buffer cannot be decoded
    pub fn neutral() -> Self {
        Self::default()
    }
}
