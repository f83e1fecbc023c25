// Level module - per-cycle loudness estimation
//
// Pipeline for one sample buffer:
//   decode (sign-extend, gain, clamp) → population RMS → 1 s rolling average
//   → normalized 0-100 level → short-horizon derivative
//
// The derivative is measured against the last few raw RMS values rather than
// the 1 s average, so a sudden spike stands out even while the average is
// still climbing.

use crate::analysis::decode::SampleDecoder;
use crate::analysis::history::RollingHistory;
use crate::analysis::normalize::{normalized_level, NormalizationCurve};
use crate::analysis::LoudnessReading;
use crate::audio::SampleSource;
use crate::config::{LevelConfig, SampleFormat};
use crate::error::AudioError;

/// Population RMS of a block of samples
///
/// Returns 0.0 for an empty block.
pub fn compute_rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Stateful loudness estimator owned by the monitoring loop
#[derive(Debug, Clone)]
pub struct LevelEstimator {
    decoder: SampleDecoder,
    min_rms: f64,
    max_rms: f64,
    curve: NormalizationCurve,
    history: RollingHistory,
    trend: RollingHistory,
    scratch: Vec<i16>,
}

impl LevelEstimator {
    pub fn new(format: SampleFormat, config: &LevelConfig) -> Self {
        Self {
            decoder: SampleDecoder::from_config(format, config),
            min_rms: config.min_rms,
            max_rms: config.max_rms,
            curve: config.curve,
            history: RollingHistory::new(config.history_size),
            trend: RollingHistory::seeded(config.trend_window, 0.0),
            scratch: Vec::new(),
        }
    }

    /// Evaluate one raw sample buffer
    ///
    /// On success the rolling histories advance by one entry.
    ///
    /// # Errors
    /// `AudioError::Decode` if the buffer is malformed. History is left
    /// untouched; callers substitute [`LoudnessReading::neutral`].
    pub fn evaluate(&mut self, buffer: &[u8]) -> Result<LoudnessReading, AudioError> {
        self.decoder.decode_into(buffer, &mut self.scratch)?;

        let rms = compute_rms(&self.scratch);

        self.history.push(rms);
        let avg_rms = self.history.mean();

        let level = normalized_level(rms, self.min_rms, self.max_rms, self.curve);

        let derivative = rms - self.trend.mean();
        self.trend.push(rms);

        Ok(LoudnessReading {
            rms,
            avg_rms,
            level,
            derivative,
        })
    }

    /// Read one buffer from `source` and evaluate it
    ///
    /// # Errors
    /// Acquisition errors from the source are returned unchanged so the
    /// caller can apply its retry policy. A read that fills less than the
    /// whole buffer is a decode error, as are the cases in [`Self::evaluate`].
    pub fn measure(
        &mut self,
        source: &mut dyn SampleSource,
        buffer: &mut [u8],
    ) -> Result<LoudnessReading, AudioError> {
        let filled = source.read(buffer)?.min(buffer.len());
        if filled < buffer.len() {
            return Err(AudioError::Decode {
                len: filled,
                reason: format!("short read, expected {} bytes", buffer.len()),
            });
        }
        self.evaluate(buffer)
    }

    /// Clear the rolling histories
    pub fn reset(&mut self) {
        self.history.clear();
        self.trend.fill(0.0);
        self.scratch.clear();
    }

    pub fn history(&self) -> &RollingHistory {
        &self.history
    }
}
