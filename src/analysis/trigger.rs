use serde::{Deserialize, Serialize};

use crate::analysis::LoudnessReading;
use crate::config::TriggerConfig;

/// Decision rule used by the trigger evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Play while `rms > threshold || derivative > derivative_threshold`, pause otherwise
    Instantaneous,
    /// Edge-triggered play/pause after N consecutive loud/quiet cycles
    Hysteresis,
}

/// Which RMS value from the reading is compared against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RmsSource {
    /// Rolling ~1 s average
    Average,
    /// RMS of the current buffer only
    Instantaneous,
}

/// Consecutive-cycle counters
///
/// At most one counter is non-zero after any update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerState {
    pub above_count: u32,
    pub below_count: u32,
}

impl TriggerState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Output of one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerDecision {
    pub should_play: bool,
    pub should_pause: bool,
}

/// Action the controller should take, pause preferred on conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    Play,
    Pause,
}

impl TriggerDecision {
    pub fn action(&self) -> Option<TriggerAction> {
        if self.should_pause {
            Some(TriggerAction::Pause)
        } else if self.should_play {
            Some(TriggerAction::Play)
        } else {
            None
        }
    }
}

/// Evaluate one reading against `config`, updating `state` in place
///
/// Pure apart from `state`: the same reading sequence always produces the
/// same decisions.
pub fn decide(
    reading: &LoudnessReading,
    state: &mut TriggerState,
    config: &TriggerConfig,
) -> TriggerDecision {
    let rms = match config.rms_source {
        RmsSource::Average => reading.avg_rms,
        RmsSource::Instantaneous => reading.rms,
    };
    let loud = rms > config.rms_threshold;

    let mut decision = match config.policy {
        TriggerPolicy::Instantaneous => {
            let triggered = loud || reading.derivative > config.derivative_threshold;
            TriggerDecision {
                should_play: triggered,
                should_pause: !triggered,
            }
        }
        TriggerPolicy::Hysteresis => {
            if loud {
                state.above_count = state.above_count.saturating_add(1);
                state.below_count = 0;
            } else {
                state.below_count = state.below_count.saturating_add(1);
                state.above_count = 0;
            }

            // Equality, not >=: only the crossing cycle emits
            TriggerDecision {
                should_play: state.above_count == config.above_required,
                should_pause: state.below_count == config.below_required,
            }
        }
    };

    if decision.should_play && decision.should_pause {
        decision.should_play = false;
    }
    decision
}

/// Trigger configuration plus its persistent state
#[derive(Debug, Clone)]
pub struct TriggerEvaluator {
    config: TriggerConfig,
    state: TriggerState,
}

impl TriggerEvaluator {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            state: TriggerState::default(),
        }
    }

    pub fn evaluate(&mut self, reading: &LoudnessReading) -> TriggerDecision {
        decide(reading, &mut self.state, &self.config)
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.config.policy
    }

    /// Loud streak is past its play edge under the hysteresis policy
    ///
    /// The edge fires once per streak. Callers use this to restart playback
    /// that ended on its own (sink fault, failed start, unlooped clip) while
    /// the streak lasts.
    pub fn sustains_play(&self) -> bool {
        self.config.policy == TriggerPolicy::Hysteresis
            && self.state.above_count > self.config.above_required
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }
}
