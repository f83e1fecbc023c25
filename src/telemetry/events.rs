//! Telemetry event types exposed to the CLI and log consumers.

use serde::{Deserialize, Serialize};

use crate::analysis::TriggerAction;
use crate::playback::PlaybackState;

/// Supervisor lifecycle stages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Started,
    ShuttingDown,
    Stopped,
}

/// Device a reinit/reset was issued against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Microphone,
    Speaker,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    Reading {
        cycle: u64,
        rms: f64,
        avg_rms: f64,
        level: f64,
        derivative: f64,
    },
    Trigger {
        cycle: u64,
        action: TriggerAction,
    },
    Playback {
        state: PlaybackState,
    },
    DeviceReinit {
        device: DeviceKind,
        success: bool,
    },
    CycleTiming {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Fault {
        code: i32,
        context: String,
    },
    Heartbeat {
        ticks: u64,
    },
}
