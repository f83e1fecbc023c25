//! Playback module: a controller that streams one clip to the speaker on a
//! dedicated thread and is driven by play/pause edges from the monitoring loop.
//!
//! The controller and its worker share a single `PlaybackFlags` value behind
//! one mutex. The lock is held only to read or update the flags, never across
//! clip or sink I/O.

use serde::{Deserialize, Serialize};

pub mod controller;
mod worker;

pub use controller::PlaybackController;

/// Lifecycle of the playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    /// `stop()` is joining the worker
    Stopping,
}

/// Shared flags between controller and streaming worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PlaybackFlags {
    pub state: PlaybackState,
    pub should_continue: bool,
    pub paused: bool,
    pub clip: Option<String>,
}

/// What `start()` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// Opened the clip and spawned a streaming worker
    Started,
    /// Cleared the pause on the existing worker
    Resumed,
    AlreadyPlaying,
}

/// Point-in-time view of the controller for logs, tests and the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub clip: Option<String>,
    pub paused: bool,
    pub should_continue: bool,
    /// Streaming workers spawned so far
    pub sessions: u64,
    pub bytes_written: u64,
    pub sink_resets: u64,
}
