// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported in logs and
/// telemetry `Fault` events.
///
/// Error code range: 2001-2010
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Sample source read failed
    pub const ACQUISITION: i32 = 2001;

    /// Sample buffer could not be decoded
    pub const DECODE: i32 = 2002;

    /// Chunk write to the audio sink failed
    pub const SINK_WRITE: i32 = 2003;

    /// Audio sink deinit/reinit failed
    pub const SINK_RESET: i32 = 2004;

    /// Requested clip does not exist in the clip store
    pub const CLIP_NOT_FOUND: i32 = 2005;

    /// Reading a chunk from an open clip failed
    pub const CLIP_READ: i32 = 2006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 2007;

    /// Failed to open a device stream
    pub const STREAM_OPEN_FAILED: i32 = 2008;

    /// Playback controller is shutting down
    pub const CONTROLLER_STOPPING: i32 = 2009;

    /// Streaming worker thread panicked
    pub const WORKER_PANICKED: i32 = 2010;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These cover the sampling side (acquisition, decode), the playback side
/// (clip store, sink) and the controller's own lifecycle.
///
/// Error code ranges: 2001-2010
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Sample source read failed (recoverable, triggers reinit after repeats)
    Acquisition { reason: String },

    /// Buffer too short, empty or not aligned to the sample width
    Decode { len: usize, reason: String },

    /// Audio sink rejected a chunk
    SinkWrite { reason: String },

    /// Audio sink could not be reset
    SinkReset { reason: String },

    /// Clip missing from the store
    ClipNotFound { clip: String },

    /// Clip stream read or rewind failed
    ClipRead { clip: String, reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Failed to open a device stream
    StreamOpenFailed { reason: String },

    /// Controller is in `Stopping` and refuses new work
    ControllerStopping,

    /// Streaming worker panicked before it could be joined
    WorkerPanicked,
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::Acquisition { .. } => AudioErrorCodes::ACQUISITION,
            AudioError::Decode { .. } => AudioErrorCodes::DECODE,
            AudioError::SinkWrite { .. } => AudioErrorCodes::SINK_WRITE,
            AudioError::SinkReset { .. } => AudioErrorCodes::SINK_RESET,
            AudioError::ClipNotFound { .. } => AudioErrorCodes::CLIP_NOT_FOUND,
            AudioError::ClipRead { .. } => AudioErrorCodes::CLIP_READ,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::ControllerStopping => AudioErrorCodes::CONTROLLER_STOPPING,
            AudioError::WorkerPanicked => AudioErrorCodes::WORKER_PANICKED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::Acquisition { reason } => {
                format!("Sample acquisition failed: {}", reason)
            }
            AudioError::Decode { len, reason } => {
                format!("Cannot decode {}-byte buffer: {}", len, reason)
            }
            AudioError::SinkWrite { reason } => format!("Audio sink write failed: {}", reason),
            AudioError::SinkReset { reason } => format!("Audio sink reset failed: {}", reason),
            AudioError::ClipNotFound { clip } => format!("Clip not found: {}", clip),
            AudioError::ClipRead { clip, reason } => {
                format!("Failed to read clip {}: {}", clip, reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::ControllerStopping => {
                "Playback controller is stopping. Wait for stop() to return.".to_string()
            }
            AudioError::WorkerPanicked => "Playback worker thread panicked".to_string(),
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for AudioError {}
