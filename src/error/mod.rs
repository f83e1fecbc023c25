// Error types for the ambient trigger
//
// This module defines custom error types for the audio pipeline and the
// supervisor lifecycle, with numeric error codes suitable for telemetry.

mod audio;
mod lifecycle;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use lifecycle::{log_lifecycle_error, LifecycleError, LifecycleErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so telemetry and logs can report them
/// consistently.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
