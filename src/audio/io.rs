//! Collaborator interfaces consumed by the core.
//!
//! Devices, storage and their setup live outside the core and are reached
//! only through these traits. All calls are blocking; implementations must
//! be safe to reinitialize after a prior failure.

use crate::error::AudioError;

/// Microphone side: yields raw PCM buffers at a fixed rate
pub trait SampleSource: Send {
    /// Fill `buf` with raw sample bytes, returning how many bytes were written
    ///
    /// A short count is not an acquisition failure here; the level
    /// estimator reports it as a decode error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;

    /// Tear the device down and bring it back up. Idempotent.
    fn reinit(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    /// Release the device at shutdown
    fn release(&mut self) {}
}

/// Speaker side: accepts raw PCM chunks
pub trait AudioSink: Send {
    fn write(&mut self, chunk: &[u8]) -> Result<(), AudioError>;

    /// Deinit + reinit after a fault. Idempotent.
    fn reset(&mut self) -> Result<(), AudioError>;

    /// Release the device at shutdown
    fn release(&mut self) {}
}

/// An open clip, read sequentially in chunks
pub trait ClipStream: Send {
    /// Read up to `buf.len()` bytes; `Ok(0)` means end of clip
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;

    /// Seek back to byte 0
    fn rewind(&mut self) -> Result<(), AudioError>;

    /// Current byte offset
    fn position(&self) -> u64;
}

/// Storage holding playable clips
pub trait ClipStore: Send + Sync {
    /// # Errors
    /// `AudioError::ClipNotFound` if `clip` does not exist.
    fn open(&self, clip: &str) -> Result<Box<dyn ClipStream>, AudioError>;

    fn contains(&self, clip: &str) -> bool;

    fn list(&self) -> Vec<String>;
}
