//! Playback controller: start / pause / resume / stop over one streaming worker.
//!
//! State machine:
//!
//! ```text
//! Idle --start--> Playing <--pause/resume--> Paused
//!   ^                |                          |
//!   +----(EOF, fault)+                          |
//!   +--------------- stop (Stopping, join) -----+
//! ```
//!
//! At most one worker exists per controller. A finished worker is joined
//! before a new one is spawned, and `stop()` joins before it returns.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::audio::{AudioSink, ClipStore};
use crate::config::PlaybackConfig;
use crate::engine::RunState;
use crate::error::{log_audio_error, AudioError};
use crate::playback::worker::{lock_flags, lock_sink, PlaybackStats, SharedSink, StreamingWorker};
use crate::playback::{PlaybackFlags, PlaybackSnapshot, PlaybackState, StartOutcome};
use crate::telemetry;

pub struct PlaybackController {
    clips: Arc<dyn ClipStore>,
    sink: SharedSink,
    config: PlaybackConfig,
    run_state: RunState,
    flags: Arc<Mutex<PlaybackFlags>>,
    /// Serializes spawn/join; never taken by the worker
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<PlaybackStats>,
}

impl PlaybackController {
    pub fn new(
        clips: Arc<dyn ClipStore>,
        sink: Box<dyn AudioSink>,
        config: PlaybackConfig,
        run_state: RunState,
    ) -> Self {
        Self {
            clips,
            sink: Arc::new(Mutex::new(sink)),
            config,
            run_state,
            flags: Arc::new(Mutex::new(PlaybackFlags::default())),
            worker: Mutex::new(None),
            stats: Arc::new(PlaybackStats::default()),
        }
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<JoinHandle<()>>>, AudioError> {
        self.worker.lock().map_err(|_| AudioError::LockPoisoned {
            component: "playback_worker".to_string(),
        })
    }

    /// Begin or resume playback of `clip`
    ///
    /// Returns immediately; streaming happens on the worker thread. A paused
    /// session resumes from its current position even if `clip` differs.
    ///
    /// # Errors
    /// - `ClipNotFound` / `ClipRead` if the clip cannot be opened (state stays Idle)
    /// - `ControllerStopping` while `stop()` is in progress
    /// - `LockPoisoned` if a previous holder panicked
    pub fn start(&self, clip: &str) -> Result<StartOutcome, AudioError> {
        if let Some(outcome) = self.start_fast_path()? {
            return Ok(outcome);
        }

        let mut worker = self.lock_worker()?;

        // State may have moved while waiting for the worker lock
        if let Some(outcome) = self.start_fast_path()? {
            return Ok(outcome);
        }

        if let Some(finished) = worker.take() {
            if finished.join().is_err() {
                log_audio_error(&AudioError::WorkerPanicked, "PlaybackController::start");
            }
        }

        let stream = self.clips.open(clip).map_err(|err| {
            log_audio_error(&err, "PlaybackController::start");
            err
        })?;

        {
            let mut flags = lock_flags(&self.flags)?;
            flags.state = PlaybackState::Playing;
            flags.should_continue = true;
            flags.paused = false;
            flags.clip = Some(clip.to_string());
        }

        let spawned = StreamingWorker {
            stream,
            sink: Arc::clone(&self.sink),
            flags: Arc::clone(&self.flags),
            stats: Arc::clone(&self.stats),
            config: self.config.clone(),
            run_state: self.run_state.clone(),
            clip: clip.to_string(),
        }
        .spawn();

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                self.stats.sessions.fetch_add(1, Ordering::Relaxed);
                telemetry::hub().record_playback(PlaybackState::Playing);
                tracing::info!("[PlaybackController] Started '{}'", clip);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                if let Ok(mut flags) = lock_flags(&self.flags) {
                    *flags = PlaybackFlags::default();
                }
                let err = AudioError::StreamOpenFailed {
                    reason: format!("failed to spawn playback worker: {}", e),
                };
                log_audio_error(&err, "PlaybackController::start");
                Err(err)
            }
        }
    }

    /// Handle every start() case that needs no new worker
    fn start_fast_path(&self) -> Result<Option<StartOutcome>, AudioError> {
        let mut flags = lock_flags(&self.flags)?;
        match flags.state {
            PlaybackState::Playing => Ok(Some(StartOutcome::AlreadyPlaying)),
            PlaybackState::Paused => {
                flags.state = PlaybackState::Playing;
                flags.paused = false;
                drop(flags);
                telemetry::hub().record_playback(PlaybackState::Playing);
                tracing::debug!("[PlaybackController] Resumed via start");
                Ok(Some(StartOutcome::Resumed))
            }
            PlaybackState::Stopping => Err(AudioError::ControllerStopping),
            PlaybackState::Idle => Ok(None),
        }
    }

    /// Suspend streaming; returns whether the state changed
    pub fn pause(&self) -> Result<bool, AudioError> {
        let mut flags = lock_flags(&self.flags)?;
        if flags.state != PlaybackState::Playing {
            return Ok(false);
        }
        flags.state = PlaybackState::Paused;
        flags.paused = true;
        drop(flags);

        telemetry::hub().record_playback(PlaybackState::Paused);
        tracing::debug!("[PlaybackController] Paused");
        Ok(true)
    }

    /// Continue a paused session; returns whether the state changed
    pub fn resume(&self) -> Result<bool, AudioError> {
        let mut flags = lock_flags(&self.flags)?;
        if flags.state != PlaybackState::Paused {
            return Ok(false);
        }
        flags.state = PlaybackState::Playing;
        flags.paused = false;
        drop(flags);

        telemetry::hub().record_playback(PlaybackState::Playing);
        tracing::debug!("[PlaybackController] Resumed");
        Ok(true)
    }

    /// Stop streaming and join the worker
    ///
    /// Blocks until the worker has exited, including any in-flight write.
    ///
    /// # Errors
    /// `WorkerPanicked` if the worker thread panicked.
    pub fn stop(&self) -> Result<(), AudioError> {
        let mut worker = self.lock_worker()?;

        {
            let mut flags = lock_flags(&self.flags)?;
            if flags.state != PlaybackState::Idle {
                flags.state = PlaybackState::Stopping;
            }
            flags.should_continue = false;
            flags.paused = false;
        }

        let joined = match worker.take() {
            Some(handle) => handle.join().map_err(|_| AudioError::WorkerPanicked),
            None => Ok(()),
        };

        {
            let mut flags = lock_flags(&self.flags)?;
            flags.state = PlaybackState::Idle;
            flags.clip = None;
        }
        telemetry::hub().record_playback(PlaybackState::Idle);

        if let Err(err) = &joined {
            log_audio_error(err, "PlaybackController::stop");
        } else {
            tracing::info!("[PlaybackController] Stopped");
        }
        joined
    }

    pub fn state(&self) -> PlaybackState {
        match self.flags.lock() {
            Ok(flags) => flags.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let flags = match self.flags.lock() {
            Ok(flags) => flags.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        PlaybackSnapshot {
            state: flags.state,
            clip: flags.clip,
            paused: flags.paused,
            should_continue: flags.should_continue,
            sessions: self.stats.sessions.load(Ordering::Relaxed),
            bytes_written: self.stats.bytes_written.load(Ordering::Relaxed),
            sink_resets: self.stats.sink_resets.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Release the speaker at teardown. Call after `stop()`.
    pub fn release_sink(&self) {
        match lock_sink(&self.sink) {
            Ok(mut sink) => sink.release(),
            Err(err) => log_audio_error(&err, "PlaybackController::release_sink"),
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_audio_error(&err, "PlaybackController::drop");
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
