// Streaming worker - moves clip chunks to the sink until told to stop
//
// Each iteration re-reads the shared flags and RunState, so a pause, stop or
// shutdown takes effect within one chunk write or one pause poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::audio::{AudioSink, ClipStream};
use crate::config::PlaybackConfig;
use crate::engine::RunState;
use crate::error::{log_audio_error, AudioError};
use crate::playback::{PlaybackFlags, PlaybackState};
use crate::telemetry::{self, DeviceKind};

/// Counters shared by the controller and its workers
#[derive(Debug, Default)]
pub(crate) struct PlaybackStats {
    pub sessions: AtomicU64,
    pub bytes_written: AtomicU64,
    pub sink_resets: AtomicU64,
}

pub(crate) type SharedSink = Arc<Mutex<Box<dyn AudioSink>>>;

pub(crate) fn lock_flags(
    flags: &Mutex<PlaybackFlags>,
) -> Result<MutexGuard<'_, PlaybackFlags>, AudioError> {
    flags.lock().map_err(|_| AudioError::LockPoisoned {
        component: "playback_flags".to_string(),
    })
}

pub(crate) fn lock_sink(
    sink: &Mutex<Box<dyn AudioSink>>,
) -> Result<MutexGuard<'_, Box<dyn AudioSink>>, AudioError> {
    sink.lock().map_err(|_| AudioError::LockPoisoned {
        component: "audio_sink".to_string(),
    })
}

/// Why the streaming loop ended
#[derive(Debug)]
enum Exit {
    /// should_continue was cleared
    Stopped,
    /// RunState went false
    Shutdown,
    /// End of clip without looping
    Finished,
    Fault(AudioError),
}

pub(crate) struct StreamingWorker {
    pub stream: Box<dyn ClipStream>,
    pub sink: SharedSink,
    pub flags: Arc<Mutex<PlaybackFlags>>,
    pub stats: Arc<PlaybackStats>,
    pub config: PlaybackConfig,
    pub run_state: RunState,
    pub clip: String,
}

impl StreamingWorker {
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("ambient-playback".to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        tracing::info!("[PlaybackWorker] Streaming '{}'", self.clip);

        let exit = self.stream_loop();
        match &exit {
            Exit::Fault(err) => {
                log_audio_error(err, "PlaybackWorker::stream_loop");
                telemetry::hub().record_fault(err, "playback_worker");
            }
            other => tracing::debug!("[PlaybackWorker] Loop exited: {:?}", other),
        }

        let shutting_down = self.mark_idle();

        if matches!(exit, Exit::Fault(_)) && !shutting_down {
            self.reset_sink();
        }

        tracing::info!(
            "[PlaybackWorker] Exiting at byte {} of '{}'",
            self.stream.position(),
            self.clip
        );
    }

    fn stream_loop(&mut self) -> Exit {
        let mut chunk = vec![0u8; self.config.chunk_bytes.max(1)];
        let write_yield = self.config.write_yield();
        let pause_poll = self.config.pause_poll();

        loop {
            if !self.run_state.is_running() {
                return Exit::Shutdown;
            }

            let (should_continue, paused) = match lock_flags(&self.flags) {
                Ok(flags) => (flags.should_continue, flags.paused),
                Err(err) => return Exit::Fault(err),
            };
            if !should_continue {
                return Exit::Stopped;
            }
            if paused {
                thread::sleep(pause_poll);
                continue;
            }

            let read = match self.stream.read_chunk(&mut chunk) {
                Ok(n) => n.min(chunk.len()),
                Err(err) => return Exit::Fault(err),
            };

            if read == 0 {
                // An empty clip would otherwise spin on rewind
                if !self.config.loop_playback || self.stream.position() == 0 {
                    return Exit::Finished;
                }
                if let Err(err) = self.stream.rewind() {
                    return Exit::Fault(err);
                }
                tracing::debug!("[PlaybackWorker] Looping '{}'", self.clip);
                continue;
            }

            let written = lock_sink(&self.sink).and_then(|mut sink| sink.write(&chunk[..read]));
            if let Err(err) = written {
                return Exit::Fault(err);
            }
            self.stats
                .bytes_written
                .fetch_add(read as u64, Ordering::Relaxed);

            if !write_yield.is_zero() {
                thread::sleep(write_yield);
            }
        }
    }

    /// Mark the session finished; returns true if shutdown is in progress
    fn mark_idle(&self) -> bool {
        let stopping = match self.flags.lock() {
            Ok(mut flags) => {
                let stopping = flags.state == PlaybackState::Stopping;
                if !stopping {
                    flags.state = PlaybackState::Idle;
                }
                flags.should_continue = false;
                flags.paused = false;
                stopping
            }
            Err(_) => false,
        };
        if !stopping {
            telemetry::hub().record_playback(PlaybackState::Idle);
        }
        stopping || !self.run_state.is_running()
    }

    fn reset_sink(&self) {
        self.stats.sink_resets.fetch_add(1, Ordering::Relaxed);
        let result = lock_sink(&self.sink).and_then(|mut sink| sink.reset());
        match result {
            Ok(()) => {
                tracing::info!("[PlaybackWorker] Speaker reset after fault");
                telemetry::hub().record_reinit(DeviceKind::Speaker, true);
            }
            Err(err) => {
                log_audio_error(&err, "PlaybackWorker::reset_sink");
                telemetry::hub().record_reinit(DeviceKind::Speaker, false);
            }
        }
    }
}
