//! Integration tests for the playback controller's threading contracts
//!
//! These tests drive a real streaming worker against in-memory clips and
//! recording sinks, covering:
//! - pause/resume keeps the stream position (no reopen, no rewind)
//! - stop() blocks until an in-flight write finishes
//! - a sink fault resets the speaker and returns the controller to Idle
//! - a missing clip leaves the controller Idle

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ambient_trigger::audio::stubs::{MemoryClipStore, RecordingSink};
use ambient_trigger::config::PlaybackConfig;
use ambient_trigger::engine::RunState;
use ambient_trigger::error::AudioError;
use ambient_trigger::playback::{PlaybackController, PlaybackState, StartOutcome};

fn playback_config() -> PlaybackConfig {
    PlaybackConfig {
        clip: "joey.raw".to_string(),
        chunk_bytes: 128,
        write_yield_ms: 1,
        pause_poll_ms: 5,
        loop_playback: true,
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Test that start() while Paused resumes from the current byte offset
#[test]
fn test_resume_continues_from_position() {
    let store = MemoryClipStore::new().with_clip("joey.raw", vec![3u8; 1 << 20]);
    let clips = store.probe();
    let sink = RecordingSink::new();
    let sink_probe = sink.probe();
    let controller = PlaybackController::new(
        Arc::new(store),
        Box::new(sink),
        playback_config(),
        RunState::new(),
    );

    controller.start("joey.raw").unwrap();
    assert!(wait_until(Duration::from_secs(2), || clips.position() >= 1024));

    controller.pause().unwrap();
    // Let an in-flight chunk land, then the position must hold still
    thread::sleep(Duration::from_millis(30));
    let paused_at = clips.position();
    let written_at_pause = sink_probe.byte_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(clips.position(), paused_at);
    assert_eq!(sink_probe.byte_count(), written_at_pause);

    assert_eq!(controller.start("joey.raw").unwrap(), StartOutcome::Resumed);
    assert!(wait_until(Duration::from_secs(2), || clips.position()
        > paused_at));

    assert_eq!(clips.opens(), 1);
    assert_eq!(clips.rewinds(), 0);
    controller.stop().unwrap();
}

/// Test that stop() waits for a slow write to complete
#[test]
fn test_stop_blocks_until_worker_exits() {
    let store = MemoryClipStore::new().with_clip("joey.raw", vec![1u8; 4096]);
    let sink = RecordingSink::new().with_write_delay(Duration::from_millis(150));
    let sink_probe = sink.probe();
    let controller = PlaybackController::new(
        Arc::new(store),
        Box::new(sink),
        playback_config(),
        RunState::new(),
    );

    controller.start("joey.raw").unwrap();
    assert!(wait_until(Duration::from_secs(2), || sink_probe.in_write()));

    let started = Instant::now();
    controller.stop().unwrap();
    let elapsed = started.elapsed();

    assert!(!sink_probe.in_write(), "stop returned during a write");
    assert!(
        elapsed >= Duration::from_millis(20),
        "stop returned too early: {:?}",
        elapsed
    );
    assert_eq!(controller.state(), PlaybackState::Idle);

    // No further writes after stop
    let writes = sink_probe.writes();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sink_probe.writes(), writes);
}

/// Test that a write fault resets the sink and allows a fresh start
#[test]
fn test_sink_fault_resets_and_recovers() {
    let store = MemoryClipStore::new().with_clip("joey.raw", vec![1u8; 4096]);
    let clips = store.probe();
    let sink = RecordingSink::new().fail_on_write(3);
    let sink_probe = sink.probe();
    let controller = PlaybackController::new(
        Arc::new(store),
        Box::new(sink),
        playback_config(),
        RunState::new(),
    );

    controller.start("joey.raw").unwrap();
    assert!(wait_until(Duration::from_secs(2), || sink_probe.resets()
        == 1
        && controller.state() == PlaybackState::Idle));
    assert_eq!(controller.snapshot().sink_resets, 1);

    assert_eq!(controller.start("joey.raw").unwrap(), StartOutcome::Started);
    assert_eq!(clips.opens(), 2);
    assert!(wait_until(Duration::from_secs(2), || sink_probe.writes() > 4));
    assert_eq!(controller.state(), PlaybackState::Playing);

    controller.stop().unwrap();
    assert_eq!(sink_probe.resets(), 1);
}

/// Test that an unknown clip is reported and the controller stays Idle
#[test]
fn test_missing_clip_reports_not_found() {
    let controller = PlaybackController::new(
        Arc::new(MemoryClipStore::new()),
        Box::new(RecordingSink::new()),
        playback_config(),
        RunState::new(),
    );

    match controller.start("joey.raw") {
        Err(AudioError::ClipNotFound { clip }) => assert_eq!(clip, "joey.raw"),
        other => panic!("expected ClipNotFound, got {:?}", other),
    }
    assert_eq!(controller.state(), PlaybackState::Idle);
}

/// Test that a concurrent start() during stop() is rejected
#[test]
fn test_start_rejected_while_stopping() {
    let store = MemoryClipStore::new().with_clip("joey.raw", vec![1u8; 4096]);
    let sink = RecordingSink::new().with_write_delay(Duration::from_millis(200));
    let sink_probe = sink.probe();
    let controller = Arc::new(PlaybackController::new(
        Arc::new(store),
        Box::new(sink),
        playback_config(),
        RunState::new(),
    ));

    controller.start("joey.raw").unwrap();
    assert!(wait_until(Duration::from_secs(2), || sink_probe.in_write()));

    let stopper = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || controller.stop())
    };
    assert!(wait_until(Duration::from_secs(2), || controller.state()
        == PlaybackState::Stopping));
    assert_eq!(
        controller.start("joey.raw"),
        Err(AudioError::ControllerStopping)
    );

    stopper.join().unwrap().unwrap();
    assert_eq!(controller.state(), PlaybackState::Idle);
}
