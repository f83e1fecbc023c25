use super::*;
use crate::audio::stubs::{MemoryClipStore, RecordingSink};
use std::time::{Duration, Instant};

fn config(loop_playback: bool) -> PlaybackConfig {
    PlaybackConfig {
        clip: "joey.raw".to_string(),
        chunk_bytes: 64,
        write_yield_ms: 1,
        pause_poll_ms: 5,
        loop_playback,
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn controller_with(
    clip_len: usize,
    loop_playback: bool,
) -> (
    PlaybackController,
    crate::audio::stubs::ClipProbe,
    crate::audio::stubs::SinkProbe,
) {
    let store = MemoryClipStore::new().with_clip("joey.raw", vec![1u8; clip_len]);
    let clips = store.probe();
    let sink = RecordingSink::new();
    let sink_probe = sink.probe();
    let controller = PlaybackController::new(
        Arc::new(store),
        Box::new(sink),
        config(loop_playback),
        RunState::new(),
    );
    (controller, clips, sink_probe)
}

#[test]
fn test_initial_state_is_idle() {
    let (controller, _, _) = controller_with(128, true);
    assert_eq!(controller.state(), PlaybackState::Idle);
    assert!(!controller.pause().unwrap());
    assert!(!controller.resume().unwrap());
    assert!(controller.stop().is_ok());
}

#[test]
fn test_missing_clip_stays_idle() {
    let (controller, clips, _) = controller_with(128, true);
    let result = controller.start("missing.raw");
    assert!(matches!(result, Err(AudioError::ClipNotFound { .. })));
    assert_eq!(controller.state(), PlaybackState::Idle);
    assert_eq!(clips.opens(), 0);
    assert_eq!(controller.snapshot().sessions, 0);
}

#[test]
fn test_start_while_playing_is_noop() {
    let (controller, clips, _) = controller_with(4096, true);
    assert_eq!(controller.start("joey.raw").unwrap(), StartOutcome::Started);
    assert_eq!(
        controller.start("joey.raw").unwrap(),
        StartOutcome::AlreadyPlaying
    );
    assert_eq!(clips.opens(), 1);
    controller.stop().unwrap();
}

#[test]
fn test_pause_then_start_resumes_same_session() {
    let (controller, clips, _) = controller_with(4096, true);
    controller.start("joey.raw").unwrap();
    assert!(controller.pause().unwrap());
    assert_eq!(controller.state(), PlaybackState::Paused);
    assert!(!controller.pause().unwrap());

    assert_eq!(controller.start("joey.raw").unwrap(), StartOutcome::Resumed);
    assert_eq!(controller.state(), PlaybackState::Playing);
    assert_eq!(clips.opens(), 1);
    assert_eq!(controller.snapshot().sessions, 1);
    controller.stop().unwrap();
}

#[test]
fn test_non_looping_clip_returns_to_idle() {
    let (controller, clips, sink) = controller_with(200, false);
    controller.start("joey.raw").unwrap();

    assert!(wait_until(Duration::from_secs(2), || controller.state()
        == PlaybackState::Idle));
    assert_eq!(sink.byte_count(), 200);
    assert_eq!(clips.rewinds(), 0);

    // Finished worker is reaped and a new session starts from byte 0
    assert_eq!(controller.start("joey.raw").unwrap(), StartOutcome::Started);
    assert_eq!(clips.opens(), 2);
    controller.stop().unwrap();
}

#[test]
fn test_looping_clip_rewinds() {
    let (controller, clips, sink) = controller_with(128, true);
    controller.start("joey.raw").unwrap();
    assert!(wait_until(Duration::from_secs(2), || clips.rewinds() >= 2));
    assert_eq!(controller.state(), PlaybackState::Playing);
    controller.stop().unwrap();
    assert!(sink.byte_count() >= 256);
}

#[test]
fn test_stop_clears_session() {
    let (controller, _, _) = controller_with(4096, true);
    controller.start("joey.raw").unwrap();
    controller.pause().unwrap();
    controller.stop().unwrap();

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.clip, None);
    assert!(!snapshot.should_continue);
    assert!(!snapshot.paused);
}

#[test]
fn test_shutdown_ends_worker_without_reset() {
    let store = MemoryClipStore::new().with_clip("joey.raw", vec![1u8; 4096]);
    let sink = RecordingSink::new();
    let sink_probe = sink.probe();
    let run_state = RunState::new();
    let controller = PlaybackController::new(
        Arc::new(store),
        Box::new(sink),
        config(true),
        run_state.clone(),
    );

    controller.start("joey.raw").unwrap();
    run_state.request_stop();
    assert!(wait_until(Duration::from_secs(2), || controller.state()
        == PlaybackState::Idle));
    controller.stop().unwrap();
    assert_eq!(sink_probe.resets(), 0);
}
