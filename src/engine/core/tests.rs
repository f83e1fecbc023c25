use super::*;
use crate::audio::stubs::{MemoryClipStore, NullSink, RecordingSink, ScriptedSource};
use crate::error::{AudioError, LifecycleError};

fn quick_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.supervisor.watchdog_startup_ms = 0;
    config.supervisor.watchdog_tick_ms = 1;
    config
}

fn clips() -> Arc<dyn ClipStore> {
    Arc::new(MemoryClipStore::new().with_clip("joey.raw", vec![0u8; 4096]))
}

#[test]
fn test_cycle_limit_stops_loop() {
    let supervisor = Supervisor::new(quick_config()).with_max_cycles(5);
    let summary = supervisor
        .run(
            Box::new(ScriptedSource::new(Vec::new())),
            Box::new(NullSink),
            clips(),
        )
        .unwrap();
    assert_eq!(summary.cycles, 5);
    assert_eq!(summary.triggers, 0);
    assert!(!supervisor.run_state().is_running());
}

#[test]
fn test_invalid_config_rejected_and_devices_released() {
    let mut config = quick_config();
    config.trigger.above_required = 0;
    let source = ScriptedSource::new(Vec::new());
    let source_probe = source.probe();
    let sink = RecordingSink::new();
    let sink_probe = sink.probe();

    let result = Supervisor::new(config).run(Box::new(source), Box::new(sink), clips());
    assert!(matches!(
        result,
        Err(LifecycleError::InvalidConfig { .. })
    ));
    assert!(source_probe.released());
    assert!(sink_probe.released());
}

#[test]
fn test_external_run_state_is_shared() {
    let run_state = RunState::new();
    let supervisor = Supervisor::new(quick_config()).with_run_state(run_state.clone());
    let source = ScriptedSource::new(vec![Ok(vec![0u8; 2048])]).stop_when_exhausted(run_state);
    let summary = supervisor
        .run(Box::new(source), Box::new(NullSink), clips())
        .unwrap();
    assert_eq!(summary.cycles, 1);
}

/// Source whose driver panics on one read
struct PanickingSource {
    reads: usize,
    panic_on: usize,
    released: Arc<AtomicBool>,
}

impl SampleSource for PanickingSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        self.reads += 1;
        if self.reads == self.panic_on {
            panic!("dma descriptor corrupted");
        }
        buf.fill(0);
        Ok(buf.len())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_panicking_cycle_is_counted_and_loop_continues() {
    let released = Arc::new(AtomicBool::new(false));
    let source = PanickingSource {
        reads: 0,
        panic_on: 2,
        released: Arc::clone(&released),
    };
    let supervisor = Supervisor::new(quick_config()).with_max_cycles(5);

    let summary = supervisor
        .run(Box::new(source), Box::new(NullSink), clips())
        .unwrap();
    assert_eq!(summary.cycles, 5);
    assert_eq!(summary.faults, 1);
    assert!(released.load(Ordering::SeqCst));
    assert!(!supervisor.run_state().is_running());

    // The active flag was cleared, so a later run is not AlreadyRunning
    let again = supervisor.run(
        Box::new(ScriptedSource::new(Vec::new())),
        Box::new(NullSink),
        clips(),
    );
    assert!(again.is_ok());
}
