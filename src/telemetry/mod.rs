//! Runtime telemetry collector and helpers.
//!
//! The collector multiplexes readings, trigger edges, playback transitions,
//! device reinits and faults into a bounded history plus a broadcast stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::analysis::{LoudnessReading, TriggerAction};
use crate::error::ErrorCode;
use crate::playback::PlaybackState;

pub mod events;

pub use events::{DeviceKind, LifecyclePhase, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

// Telemetry must keep working after a panicking publisher
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        let history_capacity = history_capacity.max(1);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = lock_or_recover(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = lock_or_recover(&self.history);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window of monitoring-loop cycle durations.
struct CycleTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl CycleTracker {
    fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    fn observe(&mut self, value_ms: f32) -> (f32, f32, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value_ms.abs());

        let count = self.samples.len();
        let sum: f32 = self.samples.iter().copied().sum();
        let max = self
            .samples
            .iter()
            .copied()
            .fold(0.0_f32, |acc, next| acc.max(next));
        let avg = if count == 0 { 0.0 } else { sum / count as f32 };
        (avg, max, count)
    }
}

/// Top-level hub wrapping collector state plus derived gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    cycles: Mutex<CycleTracker>,
    timing_every: u64,
    timing_counter: AtomicU64,
    last_playback: Mutex<Option<PlaybackState>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, timing_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            cycles: Mutex::new(CycleTracker::new(timing_window)),
            timing_every: timing_window.max(1) as u64,
            timing_counter: AtomicU64::new(0),
            last_playback: Mutex::new(None),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_reading(&self, cycle: u64, reading: &LoudnessReading) {
        self.collector.publish(MetricEvent::Reading {
            cycle,
            rms: reading.rms,
            avg_rms: reading.avg_rms,
            level: reading.level,
            derivative: reading.derivative,
        });
    }

    pub fn record_trigger(&self, cycle: u64, action: TriggerAction) {
        self.collector
            .publish(MetricEvent::Trigger { cycle, action });
    }

    /// Publish a playback state, skipping repeats of the last published one
    pub fn record_playback(&self, state: PlaybackState) {
        let mut last = lock_or_recover(&self.last_playback);
        if *last != Some(state) {
            *last = Some(state);
            self.collector.publish(MetricEvent::Playback { state });
        }
    }

    pub fn record_reinit(&self, device: DeviceKind, success: bool) {
        self.collector
            .publish(MetricEvent::DeviceReinit { device, success });
    }

    /// Fold one cycle duration into the rolling window
    ///
    /// A `CycleTiming` event is published once per full window.
    pub fn record_cycle_time(&self, elapsed: Duration) {
        let (avg, max, count) = {
            let mut tracker = lock_or_recover(&self.cycles);
            tracker.observe(elapsed.as_secs_f32() * 1000.0)
        };

        let seen = self.timing_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.timing_every == 0 {
            self.collector.publish(MetricEvent::CycleTiming {
                avg_ms: avg,
                max_ms: max,
                sample_count: count,
            });
        }
    }

    pub fn record_phase(&self, phase: LifecyclePhase) {
        self.collector.publish(MetricEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_fault(&self, err: &dyn ErrorCode, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Fault {
            code: err.code(),
            context: context.into(),
        });
    }

    pub fn record_heartbeat(&self, ticks: u64) {
        self.collector.publish(MetricEvent::Heartbeat { ticks });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(MetricEvent::Heartbeat { ticks: 1 });
        collector.publish(MetricEvent::Heartbeat { ticks: 2 });
        collector.publish(MetricEvent::Playback {
            state: PlaybackState::Playing,
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::Heartbeat { ticks: 1 }
        ));
        assert!(matches!(snapshot.recent[2], MetricEvent::Playback { .. }));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        for ticks in 1..=3 {
            collector.publish(MetricEvent::Heartbeat { ticks });
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.total_events, 3);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::Heartbeat { ticks: 2 }
        ));
    }

    #[test]
    fn subscribers_receive_published_events() {
        let collector = TelemetryCollector::new(8, 8);
        let mut rx = collector.subscribe();
        collector.publish(MetricEvent::Heartbeat { ticks: 7 });
        assert_eq!(rx.try_recv().unwrap(), MetricEvent::Heartbeat { ticks: 7 });
    }

    #[test]
    fn hub_debounces_repeated_playback_state() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_playback(PlaybackState::Playing);
        hub.record_playback(PlaybackState::Playing);
        hub.record_playback(PlaybackState::Paused);

        let count = hub
            .snapshot()
            .recent
            .iter()
            .filter(|event| matches!(event, MetricEvent::Playback { .. }))
            .count();
        assert_eq!(count, 2);
    }

    #[test]
    fn hub_emits_cycle_timing_once_per_window() {
        let hub = TelemetryHub::new(16, 16, 4);
        for ms in [10, 20, 30, 40, 50] {
            hub.record_cycle_time(Duration::from_millis(ms));
        }

        let timings: Vec<_> = hub
            .snapshot()
            .recent
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::CycleTiming {
                    avg_ms,
                    max_ms,
                    sample_count,
                } => Some((avg_ms, max_ms, sample_count)),
                _ => None,
            })
            .collect();
        assert_eq!(timings.len(), 1);
        let (avg, max, count) = timings[0];
        assert_eq!(count, 4);
        assert!((avg - 25.0).abs() < 0.01);
        assert!((max - 40.0).abs() < 0.01);
    }

    #[test]
    fn hub_records_fault_codes() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_fault(&AudioError::WorkerPanicked, "playback");
        assert!(hub.snapshot().recent.iter().any(|event| matches!(
            event,
            MetricEvent::Fault { code: 2010, .. }
        )));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&MetricEvent::Heartbeat { ticks: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"heartbeat","payload":{"ticks":3}}"#);
    }
}
