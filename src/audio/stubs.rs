//! Deterministic collaborators for desktop runs and tests
//!
//! Nothing in here touches hardware. Sources replay scripted buffers or
//! generate seeded noise, sinks record what they were given, and the memory
//! clip store serves clips from RAM. Each stub exposes a cloneable probe so
//! tests can observe it after ownership moved into a worker.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::clip_store::PcmClipStream;
use crate::audio::io::{AudioSink, ClipStore, ClipStream, SampleSource};
use crate::config::SampleFormat;
use crate::engine::RunState;
use crate::error::AudioError;

/// Counters shared between a stub source and the test that built it
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    reads: Arc<AtomicUsize>,
    reinits: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl SourceProbe {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reinits(&self) -> usize {
        self.reinits.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Source replaying a fixed script of buffers and failures
///
/// Once the script is exhausted it returns silence of the requested size,
/// and optionally requests shutdown on the attached [`RunState`].
pub struct ScriptedSource {
    script: VecDeque<Result<Vec<u8>, AudioError>>,
    stop_on_exhaust: Option<RunState>,
    reinit_error: Option<AudioError>,
    probe: SourceProbe,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<u8>, AudioError>>) -> Self {
        Self {
            script: script.into(),
            stop_on_exhaust: None,
            reinit_error: None,
            probe: SourceProbe::default(),
        }
    }

    /// Request shutdown once every scripted entry has been consumed
    pub fn stop_when_exhausted(mut self, run_state: RunState) -> Self {
        self.stop_on_exhaust = Some(run_state);
        self
    }

    /// Make every `reinit` call fail with `err`
    pub fn failing_reinit(mut self, err: AudioError) -> Self {
        self.reinit_error = Some(err);
        self
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

impl SampleSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);

        let next = self.script.pop_front();
        if self.script.is_empty() {
            if let Some(run_state) = &self.stop_on_exhaust {
                run_state.request_stop();
            }
        }

        match next {
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Err(err)) => Err(err),
            None => {
                buf.fill(0);
                Ok(buf.len())
            }
        }
    }

    fn reinit(&mut self) -> Result<(), AudioError> {
        self.probe.reinits.fetch_add(1, Ordering::SeqCst);
        match &self.reinit_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn release(&mut self) {
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

/// One segment of a synthetic noise schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSegment {
    /// Number of buffers this segment lasts
    pub cycles: usize,
    /// Peak absolute sample value before gain
    pub amplitude: i16,
}

impl NoiseSegment {
    pub fn new(cycles: usize, amplitude: i16) -> Self {
        Self { cycles, amplitude }
    }
}

/// Seeded uniform-noise source following a schedule of loudness segments
///
/// After the last segment the source keeps producing that segment's noise.
/// With pacing enabled each read sleeps for one buffer duration, mimicking
/// a real microphone's blocking read. 32-bit frames carry the sample in
/// their high half, the way the decoder expects.
pub struct SyntheticSource {
    rng: StdRng,
    format: SampleFormat,
    schedule: Vec<NoiseSegment>,
    segment: usize,
    cycle_in_segment: usize,
    pacing: Option<Duration>,
    probe: SourceProbe,
}

impl SyntheticSource {
    pub fn new(seed: u64, schedule: Vec<NoiseSegment>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            format: SampleFormat::S16Le,
            schedule,
            segment: 0,
            cycle_in_segment: 0,
            pacing: None,
            probe: SourceProbe::default(),
        }
    }

    pub fn with_pacing(mut self, per_read: Duration) -> Self {
        self.pacing = Some(per_read);
        self
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }

    fn current_amplitude(&mut self) -> i16 {
        let Some(last) = self.schedule.len().checked_sub(1) else {
            return 0;
        };
        while self.segment < last && self.cycle_in_segment >= self.schedule[self.segment].cycles {
            self.segment += 1;
            self.cycle_in_segment = 0;
        }
        self.cycle_in_segment += 1;
        self.schedule[self.segment].amplitude
    }
}

impl SampleSource for SyntheticSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.pacing {
            std::thread::sleep(delay);
        }

        let amplitude = self.current_amplitude().unsigned_abs() as i32;
        let width = self.format.bytes_per_sample();
        for frame in buf.chunks_exact_mut(width) {
            let sample = if amplitude == 0 {
                0i16
            } else {
                self.rng
                    .gen_range(-amplitude..=amplitude)
                    .clamp(i16::MIN as i32, i16::MAX as i32) as i16
            };
            match self.format {
                SampleFormat::S16Le => frame.copy_from_slice(&sample.to_le_bytes()),
                SampleFormat::S32Le => frame.copy_from_slice(&((sample as i32) << 16).to_le_bytes()),
            }
        }
        Ok(buf.len() - buf.len() % width)
    }

    fn reinit(&mut self) -> Result<(), AudioError> {
        self.probe.reinits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _chunk: &[u8]) -> Result<(), AudioError> {
        Ok(())
    }

    fn reset(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Observable state of a [`RecordingSink`]
#[derive(Debug, Clone, Default)]
pub struct SinkProbe {
    bytes: Arc<Mutex<Vec<u8>>>,
    writes: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    in_write: Arc<AtomicBool>,
}

impl SinkProbe {
    /// Copy of every byte written so far
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn byte_count(&self) -> usize {
        self.bytes.lock().map(|b| b.len()).unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// True while a write call is in progress
    pub fn in_write(&self) -> bool {
        self.in_write.load(Ordering::SeqCst)
    }
}

/// Sink recording every chunk, with optional latency and fault injection
pub struct RecordingSink {
    probe: SinkProbe,
    write_delay: Option<Duration>,
    /// Fail the write with this 1-based index
    fail_on_write: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            probe: SinkProbe::default(),
            write_delay: None,
            fail_on_write: None,
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn fail_on_write(mut self, nth: usize) -> Self {
        self.fail_on_write = Some(nth);
        self
    }

    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for RecordingSink {
    fn write(&mut self, chunk: &[u8]) -> Result<(), AudioError> {
        self.probe.in_write.store(true, Ordering::SeqCst);
        let index = self.probe.writes.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }

        let result = if self.fail_on_write == Some(index) {
            Err(AudioError::SinkWrite {
                reason: format!("injected fault on write {}", index),
            })
        } else {
            self.probe
                .bytes
                .lock()
                .map(|mut bytes| bytes.extend_from_slice(chunk))
                .map_err(|_| AudioError::LockPoisoned {
                    component: "recording_sink".to_string(),
                })
        };

        self.probe.in_write.store(false, Ordering::SeqCst);
        result
    }

    fn reset(&mut self) -> Result<(), AudioError> {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

/// Sink writing mono 16-bit PCM to a WAV file
///
/// The file is finalized on `release`. A `reset` finalizes the current file
/// and starts a fresh one at the same path.
pub struct WavSink {
    path: PathBuf,
    spec: hound::WavSpec,
    writer: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>,
}

impl WavSink {
    pub fn create(path: impl Into<PathBuf>, sample_rate: u32) -> Result<Self, AudioError> {
        let mut sink = Self {
            path: path.into(),
            spec: hound::WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            writer: None,
        };
        sink.open()?;
        Ok(sink)
    }

    fn open(&mut self) -> Result<(), AudioError> {
        let writer = hound::WavWriter::create(&self.path, self.spec).map_err(|e| {
            AudioError::StreamOpenFailed {
                reason: format!("{}: {}", self.path.display(), e),
            }
        })?;
        self.writer = Some(writer);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), AudioError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| AudioError::SinkReset {
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, chunk: &[u8]) -> Result<(), AudioError> {
        let writer = self.writer.as_mut().ok_or_else(|| AudioError::SinkWrite {
            reason: "wav sink is closed".to_string(),
        })?;
        for frame in chunk.chunks_exact(2) {
            let sample = i16::from_le_bytes([frame[0], frame[1]]);
            writer.write_sample(sample).map_err(|e| AudioError::SinkWrite {
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), AudioError> {
        self.finalize()?;
        self.open()
    }

    fn release(&mut self) {
        if let Err(err) = self.finalize() {
            log::warn!("[WavSink] Finalize failed: {}", err);
        }
    }
}

/// Observable state of a [`MemoryClipStore`]
#[derive(Debug, Clone, Default)]
pub struct ClipProbe {
    opens: Arc<AtomicUsize>,
    rewinds: Arc<AtomicUsize>,
    position: Arc<AtomicU64>,
}

impl ClipProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn rewinds(&self) -> usize {
        self.rewinds.load(Ordering::SeqCst)
    }

    /// Byte offset of the most recently opened stream
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }
}

/// In-memory clip store
#[derive(Debug, Clone, Default)]
pub struct MemoryClipStore {
    clips: HashMap<String, Arc<Vec<u8>>>,
    probe: ClipProbe,
}

impl MemoryClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(mut self, clip: impl Into<String>, data: Vec<u8>) -> Self {
        self.clips.insert(clip.into(), Arc::new(data));
        self
    }

    pub fn probe(&self) -> ClipProbe {
        self.probe.clone()
    }
}

struct ProbedClipStream {
    inner: PcmClipStream,
    probe: ClipProbe,
}

impl ClipStream for ProbedClipStream {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        let n = self.inner.read_chunk(buf)?;
        self.probe
            .position
            .store(self.inner.position(), Ordering::SeqCst);
        Ok(n)
    }

    fn rewind(&mut self) -> Result<(), AudioError> {
        self.inner.rewind()?;
        self.probe.rewinds.fetch_add(1, Ordering::SeqCst);
        self.probe.position.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }
}

impl ClipStore for MemoryClipStore {
    fn open(&self, clip: &str) -> Result<Box<dyn ClipStream>, AudioError> {
        let data = self
            .clips
            .get(clip)
            .cloned()
            .ok_or_else(|| AudioError::ClipNotFound {
                clip: clip.to_string(),
            })?;
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        self.probe.position.store(0, Ordering::SeqCst);
        Ok(Box::new(ProbedClipStream {
            inner: PcmClipStream::new(clip, data),
            probe: self.probe.clone(),
        }))
    }

    fn contains(&self, clip: &str) -> bool {
        self.clips.contains_key(clip)
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clips.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source_replays_then_silence() {
        let mut source = ScriptedSource::new(vec![
            Ok(vec![1, 2, 3, 4]),
            Err(AudioError::Acquisition {
                reason: "timeout".to_string(),
            }),
        ]);
        let mut buf = [9u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(source.read(&mut buf).is_err());
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [0; 4]);
        assert_eq!(source.probe().reads(), 3);
    }

    #[test]
    fn test_scripted_source_requests_stop_when_exhausted() {
        let run_state = RunState::new();
        let mut source =
            ScriptedSource::new(vec![Ok(vec![0; 2]), Ok(vec![0; 2])]).stop_when_exhausted(run_state.clone());
        let mut buf = [0u8; 2];
        source.read(&mut buf).unwrap();
        assert!(run_state.is_running());
        source.read(&mut buf).unwrap();
        assert!(!run_state.is_running());
    }

    #[test]
    fn test_synthetic_source_is_seeded() {
        let schedule = vec![NoiseSegment::new(2, 0), NoiseSegment::new(1, 1000)];
        let mut a = SyntheticSource::new(7, schedule.clone());
        let mut b = SyntheticSource::new(7, schedule);

        let mut buf_a = vec![0u8; 64];
        let mut buf_b = vec![0u8; 64];
        for _ in 0..2 {
            a.read(&mut buf_a).unwrap();
            assert!(buf_a.iter().all(|&byte| byte == 0));
        }
        for _ in 0..2 {
            b.read(&mut buf_b).unwrap();
        }
        a.read(&mut buf_a).unwrap();
        b.read(&mut buf_b).unwrap();
        assert_eq!(buf_a, buf_b);
        assert!(buf_a.chunks_exact(2).any(|f| i16::from_le_bytes([f[0], f[1]]) != 0));
        assert!(buf_a
            .chunks_exact(2)
            .all(|f| i16::from_le_bytes([f[0], f[1]]).abs() <= 1000));
    }

    #[test]
    fn test_synthetic_source_s32_frames_decode() {
        use crate::analysis::decode::SampleDecoder;

        let mut source = SyntheticSource::new(3, vec![NoiseSegment::new(1, 1200)])
            .with_format(SampleFormat::S32Le);
        let mut buf = vec![0u8; 128];
        assert_eq!(source.read(&mut buf).unwrap(), 128);

        let samples = SampleDecoder::new(SampleFormat::S32Le, 1, 0)
            .decode(&buf)
            .unwrap();
        assert_eq!(samples.len(), 32);
        assert!(samples.iter().all(|s| s.abs() <= 1200));
        assert!(samples.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_recording_sink_fault_injection() {
        let mut sink = RecordingSink::new().fail_on_write(2);
        let probe = sink.probe();
        sink.write(&[1, 2]).unwrap();
        assert!(matches!(
            sink.write(&[3, 4]),
            Err(AudioError::SinkWrite { .. })
        ));
        sink.write(&[5, 6]).unwrap();
        assert_eq!(probe.bytes(), vec![1, 2, 5, 6]);
        assert_eq!(probe.writes(), 3);
        assert!(!probe.in_write());
    }

    #[test]
    fn test_memory_clip_store_tracks_position() {
        let store = MemoryClipStore::new().with_clip("joey.raw", vec![7u8; 10]);
        let probe = store.probe();
        let mut stream = store.open("joey.raw").unwrap();
        let mut buf = [0u8; 4];
        stream.read_chunk(&mut buf).unwrap();
        stream.read_chunk(&mut buf).unwrap();
        assert_eq!(probe.position(), 8);
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 0);
        stream.rewind().unwrap();
        assert_eq!(probe.rewinds(), 1);
        assert_eq!(probe.opens(), 1);
        assert!(store.open("missing.raw").is_err());
    }

    #[test]
    fn test_wav_sink_writes_samples() {
        let path = std::env::temp_dir().join(format!("ambient_wav_sink_{}.wav", std::process::id()));
        let mut sink = WavSink::create(&path, 16_000).unwrap();
        sink.write(&[0x10, 0x00, 0xF0, 0xFF]).unwrap();
        sink.release();

        let reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![16, -16]);
        let _ = std::fs::remove_file(&path);
    }
}
