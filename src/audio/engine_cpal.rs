//! CPAL-backed microphone and speaker for desktop runs
//!
//! `cpal::Stream` is not `Send`, so each stream lives on its own device
//! thread for its whole life. The blocking `SampleSource`/`AudioSink` calls
//! talk to the realtime callbacks through `rtrb` ring buffers of i16
//! samples. Reinit/reset tear the device thread down and spawn a new one.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio::io::{AudioSink, SampleSource};
use crate::config::{AudioConfig, SampleFormat};
use crate::error::AudioError;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Owns one device thread; dropping the stop sender ends the stream
struct DeviceThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl DeviceThread {
    /// Spawn a thread that builds a stream with `open`, plays it, and keeps
    /// it alive until stopped. Returns once the stream is running.
    fn spawn<F>(name: &str, open: F) -> Result<Self, AudioError>
    where
        F: FnOnce() -> Result<cpal::Stream, AudioError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), AudioError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match open() {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamOpenFailed {
                        reason: format!("play failed: {}", err),
                    }));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Blocks until stop() or the sender is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("failed to spawn device thread: {}", e),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { stop_tx, handle }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::WorkerPanicked)
            }
        }
    }

    fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            tracing::warn!("[CpalDevice] Device thread panicked during shutdown");
        }
    }
}

fn open_failed(context: &str, err: impl std::fmt::Display) -> AudioError {
    AudioError::StreamOpenFailed {
        reason: format!("{}: {}", context, err),
    }
}

fn stream_config(
    default: &cpal::SupportedStreamConfig,
    wanted_rate: u32,
) -> cpal::StreamConfig {
    let mut config: cpal::StreamConfig = default.clone().into();
    if config.sample_rate.0 != wanted_rate {
        tracing::warn!(
            "[CpalDevice] Device runs at {} Hz, configured {} Hz; using device rate",
            config.sample_rate.0,
            wanted_rate
        );
    }
    config.buffer_size = cpal::BufferSize::Default;
    config
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: Producer<i16>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample,
    i16: cpal::FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // First channel only; overflow drops samples
                for frame in data.chunks(channels) {
                    if let Some(&sample) = frame.first() {
                        let value: i16 = cpal::Sample::from_sample(sample);
                        let _ = producer.push(value);
                    }
                }
            },
            |err| tracing::warn!("[CpalSource] Input stream error: {}", err),
            None,
        )
        .map_err(|e| open_failed("build input stream", e))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: Consumer<i16>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels = config.channels.max(1) as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    // Underrun plays silence
                    let value = consumer.pop().unwrap_or(0);
                    let sample: T = cpal::Sample::from_sample(value);
                    for slot in frame.iter_mut() {
                        *slot = sample;
                    }
                }
            },
            |err| tracing::warn!("[CpalSink] Output stream error: {}", err),
            None,
        )
        .map_err(|e| open_failed("build output stream", e))
}

fn open_input(producer: Producer<i16>, wanted_rate: u32) -> Result<cpal::Stream, AudioError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| open_failed("input", "no default input device"))?;
    let default = device
        .default_input_config()
        .map_err(|e| open_failed("default input config", e))?;
    let config = stream_config(&default, wanted_rate);

    match default.sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, producer),
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, producer),
        cpal::SampleFormat::I32 => build_input::<i32>(&device, &config, producer),
        other => Err(open_failed("input", format!("unsupported sample format {:?}", other))),
    }
}

fn open_output(consumer: Consumer<i16>, wanted_rate: u32) -> Result<cpal::Stream, AudioError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| open_failed("output", "no default output device"))?;
    let default = device
        .default_output_config()
        .map_err(|e| open_failed("default output config", e))?;
    let config = stream_config(&default, wanted_rate);

    match default.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, consumer),
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, consumer),
        cpal::SampleFormat::I32 => build_output::<i32>(&device, &config, consumer),
        other => Err(open_failed("output", format!("unsupported sample format {:?}", other))),
    }
}

/// Default input device as a blocking sample source
pub struct CpalSampleSource {
    sample_rate: u32,
    format: SampleFormat,
    read_timeout: Duration,
    consumer: Option<Consumer<i16>>,
    device: Option<DeviceThread>,
}

impl CpalSampleSource {
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let mut source = Self {
            sample_rate: config.sample_rate,
            format: config.sample_format,
            read_timeout: config.buffer_duration() * 4,
            consumer: None,
            device: None,
        };
        source.start_device()?;
        Ok(source)
    }

    fn start_device(&mut self) -> Result<(), AudioError> {
        // One second of headroom
        let (producer, consumer) = RingBuffer::<i16>::new(self.sample_rate.max(1) as usize);
        let rate = self.sample_rate;
        let device = DeviceThread::spawn("ambient-mic", move || open_input(producer, rate))?;
        self.consumer = Some(consumer);
        self.device = Some(device);
        tracing::info!("[CpalSource] Input device started");
        Ok(())
    }

    fn stop_device(&mut self) {
        if let Some(device) = self.device.take() {
            device.stop();
        }
        self.consumer = None;
    }
}

impl SampleSource for CpalSampleSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        let consumer = self.consumer.as_mut().ok_or_else(|| AudioError::Acquisition {
            reason: "input device is not running".to_string(),
        })?;

        let width = self.format.bytes_per_sample();
        let wanted = buf.len() / width;
        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0;

        while filled < wanted {
            match consumer.pop() {
                Ok(sample) => {
                    let offset = filled * width;
                    match self.format {
                        SampleFormat::S16Le => {
                            buf[offset..offset + 2].copy_from_slice(&sample.to_le_bytes())
                        }
                        SampleFormat::S32Le => buf[offset..offset + 4]
                            .copy_from_slice(&((sample as i32) << 16).to_le_bytes()),
                    }
                    filled += 1;
                }
                Err(_) if Instant::now() >= deadline => {
                    return Err(AudioError::Acquisition {
                        reason: format!(
                            "read timed out after {:?} with {}/{} samples",
                            self.read_timeout, filled, wanted
                        ),
                    });
                }
                Err(_) => thread::sleep(POLL_INTERVAL),
            }
        }

        Ok(filled * width)
    }

    fn reinit(&mut self) -> Result<(), AudioError> {
        self.stop_device();
        self.start_device()
    }

    fn release(&mut self) {
        self.stop_device();
        tracing::info!("[CpalSource] Input device released");
    }
}

impl Drop for CpalSampleSource {
    fn drop(&mut self) {
        self.stop_device();
    }
}

/// Default output device as a blocking sink
pub struct CpalSink {
    sample_rate: u32,
    write_timeout: Duration,
    producer: Option<Producer<i16>>,
    device: Option<DeviceThread>,
}

impl CpalSink {
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let mut sink = Self {
            sample_rate: config.sample_rate,
            write_timeout: Duration::from_secs(1),
            producer: None,
            device: None,
        };
        sink.start_device()?;
        Ok(sink)
    }

    fn start_device(&mut self) -> Result<(), AudioError> {
        // Quarter second of queued output
        let capacity = (self.sample_rate.max(4) / 4) as usize;
        let (producer, consumer) = RingBuffer::<i16>::new(capacity);
        let rate = self.sample_rate;
        let device = DeviceThread::spawn("ambient-speaker", move || open_output(consumer, rate))
            .map_err(|err| match err {
                AudioError::StreamOpenFailed { reason } => AudioError::SinkReset { reason },
                other => other,
            })?;
        self.producer = Some(producer);
        self.device = Some(device);
        tracing::info!("[CpalSink] Output device started");
        Ok(())
    }

    fn stop_device(&mut self) {
        if let Some(device) = self.device.take() {
            device.stop();
        }
        self.producer = None;
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, chunk: &[u8]) -> Result<(), AudioError> {
        let producer = self.producer.as_mut().ok_or_else(|| AudioError::SinkWrite {
            reason: "output device is not running".to_string(),
        })?;

        let deadline = Instant::now() + self.write_timeout;
        for frame in chunk.chunks_exact(2) {
            let mut sample = i16::from_le_bytes([frame[0], frame[1]]);
            loop {
                match producer.push(sample) {
                    Ok(()) => break,
                    Err(rtrb::PushError::Full(rejected)) => {
                        if Instant::now() >= deadline {
                            return Err(AudioError::SinkWrite {
                                reason: format!("write timed out after {:?}", self.write_timeout),
                            });
                        }
                        sample = rejected;
                        thread::sleep(POLL_INTERVAL);
                    }
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), AudioError> {
        self.stop_device();
        self.start_device()
    }

    fn release(&mut self) {
        self.stop_device();
        tracing::info!("[CpalSink] Output device released");
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop_device();
    }
}
