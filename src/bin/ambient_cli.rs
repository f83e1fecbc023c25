use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use ambient_trigger::analysis::decode::{encode_s16le, SampleDecoder};
use ambient_trigger::audio::{
    AudioSink, ClipStore, FsClipStore, MemoryClipStore, NoiseSegment, NullSink, SampleSource,
    SyntheticSource, WavSink,
};
use ambient_trigger::config::AppConfig;
use ambient_trigger::engine::{RunState, RunSummary, Supervisor};
use ambient_trigger::telemetry::{self, MetricEvent};
use ambient_trigger::{init_logging, LevelEstimator, LoudnessReading};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(
    name = "ambient_cli",
    about = "Sound-reactive clip player: live run, simulation and level analysis"
)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run against the default microphone and speaker (needs `desktop_audio`)
    Run {
        /// Directory holding playable clips
        #[arg(long)]
        clips: PathBuf,
        /// Clip to play, overriding the configuration
        #[arg(long)]
        clip: Option<String>,
        /// Print telemetry events to stdout as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Drive the full loop with synthetic noise and print a run summary
    Simulate {
        #[arg(long, default_value_t = 200)]
        cycles: u64,
        /// Comma-separated `cycles:amplitude` segments
        #[arg(long, default_value = "30:300,40:7000,30:300")]
        schedule: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Clip directory; a generated tone is used when omitted
        #[arg(long)]
        clips: Option<PathBuf>,
        /// Write played audio to this WAV file instead of discarding it
        #[arg(long)]
        output: Option<PathBuf>,
        /// Pace reads at the configured buffer duration
        #[arg(long)]
        realtime: bool,
        #[arg(long)]
        events: bool,
    },
    /// Capture the microphone to a WAV file (needs `desktop_audio`)
    Record {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 3)]
        seconds: u32,
        /// Apply the configured gain to the recording
        #[arg(long)]
        gain: bool,
        /// Right shift correcting the microphone's data alignment (0 disables)
        #[arg(long, default_value_t = 1)]
        correction_shift: u32,
    },
    /// Print one loudness reading per buffer of a recorded .raw/.wav file
    Analyze {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the effective configuration as JSON
    DumpConfig,
    /// List clips available in a directory
    ListClips {
        #[arg(long)]
        clips: PathBuf,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Run {
            clips,
            clip,
            events,
        } => run_live(config, &clips, clip, events),
        Commands::Simulate {
            cycles,
            schedule,
            seed,
            clips,
            output,
            realtime,
            events,
        } => run_simulate(
            config,
            SimulateArgs {
                cycles,
                schedule,
                seed,
                clips,
                output,
                realtime,
                events,
            },
        ),
        Commands::Record {
            output,
            seconds,
            gain,
            correction_shift,
        } => run_record(&config, &output, seconds, gain, correction_shift),
        Commands::Analyze { input } => run_analyze(&config, &input),
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
        Commands::ListClips { clips } => {
            for clip in FsClipStore::new(clips).list() {
                println!("{}", clip);
            }
            Ok(ExitCode::from(0))
        }
    }
}

struct SimulateArgs {
    cycles: u64,
    schedule: String,
    seed: u64,
    clips: Option<PathBuf>,
    output: Option<PathBuf>,
    realtime: bool,
    events: bool,
}

fn run_live(
    mut config: AppConfig,
    clips_dir: &Path,
    clip: Option<String>,
    events: bool,
) -> Result<ExitCode> {
    if let Some(clip) = clip {
        config.playback.clip = clip;
    }
    let source = open_source(&config)?;
    let sink = open_sink(&config)?;
    let clips: Arc<dyn ClipStore> = Arc::new(FsClipStore::new(clips_dir));

    let run_state = RunState::new();
    install_ctrl_c(run_state.clone())?;
    if events {
        spawn_event_printer();
    }

    let supervisor = Supervisor::new(config).with_run_state(run_state);
    let summary = supervisor
        .run(source, sink, clips)
        .context("supervisor failed")?;
    print_summary(&summary)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "desktop_audio")] {
        fn open_source(config: &AppConfig) -> Result<Box<dyn SampleSource>> {
            let source = ambient_trigger::audio::CpalSampleSource::open(&config.audio)
                .context("opening microphone")?;
            Ok(Box::new(source))
        }

        fn open_sink(config: &AppConfig) -> Result<Box<dyn AudioSink>> {
            let sink = ambient_trigger::audio::CpalSink::open(&config.audio)
                .context("opening speaker")?;
            Ok(Box::new(sink))
        }
    } else {
        fn open_source(_config: &AppConfig) -> Result<Box<dyn SampleSource>> {
            bail!("live audio requires building with `--features desktop_audio`")
        }

        fn open_sink(_config: &AppConfig) -> Result<Box<dyn AudioSink>> {
            bail!("live audio requires building with `--features desktop_audio`")
        }
    }
}

fn run_record(
    config: &AppConfig,
    output: &Path,
    seconds: u32,
    apply_gain: bool,
    correction_shift: u32,
) -> Result<ExitCode> {
    config.validate()?;
    if correction_shift > 15 {
        bail!("--correction-shift must be at most 15");
    }
    let audio = &config.audio;
    let gain = if apply_gain { config.level.gain } else { 1 };
    let decoder = SampleDecoder::new(audio.sample_format, gain, correction_shift);
    eprintln!(
        "Recording {} s to {} (gain {}x, correction shift {})",
        seconds,
        output.display(),
        gain,
        correction_shift
    );

    let total_bytes =
        seconds as usize * audio.sample_rate as usize * audio.sample_format.bytes_per_sample();
    let buffers = total_bytes.div_ceil(audio.buffer_bytes);

    let mut source = open_source(config)?;
    let mut sink = WavSink::create(output, audio.sample_rate)
        .with_context(|| format!("creating {}", output.display()))?;

    let result = capture(
        source.as_mut(),
        &mut sink,
        &decoder,
        audio.buffer_bytes,
        buffers,
    );
    source.release();
    sink.release();
    let recorded = result?;

    eprintln!(
        "Recorded {} samples ({:.1} s) to {}",
        recorded,
        recorded as f64 / audio.sample_rate.max(1) as f64,
        output.display()
    );
    Ok(ExitCode::from(0))
}

/// Decode `buffers` microphone reads into `sink`, returning the sample count
fn capture(
    source: &mut dyn SampleSource,
    sink: &mut WavSink,
    decoder: &SampleDecoder,
    buffer_bytes: usize,
    buffers: usize,
) -> Result<usize> {
    let mut buffer = vec![0u8; buffer_bytes];
    let mut samples = Vec::with_capacity(buffer_bytes / 2);
    let mut recorded = 0;
    for index in 0..buffers {
        let filled = source
            .read(&mut buffer)
            .with_context(|| format!("reading buffer {}", index))?;
        decoder
            .decode_into(&buffer[..filled], &mut samples)
            .with_context(|| format!("decoding buffer {}", index))?;
        sink.write(&encode_s16le(&samples))?;
        recorded += samples.len();
    }
    Ok(recorded)
}

fn run_simulate(mut config: AppConfig, args: SimulateArgs) -> Result<ExitCode> {
    let schedule = parse_schedule(&args.schedule)?;
    // Simulations are short; skip the device warm-up grace
    config.supervisor.watchdog_startup_ms = 0;

    let mut source =
        SyntheticSource::new(args.seed, schedule).with_format(config.audio.sample_format);
    if args.realtime {
        source = source.with_pacing(config.audio.buffer_duration());
    }

    let sink: Box<dyn AudioSink> = match &args.output {
        Some(path) => Box::new(
            WavSink::create(path, config.audio.sample_rate)
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(NullSink),
    };

    let clips: Arc<dyn ClipStore> = match &args.clips {
        Some(dir) => Arc::new(FsClipStore::new(dir)),
        None => Arc::new(MemoryClipStore::new().with_clip(
            config.playback.clip.clone(),
            tone_clip(config.audio.sample_rate),
        )),
    };

    let run_state = RunState::new();
    install_ctrl_c(run_state.clone())?;
    if args.events {
        spawn_event_printer();
    }

    let supervisor = Supervisor::new(config)
        .with_run_state(run_state)
        .with_max_cycles(args.cycles);
    let summary = supervisor
        .run(Box::new(source), sink, clips)
        .context("simulation failed")?;
    print_summary(&summary)
}

#[derive(Serialize)]
struct AnalyzedBuffer {
    index: usize,
    #[serde(flatten)]
    reading: LoudnessReading,
}

fn run_analyze(config: &AppConfig, input: &Path) -> Result<ExitCode> {
    config.validate()?;
    let bytes = read_pcm(input)?;
    let mut estimator = LevelEstimator::new(config.audio.sample_format, &config.level);

    let mut peak_rms = 0.0_f64;
    let mut analyzed = 0usize;
    for (index, buffer) in bytes.chunks_exact(config.audio.buffer_bytes).enumerate() {
        let reading = estimator
            .evaluate(buffer)
            .with_context(|| format!("decoding buffer {}", index))?;
        peak_rms = peak_rms.max(reading.rms);
        analyzed += 1;
        println!(
            "{}",
            serde_json::to_string(&AnalyzedBuffer { index, reading })?
        );
    }

    let leftover = bytes.len() % config.audio.buffer_bytes;
    if leftover > 0 {
        eprintln!(
            "Ignored {} trailing bytes (less than one {}-byte buffer)",
            leftover, config.audio.buffer_bytes
        );
    }

    if analyzed == 0 {
        bail!(
            "{} is shorter than one {}-byte buffer",
            input.display(),
            config.audio.buffer_bytes
        );
    }
    eprintln!(
        "Analyzed {} buffers, peak RMS {:.1}, final average {:.1}",
        analyzed,
        peak_rms,
        estimator.history().mean()
    );
    Ok(ExitCode::from(0))
}

fn read_pcm(path: &Path) -> Result<Vec<u8>> {
    let is_wav = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if !is_wav {
        return fs::read(path).with_context(|| format!("reading {}", path.display()));
    }

    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 {
        bail!(
            "{} must be mono 16-bit, found {} channel(s) at {} bits",
            path.display(),
            spec.channels,
            spec.bits_per_sample
        );
    }
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok(encode_s16le(&samples))
}

fn parse_schedule(text: &str) -> Result<Vec<NoiseSegment>> {
    let segments = text
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| -> Result<NoiseSegment> {
            let (cycles, amplitude) = part
                .trim()
                .split_once(':')
                .ok_or_else(|| anyhow!("segment '{}' must be cycles:amplitude", part))?;
            Ok(NoiseSegment::new(
                cycles
                    .parse()
                    .with_context(|| format!("bad cycle count in '{}'", part))?,
                amplitude
                    .parse()
                    .with_context(|| format!("bad amplitude in '{}'", part))?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    if segments.is_empty() {
        bail!("noise schedule is empty");
    }
    Ok(segments)
}

/// One second of a 440 Hz tone at half scale
fn tone_clip(sample_rate: u32) -> Vec<u8> {
    let rate = sample_rate.max(1) as f64;
    let samples: Vec<i16> = (0..sample_rate)
        .map(|n| {
            let phase = 2.0 * std::f64::consts::PI * 440.0 * n as f64 / rate;
            (phase.sin() * (i16::MAX as f64 / 2.0)) as i16
        })
        .collect();
    encode_s16le(&samples)
}

fn print_summary(summary: &RunSummary) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(ExitCode::from(0))
}

/// Clear `run_state` on Ctrl-C
fn install_ctrl_c(run_state: RunState) -> Result<()> {
    thread::Builder::new()
        .name("ambient-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!("[Signal] Cannot build runtime, Ctrl-C disabled: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("[Signal] Ctrl-C received");
                    run_state.request_stop();
                }
            });
        })
        .context("spawning signal thread")?;
    Ok(())
}

fn spawn_event_printer() {
    let mut rx = telemetry::hub().collector().subscribe();
    let spawned = thread::Builder::new()
        .name("ambient-events".to_string())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Events] Skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        });
    if let Err(err) = spawned {
        tracing::warn!("[Events] Cannot spawn printer: {}", err);
    }
}

fn print_event(event: &MetricEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(err) => tracing::warn!("[Events] Cannot serialize event: {}", err),
    }
}
