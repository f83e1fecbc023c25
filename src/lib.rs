// Ambient Trigger Core - sound-reactive playback engine
// Listens to a microphone, estimates loudness, and plays a clip while it is loud

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod playback;
pub mod telemetry;

// Re-exports for convenience
pub use analysis::{LevelEstimator, LoudnessReading, TriggerEvaluator};
pub use config::AppConfig;
pub use engine::{RunState, RunSummary, Supervisor};
pub use error::{AudioError, ErrorCode, LifecycleError};
pub use playback::{PlaybackController, PlaybackState};

use tracing::level_filters::LevelFilter;

/// Map a `-v` count to a level filter: 0 → info, 1 → debug, 2+ → trace
pub fn verbosity_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global fmt subscriber
///
/// `log` records from library helpers are bridged through the subscriber's
/// `tracing-log` integration. Calling this twice is harmless.
pub fn init_logging(verbosity: u8) {
    let installed = tracing_subscriber::fmt()
        .with_max_level(verbosity_filter(verbosity))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    if installed.is_ok() {
        log::debug!("Logging initialized at {}", verbosity_filter(verbosity));
    }
}
