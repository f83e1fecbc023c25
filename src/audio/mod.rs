// Audio module - device and storage collaborators
//
// The core only sees the traits in `io`. Concrete implementations:
// - clip_store: clips on a filesystem directory (.raw / .wav)
// - stubs: scripted and synthetic devices for desktop runs and tests
// - engine_cpal: default input/output devices (feature `desktop_audio`)

pub mod clip_store;
pub mod io;
pub mod stubs;

cfg_if::cfg_if! {
    if #[cfg(feature = "desktop_audio")] {
        pub mod engine_cpal;
        pub use engine_cpal::{CpalSampleSource, CpalSink};
    }
}

pub use clip_store::{FsClipStore, PcmClipStream};
pub use io::{AudioSink, ClipStore, ClipStream, SampleSource};
pub use stubs::{
    MemoryClipStore, NoiseSegment, NullSink, RecordingSink, ScriptedSource, SyntheticSource,
    WavSink,
};
