//! Headless controller for the loopstation engine.
//!
//! Provides one API for tracks, transport, live input and rendering that
//! both a UI and the CLI can share.

mod config;
mod error;
mod events;
mod recorder;
mod render;
mod station;

pub use config::{
    ConfigError, MetronomeSection, MixerSection, RecorderSection, SchedulerSection,
    StationConfig, TransportConfig,
};
pub use error::StationError;
pub use events::{Cue, CueList, ListenerId, Listeners, StationEvent};
pub use recorder::{LiveNote, Placement, Recorder, RecorderConfig, Take};
pub use render::{render_frames, render_to_wav};
pub use station::{LoopStation, StationStats, LIVE_SOURCE};

// Re-export common types so callers don't need ls-ir/ls-engine directly.
pub use ls_audio::{AudioOutput, CpalOutput};
pub use ls_engine::{
    sine_click, DrumKit, Instrument, KeyZone, MixerRenderer, SampledKeys, TransportState,
    VoiceHandle,
};
pub use ls_formats::WavSampleLoader;
pub use ls_ir::{InstrumentKind, NoteEvent, Sample, Song, SongInfo, Track, TrackId};
