//! Realtime engine for loopstation.
//!
//! Converts beat-relative track events into sample-accurate voices:
//! the [`TempoClock`] maps audio-clock time to beats, the
//! [`EventScheduler`] commits a lookahead window of notes each control
//! tick, and the split [`VoiceMixer`]/[`MixerRenderer`] pair carries them
//! across to the audio thread.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod clock;
mod command;
mod error;
pub mod instrument;
mod metronome;
mod mixer;
mod sample_cache;
pub mod scheduler;
mod tempo;
mod voice;
mod voice_pool;

#[cfg(test)]
mod testing;

pub use clock::{frame_for_time, AudioClock, FrameClock, ManualClock};
pub use error::{CacheError, ScheduleError};
pub use instrument::{DrumKit, Instrument, InstrumentRack, KeyZone, NoteVoice, SampledKeys};
pub use metronome::{sine_click, Metronome, MetronomeConfig, METRONOME_SOURCE};
pub use mixer::{create_mixer, limit, MixerConfig, MixerRenderer, MixerStats, VoiceMixer, VoiceSink};
pub use sample_cache::{CacheStats, SampleCache, SampleKey, SampleLoader};
pub use scheduler::{EventScheduler, ScheduledNote, SchedulerConfig, SchedulerStats, TickInput};
pub use tempo::{ClockEvent, TempoClock, TempoSettings, TransportState};
pub use voice::{VoiceHandle, VoiceTag};
