//! Core data types for the loopstation engine.
//!
//! This crate defines the plain data exchanged between the format
//! importers, the recorder and the realtime engine: note events, tracks,
//! song metadata and decoded sample data.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod instrument;
mod musical_time;
mod note;
mod sample;
pub mod song;
mod track;

pub use instrument::InstrumentKind;
pub use musical_time::{
    beats_between, normalize_beat, quantize_beat, BEAT_EPSILON, MAX_BEATS_PER_BAR, MAX_BPM,
    MIN_BEATS_PER_BAR, MIN_BPM,
};
pub use note::NoteEvent;
pub use sample::{Sample, SampleData};
pub use song::{Song, SongInfo};
pub use track::{EventId, Track, TrackId};
