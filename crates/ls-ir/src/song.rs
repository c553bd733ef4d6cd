//! Song metadata and the importer boundary.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::track::Track;

/// Tempo and loop shape of a song.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SongInfo {
    /// Song name
    pub name: ArrayString<32>,
    /// Tempo in beats per minute
    pub bpm: f64,
    /// Beats per bar (time signature numerator)
    pub beats_per_bar: u32,
    /// Loop length in bars
    pub bars: u32,
}

impl Default for SongInfo {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            bpm: 120.0,
            beats_per_bar: 4,
            bars: 4,
        }
    }
}

impl SongInfo {
    /// Create song metadata with the given name and tempo.
    pub fn new(name: &str, bpm: f64, beats_per_bar: u32, bars: u32) -> Self {
        let mut info = Self { bpm, beats_per_bar, bars, ..Self::default() };
        let _ = info.name.try_push_str(name);
        info
    }

    /// Loop length in beats.
    pub fn total_beats(&self) -> f64 {
        self.beats_per_bar as f64 * self.bars as f64
    }
}

/// A song as produced by a format importer: metadata plus tracks.
#[derive(Clone, Debug, Default)]
pub struct Song {
    pub info: SongInfo,
    pub tracks: Vec<Track>,
}

impl Song {
    /// Create an empty song.
    pub fn new(info: SongInfo) -> Self {
        Self { info, tracks: Vec::new() }
    }

    /// Append a track.
    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// Latest beat any note reaches, useful for sizing the loop.
    pub fn last_note_end(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.events().iter())
            .map(|e| e.end_beat())
            .fold(0.0, f64::max)
    }
}
