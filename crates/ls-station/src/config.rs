//! Station configuration.
//!
//! Stored as YAML. Every section and field has a default, so a partial
//! file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use ls_engine::{MetronomeConfig, MixerConfig, SchedulerConfig, TempoSettings};
use ls_ir::BEAT_EPSILON;

use crate::recorder::RecorderConfig;

/// Error type for configuration loading and saving.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub transport: TransportConfig,
    pub scheduler: SchedulerSection,
    pub mixer: MixerSection,
    pub metronome: MetronomeSection,
    pub recorder: RecorderSection,
    /// Output rate used when no device dictates one (offline bounce)
    pub sample_rate: u32,
    /// Render block size for offline bounce and the device request
    pub buffer_frames: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            scheduler: SchedulerSection::default(),
            mixer: MixerSection::default(),
            metronome: MetronomeSection::default(),
            recorder: RecorderSection::default(),
            sample_rate: 48_000,
            buffer_frames: 512,
        }
    }
}

impl StationConfig {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::info!("loading config from {:?}", path);
        if !path.exists() {
            log::info!("config file doesn't exist, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Save as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(io_err)?;
        log::info!("config saved to {:?}", path);
        Ok(())
    }
}

/// Tempo and transport defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub bars: u32,
    pub count_in_enabled: bool,
    pub count_in_bars: u32,
    /// Delay between `play` and the first beat
    pub start_delay_ms: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_bar: 4,
            bars: 4,
            count_in_enabled: false,
            count_in_bars: 1,
            start_delay_ms: 100.0,
        }
    }
}

impl TransportConfig {
    /// Clamping happens inside the tempo clock.
    pub fn tempo_settings(&self) -> TempoSettings {
        TempoSettings {
            bpm: self.bpm,
            beats_per_bar: self.beats_per_bar,
            bars: self.bars,
            count_in_enabled: self.count_in_enabled,
            count_in_bars: self.count_in_bars,
            start_delay: ms(self.start_delay_ms),
        }
    }
}

/// Lookahead and lateness tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub lookahead_ms: f64,
    pub late_tolerance_ms: f64,
    pub late_snap_ms: f64,
    pub note_off_lookahead_ms: f64,
    pub beat_epsilon: f64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            lookahead_ms: 100.0,
            late_tolerance_ms: 150.0,
            late_snap_ms: 5.0,
            note_off_lookahead_ms: 300.0,
            beat_epsilon: BEAT_EPSILON,
        }
    }
}

impl SchedulerSection {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            lookahead_seconds: ms(self.lookahead_ms),
            late_tolerance_seconds: ms(self.late_tolerance_ms),
            late_snap_seconds: ms(self.late_snap_ms),
            note_off_lookahead_seconds: ms(self.note_off_lookahead_ms),
            beat_epsilon: self.beat_epsilon.max(0.0),
        }
    }
}

/// Voice pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSection {
    pub max_voices: usize,
    pub command_capacity: usize,
    pub forced_fade_ms: f64,
    pub output_channels: u16,
}

impl Default for MixerSection {
    fn default() -> Self {
        Self {
            max_voices: 64,
            command_capacity: 1024,
            forced_fade_ms: 5.0,
            output_channels: 2,
        }
    }
}

impl MixerSection {
    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig {
            max_voices: self.max_voices.max(1),
            command_capacity: self.command_capacity.max(1),
            forced_fade_seconds: ms(self.forced_fade_ms),
            output_channels: self.output_channels.max(1),
        }
    }
}

/// Click track options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSection {
    pub enabled: bool,
    pub during_playback: bool,
    pub gain: f32,
}

impl Default for MetronomeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            during_playback: false,
            gain: 0.6,
        }
    }
}

impl MetronomeSection {
    pub fn metronome_config(&self) -> MetronomeConfig {
        MetronomeConfig {
            enabled: self.enabled,
            during_playback: self.during_playback,
            gain: self.gain.clamp(0.0, 1.0),
        }
    }
}

/// Live recording options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSection {
    /// Grid recorded note starts snap to, in beats
    pub quantize_beats: Option<f64>,
    /// Shortest note a release can produce, in beats
    pub min_note_beats: f64,
}

impl Default for RecorderSection {
    fn default() -> Self {
        Self {
            quantize_beats: None,
            min_note_beats: 0.0625,
        }
    }
}

impl RecorderSection {
    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            quantize_beats: self.quantize_beats.filter(|g| *g > 0.0),
            min_note_beats: self.min_note_beats.max(0.0),
        }
    }
}

fn ms(value: f64) -> f64 {
    value.max(0.0) / 1000.0
}
