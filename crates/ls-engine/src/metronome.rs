//! Metronome: count-in clicks and an optional playback click track.
//!
//! Clicks are committed through the same lookahead mechanism as notes,
//! keyed per beat so a click is never scheduled twice.

use alloc::collections::BTreeSet;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::f32::consts::TAU;

use ls_ir::Sample;

use crate::mixer::VoiceSink;
use crate::tempo::{TempoClock, TransportState};
use crate::voice::VoiceTag;

/// Voice tag source used for clicks.
pub const METRONOME_SOURCE: u32 = u32::MAX;

/// Dedup key loop index for count-in beats.
const COUNT_IN_LOOP: i64 = -1;

/// Metronome options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetronomeConfig {
    /// Click during count-in
    pub enabled: bool,
    /// Keep clicking once playback starts
    pub during_playback: bool,
    pub gain: f32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            during_playback: false,
            gain: 0.6,
        }
    }
}

pub struct Metronome {
    config: MetronomeConfig,
    accent: Arc<Sample>,
    click: Arc<Sample>,
    scheduled: BTreeSet<(i64, u32)>,
}

impl Metronome {
    /// Metronome with generated sine-burst clicks.
    pub fn new(config: MetronomeConfig, sample_rate: u32) -> Self {
        Self::with_samples(
            config,
            Arc::new(sine_click("accent", sample_rate, 1500.0, 0.03)),
            Arc::new(sine_click("click", sample_rate, 1000.0, 0.03)),
        )
    }

    /// Metronome with user-supplied click samples.
    pub fn with_samples(config: MetronomeConfig, accent: Arc<Sample>, click: Arc<Sample>) -> Self {
        Self {
            config,
            accent,
            click,
            scheduled: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &MetronomeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: MetronomeConfig) {
        self.config = config;
    }

    /// Forget scheduled clicks (after stop or seek).
    pub fn reset(&mut self) {
        self.scheduled.clear();
    }

    /// Commit the clicks due within `lookahead` seconds of `now`.
    /// Returns the number of clicks scheduled.
    pub fn tick(
        &mut self,
        now: f64,
        clock: &TempoClock,
        lookahead: f64,
        sink: &mut dyn VoiceSink,
    ) -> usize {
        if !self.config.enabled {
            return 0;
        }
        let horizon = now + lookahead;
        let beats_per_bar = clock.beats_per_bar().max(1);
        let mut due: Vec<(i64, u32, f64)> = Vec::new();

        match clock.state() {
            TransportState::Stopped => return 0,
            TransportState::CountingIn => {
                let beats = clock.count_in_beats() as u32;
                for n in 0..beats {
                    let t = clock.dsp_time_for_count_in_beat(n);
                    if t >= now && t <= horizon {
                        due.push((COUNT_IN_LOOP, n, t));
                    }
                }
            }
            TransportState::Playing => {}
        }

        // Playback clicks; the tail of a count-in can also reach beat 0.
        if self.config.during_playback {
            if let Some(elapsed) = clock.elapsed_beats(now) {
                let total = clock.total_beats() as i64;
                let first = (libm::ceil(elapsed) as i64).max(0);
                let last = libm::floor(clock.seconds_to_beats(horizon - clock.play_start())) as i64;
                for k in first..=last {
                    let loop_index = k.div_euclid(total.max(1));
                    let beat = k.rem_euclid(total.max(1)) as u32;
                    let t = clock.dsp_time_for_beat_in_loop(beat as f64, loop_index);
                    if t >= now {
                        due.push((loop_index, beat, t));
                    }
                }
            }
        }

        let mut count = 0;
        for (loop_index, beat, t) in due {
            if !self.scheduled.insert((loop_index, beat)) {
                continue;
            }
            let accent = beat % beats_per_bar == 0;
            let sample = if accent { &self.accent } else { &self.click };
            let tag = VoiceTag::new(METRONOME_SOURCE, accent as u8);
            match sink.schedule_note(sample, t, self.config.gain, 1.0, tag) {
                Ok(_) => count += 1,
                Err(e) => log::debug!("metronome click dropped: {e}"),
            }
        }

        if let Some((loop_index, _)) = clock.position(now) {
            self.scheduled
                .retain(|&(l, _)| l == COUNT_IN_LOOP || l >= loop_index - 1);
        }
        count
    }
}

/// Generate an exponentially decaying sine burst.
pub fn sine_click(name: &str, sample_rate: u32, freq: f32, seconds: f32) -> Sample {
    let rate = sample_rate.max(1) as f32;
    let frames = libm::roundf(seconds * rate) as usize;
    let decay = 5.0 / seconds.max(1e-4);
    let data = (0..frames)
        .map(|i| {
            let t = i as f32 / rate;
            libm::sinf(TAU * freq * t) * libm::expf(-decay * t)
        })
        .collect();
    Sample::mono(name, sample_rate, data)
}
