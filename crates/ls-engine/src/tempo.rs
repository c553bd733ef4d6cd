//! Tempo clock: maps audio-clock seconds onto loop-relative beats.
//!
//! The clock owns BPM, time signature and loop length, and a small
//! transport state machine:
//!
//! ```text
//! Stopped --play (no count-in)--> Playing
//! Stopped --play (count-in)-----> CountingIn --elapsed >= count-in--> Playing
//! Playing/CountingIn --stop-----> Stopped
//! ```
//!
//! `play_start` (the audio-clock time of beat 0 of loop 0) fully
//! determines every position query. Every query takes the tick's cached
//! `now` so that all beat math inside one control tick agrees.

use alloc::vec::Vec;
use ls_ir::{normalize_beat, BEAT_EPSILON, MAX_BEATS_PER_BAR, MAX_BPM, MIN_BEATS_PER_BAR, MIN_BPM};

/// Transport state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Stopped,
    CountingIn,
    Playing,
}

/// Notifications produced by the clock, drained once per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockEvent {
    /// The transport changed state
    StateChanged(TransportState),
    /// The count-in finished and playback began
    CountInCompleted,
    /// Loop `loop_index` played through to its end
    LoopCompleted { loop_index: i64 },
    /// Tempo or loop shape changed
    TempoChanged { bpm: f64, beats_per_bar: u32, bars: u32 },
    /// Playback position jumped
    Seeked { beat: f64 },
}

/// Initial clock settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoSettings {
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub bars: u32,
    pub count_in_enabled: bool,
    pub count_in_bars: u32,
    /// Seconds between `play` and the first beat
    pub start_delay: f64,
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_bar: 4,
            bars: 4,
            count_in_enabled: false,
            count_in_bars: 1,
            start_delay: 0.1,
        }
    }
}

/// Beat/tempo clock for one looping session.
#[derive(Clone, Debug)]
pub struct TempoClock {
    bpm: f64,
    beats_per_bar: u32,
    bars: u32,
    count_in_enabled: bool,
    count_in_bars: u32,
    start_delay: f64,
    // Derived
    seconds_per_beat: f64,
    total_beats: f64,
    loop_duration: f64,
    // Transport
    state: TransportState,
    play_start: f64,
    count_in_start: f64,
    pending_seek: Option<f64>,
    /// Last loop index reported, for loop-completion detection
    last_loop: i64,
    events: Vec<ClockEvent>,
}

impl Default for TempoClock {
    fn default() -> Self {
        Self::new(TempoSettings::default())
    }
}

impl TempoClock {
    /// Create a stopped clock.
    pub fn new(settings: TempoSettings) -> Self {
        let mut clock = Self {
            bpm: 120.0,
            beats_per_bar: 4,
            bars: 4,
            count_in_enabled: settings.count_in_enabled,
            count_in_bars: settings.count_in_bars,
            start_delay: settings.start_delay.max(0.0),
            seconds_per_beat: 0.5,
            total_beats: 16.0,
            loop_duration: 8.0,
            state: TransportState::Stopped,
            play_start: 0.0,
            count_in_start: 0.0,
            pending_seek: None,
            last_loop: 0,
            events: Vec::new(),
        };
        clock.apply_tempo(settings.bpm, settings.beats_per_bar, settings.bars);
        clock
    }

    // --- Configuration ---

    /// Change tempo and loop shape. Inputs are clamped, never rejected.
    ///
    /// The recorded `play_start` is left alone: a running loop keeps its
    /// absolute anchor until the next `play`.
    pub fn set_tempo(&mut self, bpm: f64, beats_per_bar: u32, bars: u32) {
        self.apply_tempo(bpm, beats_per_bar, bars);
        self.events.push(ClockEvent::TempoChanged {
            bpm: self.bpm,
            beats_per_bar: self.beats_per_bar,
            bars: self.bars,
        });
        log::info!(
            "tempo: {} bpm, {}/bar, {} bars ({:.3}s loop)",
            self.bpm,
            self.beats_per_bar,
            self.bars,
            self.loop_duration
        );
    }

    fn apply_tempo(&mut self, bpm: f64, beats_per_bar: u32, bars: u32) {
        self.bpm = if bpm.is_finite() { bpm.clamp(MIN_BPM, MAX_BPM) } else { self.bpm };
        self.beats_per_bar = beats_per_bar.clamp(MIN_BEATS_PER_BAR, MAX_BEATS_PER_BAR);
        self.bars = bars.max(1);
        self.seconds_per_beat = 60.0 / self.bpm;
        self.total_beats = self.beats_per_bar as f64 * self.bars as f64;
        self.loop_duration = self.seconds_per_beat * self.total_beats;
    }

    /// Enable or disable the count-in and set its length in bars.
    pub fn set_count_in(&mut self, enabled: bool, bars: u32) {
        self.count_in_enabled = enabled;
        self.count_in_bars = bars;
    }

    /// Delay between `play` and the first beat, in seconds.
    pub fn set_start_delay(&mut self, seconds: f64) {
        self.start_delay = seconds.max(0.0);
    }

    // --- Transport ---

    /// Start the transport. No-op unless stopped; returns whether the
    /// state changed.
    pub fn play(&mut self, now: f64) -> bool {
        if self.state != TransportState::Stopped {
            return false;
        }

        let count_in_beats = self.count_in_beats();
        if self.count_in_enabled && count_in_beats > 0.0 && self.pending_seek.is_none() {
            self.count_in_start = now + self.start_delay;
            self.play_start = self.count_in_start + count_in_beats * self.seconds_per_beat;
            self.state = TransportState::CountingIn;
        } else {
            let offset = self.pending_seek.take().unwrap_or(0.0);
            self.play_start = now + self.start_delay - offset * self.seconds_per_beat;
            self.count_in_start = self.play_start;
            self.state = TransportState::Playing;
        }

        self.last_loop = 0;
        self.events.push(ClockEvent::StateChanged(self.state));
        log::debug!("transport: {:?}, play_start={:.4}", self.state, self.play_start);
        true
    }

    /// Stop the transport. Returns whether the state changed.
    pub fn stop(&mut self) -> bool {
        if self.state == TransportState::Stopped {
            return false;
        }
        self.state = TransportState::Stopped;
        self.last_loop = 0;
        self.events.push(ClockEvent::StateChanged(self.state));
        log::debug!("transport: stopped");
        true
    }

    /// Move the playhead to `beat` (wrapped into the loop).
    ///
    /// While playing the loop anchor moves so that `now` becomes `beat`;
    /// otherwise the position is applied by the next `play` (or at the end
    /// of a running count-in).
    pub fn seek_to(&mut self, beat: f64, now: f64) {
        let beat = normalize_beat(beat, self.total_beats);
        match self.state {
            TransportState::Playing => {
                self.play_start = now - beat * self.seconds_per_beat;
                self.last_loop = self.current_loop(now);
            }
            TransportState::Stopped | TransportState::CountingIn => {
                self.pending_seek = Some(beat);
            }
        }
        self.events.push(ClockEvent::Seeked { beat });
    }

    /// Advance the state machine; call once per control tick.
    pub fn update(&mut self, now: f64) {
        if self.state == TransportState::CountingIn
            && now - self.count_in_start >= self.count_in_duration()
        {
            if let Some(beat) = self.pending_seek.take() {
                self.play_start -= beat * self.seconds_per_beat;
            }
            self.state = TransportState::Playing;
            self.last_loop = 0;
            self.events.push(ClockEvent::CountInCompleted);
            self.events.push(ClockEvent::StateChanged(TransportState::Playing));
            log::debug!("transport: count-in complete");
        }

        if self.state == TransportState::Playing {
            let current = self.current_loop(now);
            while self.last_loop < current {
                self.events.push(ClockEvent::LoopCompleted { loop_index: self.last_loop });
                self.last_loop += 1;
            }
        }
    }

    /// Take the notifications accumulated since the last drain.
    pub fn drain_events(&mut self) -> alloc::vec::Drain<'_, ClockEvent> {
        self.events.drain(..)
    }

    // --- Queries ---

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_counting_in(&self) -> bool {
        self.state == TransportState::CountingIn
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn bars(&self) -> u32 {
        self.bars
    }

    pub fn seconds_per_beat(&self) -> f64 {
        self.seconds_per_beat
    }

    pub fn total_beats(&self) -> f64 {
        self.total_beats
    }

    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
    }

    /// Audio-clock time of beat 0, loop 0.
    pub fn play_start(&self) -> f64 {
        self.play_start
    }

    /// Audio-clock time of the first count-in beat.
    pub fn count_in_start(&self) -> f64 {
        self.count_in_start
    }

    /// Seek target waiting for the next `play`.
    pub fn pending_seek(&self) -> Option<f64> {
        self.pending_seek
    }

    /// Count-in length in beats (0 when disabled).
    pub fn count_in_beats(&self) -> f64 {
        if !self.count_in_enabled {
            return 0.0;
        }
        self.count_in_bars as f64 * self.beats_per_bar as f64
    }

    pub fn count_in_duration(&self) -> f64 {
        self.count_in_beats() * self.seconds_per_beat
    }

    /// Beats elapsed since `play_start`, negative before the first beat.
    /// `None` while stopped.
    pub fn elapsed_beats(&self, now: f64) -> Option<f64> {
        match self.state {
            TransportState::Stopped => None,
            _ => Some((now - self.play_start) / self.seconds_per_beat),
        }
    }

    /// `(loop, beat-in-loop)` while playing and past the first beat.
    ///
    /// Both components come from one division so they can never disagree
    /// at a loop boundary.
    pub fn position(&self, now: f64) -> Option<(i64, f64)> {
        if self.state != TransportState::Playing {
            return None;
        }
        let elapsed = (now - self.play_start) / self.seconds_per_beat;
        if elapsed < 0.0 {
            return None;
        }
        let loop_index = libm::floor(elapsed / self.total_beats);
        let beat = elapsed - loop_index * self.total_beats;
        if beat >= self.total_beats {
            return Some((loop_index as i64 + 1, 0.0));
        }
        Some((loop_index as i64, beat.max(0.0)))
    }

    /// Current beat inside the loop; 0 when stopped, counting in or not
    /// yet started.
    pub fn current_beat_precise(&self, now: f64) -> f64 {
        self.position(now).map_or(0.0, |(_, beat)| beat)
    }

    /// Whole beat index inside the loop.
    pub fn current_beat(&self, now: f64) -> u32 {
        libm::floor(self.current_beat_precise(now)) as u32
    }

    /// Number of completed loop iterations; 0 when not started.
    pub fn current_loop(&self, now: f64) -> i64 {
        self.position(now).map_or(0, |(loop_index, _)| loop_index)
    }

    /// Audio-clock time of the next occurrence of `beat`.
    ///
    /// A beat more than [`BEAT_EPSILON`] behind the playhead resolves to
    /// the next loop; a beat at the playhead resolves to the current one.
    pub fn dsp_time_for_beat(&self, beat: f64, now: f64) -> f64 {
        let beat = normalize_beat(beat, self.total_beats);
        match self.position(now) {
            None => self.play_start + beat * self.seconds_per_beat,
            Some((loop_index, current)) => {
                let target = if beat < current - BEAT_EPSILON { loop_index + 1 } else { loop_index };
                self.dsp_time_for_beat_in_loop(beat, target)
            }
        }
    }

    /// Audio-clock time of `beat` in a known loop iteration.
    pub fn dsp_time_for_beat_in_loop(&self, beat: f64, loop_index: i64) -> f64 {
        let beat = normalize_beat(beat, self.total_beats);
        self.play_start + (loop_index as f64 * self.total_beats + beat) * self.seconds_per_beat
    }

    /// Audio-clock time of count-in beat `n` (0-based).
    pub fn dsp_time_for_count_in_beat(&self, n: u32) -> f64 {
        self.count_in_start + n as f64 * self.seconds_per_beat
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds / self.seconds_per_beat
    }
}
