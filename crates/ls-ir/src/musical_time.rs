//! Beat-relative time arithmetic.
//!
//! Beats are the universal position coordinate inside a loop. All values
//! are `f64` so that beat math stays exact enough across long sessions;
//! conversion to audio-clock seconds happens in the tempo clock.

/// Lowest accepted tempo.
pub const MIN_BPM: f64 = 30.0;
/// Highest accepted tempo.
pub const MAX_BPM: f64 = 300.0;
/// Fewest beats in a bar.
pub const MIN_BEATS_PER_BAR: u32 = 2;
/// Most beats in a bar.
pub const MAX_BEATS_PER_BAR: u32 = 8;

/// Tolerance used when comparing beat positions.
pub const BEAT_EPSILON: f64 = 0.001;

/// Wrap a beat position into `[0, total_beats)`.
///
/// Negative positions wrap from the end of the loop. A non-positive loop
/// length maps everything to zero.
pub fn normalize_beat(beat: f64, total_beats: f64) -> f64 {
    if total_beats <= 0.0 || !beat.is_finite() {
        return 0.0;
    }
    let mut wrapped = beat % total_beats;
    if wrapped < 0.0 {
        wrapped += total_beats;
    }
    // -tiny % total + total rounds up to total itself
    if wrapped >= total_beats {
        wrapped = 0.0;
    }
    wrapped
}

/// Forward distance in beats from `start` to `end` inside a loop of
/// `total_beats`, wrapping across the loop end.
pub fn beats_between(start: f64, end: f64, total_beats: f64) -> f64 {
    let delta = end - start;
    if delta >= 0.0 {
        delta
    } else {
        delta + total_beats
    }
}

/// Snap a beat position to the nearest multiple of `grid`.
pub fn quantize_beat(beat: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return beat;
    }
    libm::round(beat / grid) * grid
}
