//! Lookahead event scheduler.
//!
//! Runs once per control tick. Each tick commits the beat window
//! `(last_scheduled_beat, current_beat + lookahead_beats]` of every
//! audible track to the mixer, then dispatches note-offs for notes already
//! in flight. When the window runs past the loop end, the head of the
//! next loop is pre-scheduled so there is no gap at the boundary.
//!
//! Every submitted note is keyed by `(track, event, loop)`; a key is
//! never submitted twice until the scheduler is reset.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use ls_ir::{EventId, InstrumentKind, Track, TrackId, BEAT_EPSILON};

use crate::instrument::{InstrumentRack, DEFAULT_RELEASE_SECONDS};
use crate::mixer::VoiceSink;
use crate::tempo::TempoClock;
use crate::voice::VoiceHandle;

/// Scheduler timing knobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// How far ahead of the current position notes are committed
    pub lookahead_seconds: f64,
    /// Notes later than this are dropped
    pub late_tolerance_seconds: f64,
    /// Late notes within tolerance start this far after `now`
    pub late_snap_seconds: f64,
    /// Note-offs are sent this far ahead of their time
    pub note_off_lookahead_seconds: f64,
    /// A fresh window starts this many beats before its first beat
    pub beat_epsilon: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_seconds: 0.1,
            late_tolerance_seconds: 0.150,
            late_snap_seconds: 0.005,
            note_off_lookahead_seconds: 0.300,
            beat_epsilon: BEAT_EPSILON,
        }
    }
}

/// Counters since the scheduler was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub dropped_late: u64,
    /// Refused by the mixer or instrument (pool exhausted, unmapped pitch)
    pub dropped_voice: u64,
    pub note_offs: u64,
    /// Note-offs missed entirely and replaced by an immediate stop
    pub forced_stops: u64,
    pub in_flight: usize,
}

/// A note committed to the mixer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledNote {
    pub track: TrackId,
    pub event: EventId,
    pub loop_index: i64,
    pub pitch: u8,
    pub instrument: InstrumentKind,
    pub handle: VoiceHandle,
    /// Audio-clock start time (after any late snap)
    pub start_time: f64,
    /// Audio-clock time the note is released
    pub note_off_time: f64,
    off_sent: bool,
}

/// Everything a tick reads besides the mixer.
pub struct TickInput<'a> {
    /// The tick's cached audio-clock time
    pub now: f64,
    pub clock: &'a TempoClock,
    pub tracks: &'a [Track],
    /// When set, only this track is audible
    pub solo: Option<TrackId>,
    pub instruments: &'a InstrumentRack,
}

/// Per-tick lookahead scheduler.
pub struct EventScheduler {
    config: SchedulerConfig,
    window_loop: Option<i64>,
    last_scheduled_beat: f64,
    scheduled: BTreeSet<(TrackId, EventId, i64)>,
    in_flight: Vec<ScheduledNote>,
    just_scheduled: Vec<ScheduledNote>,
    stats: SchedulerStats,
}

impl EventScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            window_loop: None,
            last_scheduled_beat: -config.beat_epsilon,
            scheduled: BTreeSet::new(),
            in_flight: Vec::new(),
            just_scheduled: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SchedulerConfig) {
        self.config = config;
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            in_flight: self.in_flight.len(),
            ..self.stats
        }
    }

    /// Notes currently tracked for note-off dispatch.
    pub fn in_flight(&self) -> &[ScheduledNote] {
        &self.in_flight
    }

    /// Upper edge of the committed window, in beats of the current loop.
    pub fn last_scheduled_beat(&self) -> f64 {
        self.last_scheduled_beat
    }

    /// True if `(track, event, loop)` was already submitted.
    pub fn is_scheduled(&self, track: TrackId, event: EventId, loop_index: i64) -> bool {
        self.scheduled.contains(&(track, event, loop_index))
    }

    /// Forget all bookkeeping; the next tick starts a fresh window at beat 0.
    ///
    /// Does not touch the mixer. Callers stopping playback also stop the
    /// voices.
    pub fn reset(&mut self) {
        self.resync(0.0);
    }

    /// Forget all bookkeeping and restart the window so the next tick
    /// includes events at `beat`.
    pub fn resync(&mut self, beat: f64) {
        self.window_loop = None;
        self.last_scheduled_beat = beat - self.config.beat_epsilon;
        self.scheduled.clear();
        self.in_flight.clear();
        self.just_scheduled.clear();
    }

    /// Stop every in-flight note with the mixer's short fade.
    pub fn cancel_all(&mut self, sink: &mut dyn VoiceSink) {
        for note in self.in_flight.drain(..) {
            sink.stop_note_immediate(note.handle);
        }
    }

    /// Record `(track, event, loop)` as already played, e.g. for a note
    /// recorded live that the window has not reached yet.
    pub fn mark_scheduled(&mut self, track: TrackId, event: EventId, loop_index: i64) {
        self.scheduled.insert((track, event, loop_index));
    }

    /// Stop and forget the in-flight notes of one track.
    pub fn cancel_track(&mut self, track: TrackId, sink: &mut dyn VoiceSink) {
        self.in_flight.retain(|note| {
            if note.track == track {
                sink.stop_note_immediate(note.handle);
                false
            } else {
                true
            }
        });
    }

    /// Run one control tick. Returns the notes submitted by this tick.
    pub fn tick(&mut self, input: &TickInput<'_>, sink: &mut dyn VoiceSink) -> &[ScheduledNote] {
        self.just_scheduled.clear();

        if let Some((loop_index, beat)) = window_position(input.clock, input.now) {
            self.advance_loop(loop_index);
            self.schedule_window(input, sink, loop_index, beat);
        }
        self.dispatch_note_offs(input, sink);

        &self.just_scheduled
    }

    fn advance_loop(&mut self, loop_index: i64) {
        let epsilon = self.config.beat_epsilon;
        match self.window_loop {
            None => self.window_loop = Some(loop_index),
            Some(prev) if loop_index > prev => {
                self.window_loop = Some(loop_index);
                self.last_scheduled_beat = -epsilon;
                // Keys more than one loop stale can never match again.
                self.scheduled.retain(|&(_, _, l)| l >= loop_index - 1);
                let stale = loop_index - 1;
                self.in_flight.retain(|n| !(n.off_sent && n.loop_index < stale));
            }
            Some(prev) if loop_index < prev => {
                log::debug!("scheduler: loop went backwards ({prev} -> {loop_index}), resyncing");
                self.window_loop = Some(loop_index);
                self.last_scheduled_beat = -epsilon;
                self.scheduled.clear();
            }
            Some(_) => {}
        }
    }

    fn schedule_window(
        &mut self,
        input: &TickInput<'_>,
        sink: &mut dyn VoiceSink,
        loop_index: i64,
        beat: f64,
    ) {
        let total = input.clock.total_beats();
        let lookahead = (self.config.lookahead_seconds / input.clock.seconds_per_beat()).min(total);
        let from = self.last_scheduled_beat;
        let to = beat + lookahead;
        if to <= from {
            return;
        }

        self.schedule_range(input, sink, from, to.min(total), loop_index);
        if to > total {
            let wrap_from = (from - total).max(-self.config.beat_epsilon);
            self.schedule_range(input, sink, wrap_from, to - total, loop_index + 1);
        }
        self.last_scheduled_beat = to;
    }

    fn schedule_range(
        &mut self,
        input: &TickInput<'_>,
        sink: &mut dyn VoiceSink,
        from: f64,
        to: f64,
        loop_index: i64,
    ) {
        if to <= from {
            return;
        }
        let clock = input.clock;

        for track in input.tracks {
            if track.muted || input.solo.is_some_and(|solo| solo != track.id) {
                continue;
            }
            let Some(instrument) = input.instruments.get(track.instrument) else {
                continue;
            };

            for (event_id, event) in track.events_in_window(from, to) {
                if event.is_held() || event.beat_time >= clock.total_beats() {
                    continue;
                }
                let key = (track.id, event_id, loop_index);
                if !self.scheduled.insert(key) {
                    continue;
                }

                let on_time = clock.dsp_time_for_beat_in_loop(event.beat_time, loop_index);
                let lateness = input.now - on_time;
                if lateness > self.config.late_tolerance_seconds {
                    self.stats.dropped_late += 1;
                    log::debug!(
                        "dropping late note: track {} beat {:.3} loop {} ({:.0} ms late)",
                        track.id.0,
                        event.beat_time,
                        loop_index,
                        lateness * 1000.0
                    );
                    continue;
                }
                let start_time = if lateness > 0.0 {
                    input.now + self.config.late_snap_seconds
                } else {
                    on_time
                };
                let note_off_time =
                    (on_time + clock.beats_to_seconds(event.duration)).max(start_time);

                match instrument.schedule_note(
                    sink,
                    track.id.0,
                    event.pitch,
                    event.velocity,
                    track.volume,
                    start_time,
                ) {
                    Ok(handle) => {
                        let note = ScheduledNote {
                            track: track.id,
                            event: event_id,
                            loop_index,
                            pitch: event.pitch,
                            instrument: track.instrument,
                            handle,
                            start_time,
                            note_off_time,
                            off_sent: false,
                        };
                        self.stats.scheduled += 1;
                        self.in_flight.push(note);
                        self.just_scheduled.push(note);
                        log::trace!(
                            "scheduled track {} pitch {} at {:.4}s (loop {})",
                            track.id.0,
                            event.pitch,
                            start_time,
                            loop_index
                        );
                    }
                    Err(e) => {
                        self.stats.dropped_voice += 1;
                        log::debug!("note dropped on track {}: {e}", track.id.0);
                    }
                }
            }
        }
    }

    fn dispatch_note_offs(&mut self, input: &TickInput<'_>, sink: &mut dyn VoiceSink) {
        let horizon = input.now + self.config.note_off_lookahead_seconds;
        let stats = &mut self.stats;

        self.in_flight.retain_mut(|note| {
            if !sink.is_valid(note.handle) {
                return false;
            }
            if note.off_sent || note.note_off_time > horizon {
                return true;
            }

            let instrument = input.instruments.get(note.instrument);
            if instrument.is_some_and(|i| i.is_one_shot()) {
                note.off_sent = true;
                return true;
            }

            if note.note_off_time < input.now {
                sink.stop_note_immediate(note.handle);
                stats.forced_stops += 1;
                return false;
            }

            match instrument {
                Some(instrument) => {
                    instrument.schedule_note_off(sink, note.handle, note.note_off_time)
                }
                None => sink.schedule_stop(note.handle, note.note_off_time, DEFAULT_RELEASE_SECONDS),
            }
            stats.note_offs += 1;
            note.off_sent = true;
            true
        });
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Loop index and in-loop beat for scheduling.
///
/// Unlike [`TempoClock::position`] this also answers during count-in and
/// before `play_start`, as loop 0 with a negative beat, so the head of
/// the song can be committed ahead of time.
fn window_position(clock: &TempoClock, now: f64) -> Option<(i64, f64)> {
    let elapsed = clock.elapsed_beats(now)?;
    if elapsed < 0.0 {
        return Some((0, elapsed));
    }
    let total = clock.total_beats();
    let loop_index = libm::floor(elapsed / total);
    let beat = elapsed - loop_index * total;
    if beat >= total {
        return Some((loop_index as i64 + 1, 0.0));
    }
    Some((loop_index as i64, beat))
}
