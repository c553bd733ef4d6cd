//! Headless loop station controller.
//!
//! Owns the transport, the tracks and the control side of the mixer.
//! A host calls [`LoopStation::update`] once per frame of its own loop;
//! everything time-dependent in that tick reads the audio clock once.

use std::sync::Arc;

use ls_audio::{AudioOutput, CpalOutput};
use ls_engine::{
    create_mixer, AudioClock, CacheStats, ClockEvent, EventScheduler, FrameClock, Instrument,
    InstrumentRack, Metronome, MetronomeConfig, MixerRenderer, MixerStats, SampleCache,
    SampleLoader, SchedulerStats, TempoClock, TickInput, TransportState, VoiceHandle, VoiceMixer,
    VoiceSink,
};
use ls_ir::{InstrumentKind, NoteEvent, Sample, Song, Track, TrackId};

use crate::config::StationConfig;
use crate::error::StationError;
use crate::events::{CueList, ListenerId, Listeners, StationEvent};
use crate::recorder::{LiveNote, Recorder, Take};

/// Voice tag source for live notes played with no armed track.
pub const LIVE_SOURCE: u32 = u32::MAX - 1;

/// Snapshot for status displays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StationStats {
    pub state: TransportState,
    pub loop_index: i64,
    pub beat: f64,
    pub tracks: usize,
    pub live_notes: usize,
    pub pending_cues: usize,
    pub scheduler: SchedulerStats,
    pub mixer: MixerStats,
    pub cache: CacheStats,
}

pub struct LoopStation {
    config: StationConfig,
    clock: Box<dyn AudioClock>,
    tempo: TempoClock,
    tracks: Vec<Track>,
    next_track_id: u32,
    solo: Option<TrackId>,
    scheduler: EventScheduler,
    metronome: Metronome,
    mixer: VoiceMixer,
    samples: SampleCache,
    instruments: InstrumentRack,
    recorder: Recorder,
    live_instrument: InstrumentKind,
    listeners: Listeners,
    cues: CueList,
    clock_events: Vec<ClockEvent>,
    /// Audio-clock time cached by the last tick
    now: f64,
    degraded: bool,
}

impl LoopStation {
    /// Station around an existing mixer and clock.
    ///
    /// `clock` must be the time base `mixer` converts start times against.
    pub fn new(config: StationConfig, mixer: VoiceMixer, clock: Box<dyn AudioClock>) -> Self {
        let tempo = TempoClock::new(config.transport.tempo_settings());
        let scheduler = EventScheduler::new(config.scheduler.scheduler_config());
        let metronome = Metronome::new(config.metronome.metronome_config(), clock.sample_rate());
        let recorder = Recorder::new(config.recorder.recorder_config());
        let now = if clock.is_available() { clock.now() } else { 0.0 };

        Self {
            config,
            clock,
            tempo,
            tracks: Vec::new(),
            next_track_id: 0,
            solo: None,
            scheduler,
            metronome,
            mixer,
            samples: SampleCache::new(),
            instruments: InstrumentRack::new(),
            recorder,
            live_instrument: InstrumentKind::default(),
            listeners: Listeners::new(),
            cues: CueList::new(),
            clock_events: Vec::new(),
            now,
            degraded: false,
        }
    }

    /// Station driven by a [`FrameClock`] that the returned renderer
    /// advances. Used for offline bounce and tests.
    pub fn with_frame_clock(config: StationConfig) -> (Self, MixerRenderer) {
        let clock = FrameClock::new(config.sample_rate);
        let (mixer, renderer) = create_mixer(config.mixer.mixer_config(), clock.clone());
        (Self::new(config, mixer, Box::new(clock)), renderer)
    }

    /// Station playing through the default output device.
    ///
    /// The device's rate and channel count override the config.
    pub fn open_device(mut config: StationConfig) -> Result<(Self, CpalOutput), StationError> {
        let mut output = CpalOutput::new(Some(config.buffer_frames))?;
        config.sample_rate = output.sample_rate();
        config.mixer.output_channels = output.channels();

        let clock = FrameClock::new(config.sample_rate);
        let (mixer, renderer) = create_mixer(config.mixer.mixer_config(), clock.clone());
        output.build_stream(renderer)?;
        Ok((Self::new(config, mixer, Box::new(clock)), output))
    }

    // --- Tracks ---

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Mutable access for editing events. Notes added ahead of the
    /// playhead are picked up by the next tick.
    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn add_track(&mut self, name: &str, instrument: InstrumentKind) -> TrackId {
        self.add_track_with(Track::new(name, instrument))
    }

    /// Add a prebuilt track, assigning it a fresh id.
    pub fn add_track_with(&mut self, mut track: Track) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        track.id = id;
        log::debug!("track {} added: {} ({})", id.0, track.name, track.instrument.name());
        self.tracks.push(track);
        id
    }

    /// Remove a track, silencing its notes.
    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        let pos = self.tracks.iter().position(|t| t.id == id)?;
        self.scheduler.cancel_track(id, &mut self.mixer);
        self.cues.remove_track(id);
        self.forget_track(id);
        Some(self.tracks.remove(pos))
    }

    pub fn clear_tracks(&mut self) {
        self.scheduler.cancel_all(&mut self.mixer);
        self.cues.clear();
        let ids: Vec<TrackId> = self.tracks.iter().map(|t| t.id).collect();
        for id in ids {
            self.forget_track(id);
        }
        self.tracks.clear();
    }

    fn forget_track(&mut self, id: TrackId) {
        if self.solo == Some(id) {
            self.solo = None;
        }
        if self.recorder.armed() == Some(id) {
            self.listeners.emit(&StationEvent::RecordingChanged { track: None });
        }
        self.recorder.forget_track(id);
    }

    /// Replace the session with an imported song: stops playback, applies
    /// the song's tempo and loop shape and installs its tracks.
    pub fn load_song(&mut self, song: Song) {
        self.stop();
        self.clear_tracks();
        let info = song.info;
        self.set_tempo(info.bpm, info.beats_per_bar, info.bars);
        for track in song.tracks {
            self.add_track_with(track);
        }
        log::info!("loaded song '{}' ({} tracks)", info.name, self.tracks.len());
    }

    // --- Mix ---

    pub fn set_muted(&mut self, id: TrackId, muted: bool) -> bool {
        let Some(track) = self.track_mut(id) else {
            return false;
        };
        track.muted = muted;
        if muted {
            self.scheduler.cancel_track(id, &mut self.mixer);
            self.cues.remove_track(id);
        }
        true
    }

    /// Isolate one track, or clear isolation with `None`.
    pub fn set_solo(&mut self, solo: Option<TrackId>) -> bool {
        if solo.is_some_and(|id| self.track(id).is_none()) {
            return false;
        }
        self.solo = solo;
        if let Some(solo) = solo {
            let silenced: Vec<TrackId> =
                self.tracks.iter().map(|t| t.id).filter(|id| *id != solo).collect();
            for id in silenced {
                self.scheduler.cancel_track(id, &mut self.mixer);
                self.cues.remove_track(id);
            }
        }
        true
    }

    pub fn solo(&self) -> Option<TrackId> {
        self.solo
    }

    pub fn set_track_volume(&mut self, id: TrackId, volume: f32) -> bool {
        match self.track_mut(id) {
            Some(track) => {
                track.volume = volume.max(0.0);
                true
            }
            None => false,
        }
    }

    // --- Sounds ---

    /// Load a sample into the cache (no-op if already cached).
    pub fn preload_sample(
        &mut self,
        id: &str,
        loader: &dyn SampleLoader,
    ) -> Result<Arc<Sample>, StationError> {
        let key = self.samples.preload(id, loader)?;
        let stats = self.samples.stats();
        log::debug!("sample cache: {} samples, {} bytes", stats.count, stats.total_bytes);
        self.samples
            .get_by_key(key)
            .ok_or_else(|| ls_engine::CacheError::Empty { id: id.to_string() }.into())
    }

    pub fn samples(&self) -> &SampleCache {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut SampleCache {
        &mut self.samples
    }

    /// Install an instrument for every track of its kind.
    pub fn set_instrument(&mut self, instrument: Box<dyn Instrument>) {
        let kind = instrument.kind();
        if self.instruments.insert(instrument).is_some() {
            for id in self.tracks_of(kind) {
                self.scheduler.cancel_track(id, &mut self.mixer);
            }
        }
    }

    pub fn instruments(&self) -> &InstrumentRack {
        &self.instruments
    }

    /// Instrument used for live input while no track is armed.
    pub fn set_live_instrument(&mut self, kind: InstrumentKind) {
        self.live_instrument = kind;
    }

    pub fn set_metronome(&mut self, config: MetronomeConfig) {
        self.metronome.set_config(config);
    }

    fn tracks_of(&self, kind: InstrumentKind) -> Vec<TrackId> {
        self.tracks.iter().filter(|t| t.instrument == kind).map(|t| t.id).collect()
    }

    // --- Transport ---

    /// Change tempo and loop shape (clamped).
    ///
    /// While playing, in-flight notes are cut and scheduling restarts from
    /// the current beat under the new tempo.
    pub fn set_tempo(&mut self, bpm: f64, beats_per_bar: u32, bars: u32) {
        self.tempo.set_tempo(bpm, beats_per_bar, bars);
        if let Some(now) = self.read_clock() {
            if self.tempo.is_playing() {
                let beat = self.tempo.current_beat_precise(now);
                self.restart_scheduling(beat);
            }
        }
        self.dispatch_clock_events();
    }

    pub fn set_count_in(&mut self, enabled: bool, bars: u32) {
        self.tempo.set_count_in(enabled, bars);
    }

    /// Start playback (with count-in if enabled). Returns false if already
    /// running or the audio clock is unavailable.
    pub fn play(&mut self) -> bool {
        let Some(now) = self.read_clock() else {
            log::warn!("play ignored: audio clock unavailable");
            return false;
        };
        let start_beat = self.tempo.pending_seek().unwrap_or(0.0);
        if !self.tempo.play(now) {
            return false;
        }
        let start_beat = if self.tempo.is_counting_in() { 0.0 } else { start_beat };
        self.scheduler.resync(start_beat);
        self.metronome.reset();
        log::info!(
            "play at {:.3}s, first beat at {:.3}s",
            now,
            self.tempo.play_start()
        );
        self.dispatch_clock_events();
        true
    }

    /// Stop playback and silence every voice.
    pub fn stop(&mut self) -> bool {
        if !self.tempo.stop() {
            return false;
        }
        let now = self.read_clock().unwrap_or(self.now);
        self.finish_takes(now);
        self.scheduler.reset();
        self.metronome.reset();
        self.mixer.stop_all_notes();
        self.cues.clear();
        log::info!("stop");
        self.dispatch_clock_events();
        true
    }

    /// Move the playhead to `beat`. While stopped (or counting in) the
    /// position applies when playback starts.
    pub fn seek_to(&mut self, beat: f64) {
        let now = self.read_clock().unwrap_or(self.now);
        self.tempo.seek_to(beat, now);
        if self.tempo.is_playing() {
            let beat = self.tempo.current_beat_precise(now);
            self.restart_scheduling(beat);
        } else if self.tempo.is_counting_in() {
            // The pre-roll window may hold notes against the old anchor.
            // Count-in clicks keep their times.
            if let Some(target) = self.tempo.pending_seek() {
                self.scheduler.cancel_all(&mut self.mixer);
                self.scheduler.resync(target);
                self.cues.clear();
            }
        }
        log::debug!("seek to beat {:.3}", beat);
        self.dispatch_clock_events();
    }

    fn restart_scheduling(&mut self, beat: f64) {
        self.scheduler.cancel_all(&mut self.mixer);
        self.scheduler.resync(beat);
        self.metronome.reset();
        self.cues.clear();
    }

    // --- Control tick ---

    /// Run one control tick. Returns false when the audio clock is
    /// unavailable and nothing was done.
    pub fn update(&mut self) -> bool {
        let Some(now) = self.read_clock() else {
            return false;
        };
        self.now = now;

        let seek_after_count_in = if self.tempo.is_counting_in() {
            self.tempo.pending_seek()
        } else {
            None
        };
        self.tempo.update(now);
        if let Some(beat) = seek_after_count_in {
            if self.tempo.is_playing() {
                self.scheduler.resync(beat);
            }
        }
        self.dispatch_clock_events();

        // A seek pending behind the count-in moves the loop anchor when the
        // count-in ends; nothing can be committed against it before then.
        let anchored = !(self.tempo.is_counting_in() && self.tempo.pending_seek().is_some());
        if anchored {
            let input = TickInput {
                now,
                clock: &self.tempo,
                tracks: &self.tracks,
                solo: self.solo,
                instruments: &self.instruments,
            };
            for note in self.scheduler.tick(&input, &mut self.mixer) {
                self.cues.push(
                    note.start_time,
                    StationEvent::NoteStarted {
                        track: note.track,
                        pitch: note.pitch,
                        time: note.start_time,
                    },
                );
                self.cues.push(
                    note.note_off_time,
                    StationEvent::NoteEnded {
                        track: note.track,
                        pitch: note.pitch,
                        time: note.note_off_time,
                    },
                );
            }
        }

        let lookahead = self.scheduler.config().lookahead_seconds;
        self.metronome.tick(now, &self.tempo, lookahead, &mut self.mixer);
        self.cues.fire_due(now, &mut self.listeners);
        true
    }

    fn read_clock(&mut self) -> Option<f64> {
        if !self.clock.is_available() {
            if !self.degraded {
                log::warn!("audio clock unavailable, station idle");
                self.degraded = true;
            }
            return None;
        }
        if self.degraded {
            log::info!("audio clock available again");
            self.degraded = false;
        }
        Some(self.clock.now())
    }

    fn dispatch_clock_events(&mut self) {
        self.clock_events.extend(self.tempo.drain_events());
        for event in self.clock_events.drain(..) {
            let event = match event {
                ClockEvent::StateChanged(state) => StationEvent::PlayStateChanged(state),
                ClockEvent::CountInCompleted => StationEvent::CountInCompleted,
                ClockEvent::LoopCompleted { loop_index } => StationEvent::LoopCompleted { loop_index },
                ClockEvent::TempoChanged { bpm, beats_per_bar, bars } => {
                    StationEvent::TempoChanged { bpm, beats_per_bar, bars }
                }
                ClockEvent::Seeked { .. } => continue,
            };
            self.listeners.emit(&event);
        }
    }

    // --- Live input ---

    /// Play a note now through the armed track's instrument (or the live
    /// instrument when nothing is armed). While playing, the note is also
    /// recorded into the armed track as a held event.
    pub fn note_on(&mut self, pitch: u8, velocity: f32) -> Option<VoiceHandle> {
        let Some(now) = self.read_clock() else {
            return None;
        };
        if let Some(previous) = self.recorder.release(pitch) {
            self.finish_live_note(previous, now);
        }

        let armed = self
            .recorder
            .armed()
            .and_then(|id| self.track(id))
            .map(|t| (t.id, t.instrument));
        let (source, kind) = match armed {
            Some((id, kind)) => (id.0, kind),
            None => (LIVE_SOURCE, self.live_instrument),
        };

        let handle = match self.instruments.get(kind) {
            Some(instrument) => instrument
                .play_note_now(&mut self.mixer, source, pitch, velocity)
                .map_err(|e| log::debug!("live note {} dropped: {e}", pitch))
                .ok(),
            None => {
                log::debug!("live note {} dropped: no {} instrument", pitch, kind.name());
                None
            }
        };

        let take = armed.and_then(|(track, _)| self.record_press(track, pitch, velocity, now));
        self.recorder.press(pitch, LiveNote { instrument: kind, handle, take });
        handle
    }

    /// Release a live note. Returns false if the key was not down.
    pub fn note_off(&mut self, pitch: u8) -> bool {
        let now = self.read_clock().unwrap_or(self.now);
        match self.recorder.release(pitch) {
            Some(note) => {
                self.finish_live_note(note, now);
                true
            }
            None => false,
        }
    }

    fn record_press(&mut self, track: TrackId, pitch: u8, velocity: f32, now: f64) -> Option<Take> {
        let (loop_index, beat) = self.tempo.position(now)?;
        let placement = self.recorder.place(loop_index, beat, self.tempo.total_beats());
        let event = self.track_mut(track)?.insert(NoteEvent::held(placement.beat, pitch, velocity));
        // The key already sounded live; the loop replays it from the next pass.
        self.scheduler.mark_scheduled(track, event, placement.loop_index);
        log::debug!(
            "recorded pitch {} on track {} at beat {:.3}",
            pitch,
            track.0,
            placement.beat
        );
        Some(Take { track, event, pressed_at: now })
    }

    fn finish_live_note(&mut self, note: LiveNote, now: f64) {
        if let Some(handle) = note.handle {
            match self.instruments.get(note.instrument) {
                Some(instrument) => instrument.stop_note(&mut self.mixer, handle, now),
                None => self.mixer.stop_note_immediate(handle),
            }
        }
        if let Some(take) = note.take {
            let held = self.tempo.seconds_to_beats(now - take.pressed_at);
            let duration = self.recorder.note_duration(held, self.tempo.total_beats());
            if let Some(track) = self.track_mut(take.track) {
                track.finalize(take.event, duration);
            }
        }
    }

    fn finish_takes(&mut self, now: f64) {
        for (_, note) in self.recorder.release_all() {
            self.finish_live_note(note, now);
        }
    }

    /// Record live input into `track`.
    pub fn arm_recording(&mut self, track: TrackId) -> Result<(), StationError> {
        if self.track(track).is_none() {
            return Err(StationError::UnknownTrack(track.0));
        }
        if self.recorder.arm(track) {
            log::info!("recording armed on track {}", track.0);
            self.listeners.emit(&StationEvent::RecordingChanged { track: Some(track) });
        }
        Ok(())
    }

    pub fn disarm_recording(&mut self) {
        if self.recorder.disarm().is_some() {
            log::info!("recording disarmed");
            self.listeners.emit(&StationEvent::RecordingChanged { track: None });
        }
    }

    pub fn armed_track(&self) -> Option<TrackId> {
        self.recorder.armed()
    }

    // --- Observers ---

    pub fn subscribe(&mut self, listener: impl FnMut(&StationEvent) + Send + 'static) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // --- Queries ---

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn tempo(&self) -> &TempoClock {
        &self.tempo
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> TransportState {
        self.tempo.state()
    }

    pub fn is_available(&self) -> bool {
        self.clock.is_available()
    }

    /// Audio-clock time of the last tick.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Beat inside the loop as of the last tick.
    pub fn current_beat(&self) -> f64 {
        self.tempo.current_beat_precise(self.now)
    }

    pub fn current_loop(&self) -> i64 {
        self.tempo.current_loop(self.now)
    }

    pub fn stats(&self) -> StationStats {
        StationStats {
            state: self.tempo.state(),
            loop_index: self.current_loop(),
            beat: self.current_beat(),
            tracks: self.tracks.len(),
            live_notes: self.recorder.live_count(),
            pending_cues: self.cues.len(),
            scheduler: self.scheduler.stats(),
            mixer: self.mixer.stats(),
            cache: self.samples.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ls_engine::{DrumKit, ManualClock, MixerConfig, SampledKeys};
    use ls_ir::SongInfo;
    use std::sync::Mutex;

    const BLOCK: usize = 480;

    fn config() -> StationConfig {
        let mut config = StationConfig::default();
        config.metronome.enabled = false;
        config
    }

    fn tone() -> Arc<Sample> {
        Arc::new(Sample::mono("tone", 48_000, vec![0.25; 48_000]))
    }

    fn station_with(config: StationConfig) -> (LoopStation, MixerRenderer) {
        let (mut station, renderer) = LoopStation::with_frame_clock(config);
        station.set_instrument(Box::new(SampledKeys::new(InstrumentKind::Keys, tone(), 60)));
        station.set_instrument(Box::new(DrumKit::new().with_pad(36, tone())));
        (station, renderer)
    }

    fn station() -> (LoopStation, MixerRenderer) {
        station_with(config())
    }

    /// Alternate control ticks and render blocks for `seconds`.
    fn run(station: &mut LoopStation, renderer: &mut MixerRenderer, seconds: f64) {
        let mut out = vec![0.0f32; BLOCK * 2];
        let blocks = (seconds * 48_000.0 / BLOCK as f64).ceil() as usize;
        for _ in 0..blocks {
            station.update();
            renderer.render(&mut out);
        }
    }

    fn collect(station: &mut LoopStation) -> Arc<Mutex<Vec<StationEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        station.subscribe(move |e| sink.lock().unwrap().push(*e));
        log
    }

    fn note_starts(log: &Mutex<Vec<StationEvent>>) -> Vec<f64> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StationEvent::NoteStarted { time, .. } => Some(*time),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn scheduled_note_starts_on_its_beat() {
        let (mut station, mut renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.track_mut(track).unwrap().insert(NoteEvent::new(0.0, 60, 1.0, 1.0));
        station.track_mut(track).unwrap().insert(NoteEvent::new(2.0, 64, 1.0, 1.0));
        let log = collect(&mut station);

        assert!(station.play());
        let start = station.tempo().play_start();
        run(&mut station, &mut renderer, 2.0);

        let starts = note_starts(&log);
        assert_eq!(starts.len(), 2);
        assert!((starts[0] - start).abs() < 1e-9);
        assert!((starts[1] - (start + 1.0)).abs() < 1e-9);
        assert_eq!(station.stats().scheduler.scheduled, 2);
        assert_eq!(station.stats().mixer.started, 2);
    }

    #[test]
    fn loop_repeats_and_reports_completion() {
        let mut config = config();
        config.transport.bpm = 240.0;
        config.transport.bars = 1;
        let (mut station, mut renderer) = station_with(config);
        let track = station.add_track("drums", InstrumentKind::Drums);
        station.track_mut(track).unwrap().insert(NoteEvent::new(0.0, 36, 1.0, 0.5));
        let log = collect(&mut station);

        station.play();
        // 1 s loops: beat 0 at 0.1, 1.1, 2.1
        run(&mut station, &mut renderer, 2.5);

        assert_eq!(note_starts(&log).len(), 3);
        let completed = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, StationEvent::LoopCompleted { .. }))
            .count();
        assert_eq!(completed, 2);
    }

    #[test]
    fn stop_silences_and_notifies() {
        let (mut station, mut renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.track_mut(track).unwrap().insert(NoteEvent::new(0.0, 60, 1.0, 8.0));
        let log = collect(&mut station);

        station.play();
        run(&mut station, &mut renderer, 0.5);
        assert_eq!(renderer.active_voices(), 1);

        assert!(station.stop());
        assert!(!station.stop());
        run(&mut station, &mut renderer, 0.1);
        assert_eq!(renderer.active_voices(), 0);
        assert_eq!(station.stats().pending_cues, 0);
        assert_eq!(
            log.lock().unwrap().last(),
            Some(&StationEvent::PlayStateChanged(TransportState::Stopped))
        );
    }

    #[test]
    fn seek_while_playing_schedules_from_new_beat() {
        let (mut station, mut renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.track_mut(track).unwrap().insert(NoteEvent::new(8.0, 67, 1.0, 1.0));
        let log = collect(&mut station);

        station.play();
        run(&mut station, &mut renderer, 0.5);
        assert!(note_starts(&log).is_empty());

        station.seek_to(8.0);
        let seek_time = station.tempo().play_start() + 8.0 * 0.5;
        run(&mut station, &mut renderer, 0.05);

        let starts = note_starts(&log);
        assert_eq!(starts.len(), 1);
        // at most one tick late, snapped forward
        assert!(starts[0] - seek_time < 0.02);
        assert!((station.current_beat() - 8.0).abs() < 0.2);
    }

    #[test]
    fn seek_while_stopped_applies_on_play() {
        let (mut station, mut renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.track_mut(track).unwrap().insert(NoteEvent::new(4.0, 60, 1.0, 1.0));
        station.track_mut(track).unwrap().insert(NoteEvent::new(2.0, 62, 1.0, 1.0));
        let log = collect(&mut station);

        station.seek_to(4.0);
        station.play();
        run(&mut station, &mut renderer, 0.5);

        let starts = note_starts(&log);
        assert_eq!(starts.len(), 1);
        assert!((starts[0] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn muted_and_unsoloed_tracks_are_silent() {
        let (mut station, mut renderer) = station();
        let a = station.add_track("a", InstrumentKind::Keys);
        let b = station.add_track("b", InstrumentKind::Keys);
        let c = station.add_track("c", InstrumentKind::Drums);
        station.track_mut(a).unwrap().insert(NoteEvent::new(0.0, 60, 1.0, 1.0));
        station.track_mut(b).unwrap().insert(NoteEvent::new(0.0, 62, 1.0, 1.0));
        station.track_mut(c).unwrap().insert(NoteEvent::new(0.0, 36, 1.0, 1.0));

        assert!(station.set_muted(a, true));
        assert!(station.set_solo(Some(b)));
        assert!(!station.set_solo(Some(TrackId(99))));
        let log = collect(&mut station);
        station.play();
        run(&mut station, &mut renderer, 0.3);

        let started: Vec<_> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StationEvent::NoteStarted { track, .. } => Some(*track),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![b]);
    }

    #[test]
    fn remove_track_clears_solo() {
        let (mut station, _renderer) = station();
        let a = station.add_track("a", InstrumentKind::Keys);
        station.set_solo(Some(a));
        assert!(station.remove_track(a).is_some());
        assert_eq!(station.solo(), None);
        assert!(station.remove_track(a).is_none());
    }

    #[test]
    fn load_song_applies_tempo_and_tracks() {
        let (mut station, _renderer) = station();
        station.add_track("old", InstrumentKind::Keys);
        let log = collect(&mut station);

        let mut song = Song::new(SongInfo::new("demo", 90.0, 3, 2));
        song.add_track(Track::with_events(
            "bass",
            InstrumentKind::Bass,
            [NoteEvent::new(0.0, 40, 1.0, 1.0)],
        ));
        song.add_track(Track::new("drums", InstrumentKind::Drums));
        station.load_song(song);

        assert_eq!(station.tracks().len(), 2);
        assert_eq!(station.tracks()[0].id, TrackId(1));
        assert_eq!(station.tempo().bpm(), 90.0);
        assert_eq!(station.tempo().total_beats(), 6.0);
        assert!(log.lock().unwrap().contains(&StationEvent::TempoChanged {
            bpm: 90.0,
            beats_per_bar: 3,
            bars: 2
        }));
    }

    #[test]
    fn count_in_then_playback() {
        let mut config = config();
        config.transport.count_in_enabled = true;
        let (mut station, mut renderer) = station_with(config);
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.track_mut(track).unwrap().insert(NoteEvent::new(0.0, 60, 1.0, 1.0));
        let log = collect(&mut station);

        station.play();
        assert_eq!(station.state(), TransportState::CountingIn);
        // 4 count-in beats at 120 bpm after the 0.1 s delay
        run(&mut station, &mut renderer, 2.2);

        assert_eq!(station.state(), TransportState::Playing);
        let log_events = log.lock().unwrap().clone();
        assert!(log_events.contains(&StationEvent::CountInCompleted));
        let starts = note_starts(&log);
        assert_eq!(starts.len(), 1);
        assert!((starts[0] - 2.1).abs() < 1e-9);
    }

    #[test]
    fn seek_late_in_count_in_drops_prerolled_notes() {
        let mut config = config();
        config.transport.count_in_enabled = true;
        let (mut station, mut renderer) = station_with(config);
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.track_mut(track).unwrap().insert(NoteEvent::new(0.0, 60, 1.0, 1.0));
        let log = collect(&mut station);

        station.play();
        // the window already covers beat 0 at 2.1 s
        run(&mut station, &mut renderer, 2.05);
        assert_eq!(station.state(), TransportState::CountingIn);
        assert_eq!(station.stats().mixer.allocated, 1);

        station.seek_to(4.0);
        run(&mut station, &mut renderer, 0.55);
        assert_eq!(station.state(), TransportState::Playing);
        assert!(note_starts(&log).is_empty());
        assert_eq!(renderer.active_voices(), 0);
        assert!((station.current_beat() - 5.0).abs() < 0.1);
    }

    #[test]
    fn metronome_clicks_during_count_in() {
        let mut config = StationConfig::default();
        config.transport.count_in_enabled = true;
        let (mut station, mut renderer) = station_with(config);
        station.play();
        run(&mut station, &mut renderer, 2.0);
        assert_eq!(station.stats().mixer.started, 4);
    }

    #[test]
    fn live_note_is_recorded_with_its_held_length() {
        let (mut station, mut renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        assert!(station.arm_recording(track).is_ok());
        assert!(station.arm_recording(TrackId(42)).is_err());

        station.play();
        run(&mut station, &mut renderer, 1.1);
        assert!(station.note_on(64, 0.8).is_some());
        assert!(station.track(track).unwrap().events()[0].is_held());

        // one beat at 120 bpm
        run(&mut station, &mut renderer, 0.5);
        assert!(station.note_off(64));
        assert!(!station.note_off(64));

        let event = station.track(track).unwrap().events()[0];
        assert_eq!(event.pitch, 64);
        assert!((event.beat_time - 2.0).abs() < 0.05);
        assert!((event.duration - 1.0).abs() < 0.05);
    }

    #[test]
    fn recorded_note_is_not_replayed_in_the_same_loop() {
        let mut config = config();
        config.recorder.quantize_beats = Some(1.0);
        let (mut station, mut renderer) = station_with(config);
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.arm_recording(track).unwrap();

        station.play();
        // beat 1.8; quantizes forward to beat 2, which the window has not reached
        run(&mut station, &mut renderer, 0.1 + 0.9);
        station.note_on(60, 1.0);
        station.note_off(60);
        let started = station.stats().mixer.started;

        run(&mut station, &mut renderer, 0.5);
        assert_eq!(station.stats().mixer.started, started);
        assert_eq!(station.track(track).unwrap().events()[0].beat_time, 2.0);
    }

    #[test]
    fn live_input_without_armed_track_only_plays() {
        let (mut station, _renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.play();
        assert!(station.note_on(60, 1.0).is_some());
        assert!(station.note_off(60));
        assert!(station.track(track).unwrap().is_empty());
    }

    #[test]
    fn recording_changes_are_announced() {
        let (mut station, _renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        let log = collect(&mut station);
        station.arm_recording(track).unwrap();
        station.arm_recording(track).unwrap();
        station.disarm_recording();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                StationEvent::RecordingChanged { track: Some(track) },
                StationEvent::RecordingChanged { track: None },
            ]
        );
    }

    #[test]
    fn unavailable_clock_degrades_to_idle() {
        let clock = ManualClock::new(48_000, 512);
        let (mixer, _renderer) = create_mixer(MixerConfig::default(), FrameClock::new(48_000));
        let mut station = LoopStation::new(config(), mixer, Box::new(clock.clone()));

        clock.set_available(false);
        assert!(!station.update());
        assert!(!station.play());
        assert_eq!(station.state(), TransportState::Stopped);
        assert_eq!(station.current_beat(), 0.0);

        clock.set_available(true);
        assert!(station.play());
        clock.advance(1.0);
        assert!(station.update());
        assert!(station.current_beat() > 1.0);
    }

    #[test]
    fn tempo_change_while_playing_restarts_window() {
        let (mut station, mut renderer) = station();
        let track = station.add_track("keys", InstrumentKind::Keys);
        station.track_mut(track).unwrap().insert(NoteEvent::new(0.0, 60, 1.0, 16.0));
        station.play();
        run(&mut station, &mut renderer, 0.3);
        assert_eq!(station.scheduler().in_flight().len(), 1);

        station.set_tempo(100.0, 4, 4);
        assert!(station.scheduler().in_flight().is_empty());
        assert_eq!(station.tempo().bpm(), 100.0);
    }
}
