//! Instruments: thin front-ends that turn (pitch, velocity) into voices.
//!
//! An instrument only decides *which* sample plays and at what pitch
//! ratio and gain; timing and mixing stay with the scheduler and the
//! mixer. The default-implemented methods on [`Instrument`] are the
//! note-on/note-off capability the scheduler and recorder call.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use ls_ir::{InstrumentKind, Sample};

use crate::error::ScheduleError;
use crate::mixer::VoiceSink;
use crate::voice::{VoiceHandle, VoiceTag};

/// Default release fade for sustained instruments.
pub const DEFAULT_RELEASE_SECONDS: f64 = 0.05;

/// What an instrument wants played for one note.
#[derive(Clone, Debug)]
pub struct NoteVoice {
    pub sample: Arc<Sample>,
    pub pitch_ratio: f32,
    pub gain: f32,
}

/// A playable instrument.
pub trait Instrument: Send {
    fn kind(&self) -> InstrumentKind;

    /// Resolve a note to a sample, pitch ratio and gain.
    fn voice_for(&self, pitch: u8, velocity: f32) -> Option<NoteVoice>;

    /// Fade applied when a note is released.
    fn release_seconds(&self) -> f64 {
        DEFAULT_RELEASE_SECONDS
    }

    /// One-shot instruments ignore note-offs and let samples ring out.
    fn is_one_shot(&self) -> bool {
        false
    }

    /// Schedule a note to start at the audio-clock time `time`.
    ///
    /// `gain` scales the instrument's own velocity gain and is not
    /// clamped, so a track volume above 1.0 boosts the note.
    fn schedule_note(
        &self,
        sink: &mut dyn VoiceSink,
        source: u32,
        pitch: u8,
        velocity: f32,
        gain: f32,
        time: f64,
    ) -> Result<VoiceHandle, ScheduleError> {
        let voice = self
            .voice_for(pitch, velocity)
            .ok_or(ScheduleError::UnmappedPitch(pitch))?;
        sink.schedule_note(
            &voice.sample,
            time,
            voice.gain * gain,
            voice.pitch_ratio,
            VoiceTag::new(source, pitch),
        )
    }

    /// Schedule the release of a note started with `schedule_note`.
    fn schedule_note_off(&self, sink: &mut dyn VoiceSink, handle: VoiceHandle, time: f64) {
        if !self.is_one_shot() {
            sink.schedule_stop(handle, time, self.release_seconds());
        }
    }

    /// Start a note at the next buffer boundary (live input).
    fn play_note_now(
        &self,
        sink: &mut dyn VoiceSink,
        source: u32,
        pitch: u8,
        velocity: f32,
    ) -> Result<VoiceHandle, ScheduleError> {
        let voice = self
            .voice_for(pitch, velocity)
            .ok_or(ScheduleError::UnmappedPitch(pitch))?;
        sink.play_note_now(
            &voice.sample,
            voice.gain,
            voice.pitch_ratio,
            VoiceTag::new(source, pitch),
        )
    }

    /// Release a live note at `now`.
    fn stop_note(&self, sink: &mut dyn VoiceSink, handle: VoiceHandle, now: f64) {
        self.schedule_note_off(sink, handle, now);
    }
}

/// Pitch ratio that transposes `root` to `pitch` in equal temperament.
pub fn pitch_ratio(pitch: u8, root: u8) -> f32 {
    libm::powf(2.0, (pitch as f32 - root as f32) / 12.0)
}

/// A sample mapped over a pitch range, repitched from its root.
#[derive(Clone, Debug)]
pub struct KeyZone {
    pub low: u8,
    pub high: u8,
    pub root: u8,
    pub sample: Arc<Sample>,
}

impl KeyZone {
    pub fn contains(&self, pitch: u8) -> bool {
        (self.low..=self.high).contains(&pitch)
    }
}

/// Sustained, pitched sample playback (keys, bass, pads).
#[derive(Clone, Debug)]
pub struct SampledKeys {
    kind: InstrumentKind,
    zones: Vec<KeyZone>,
    gain: f32,
    release: f64,
}

impl SampledKeys {
    /// One sample covering the whole keyboard.
    pub fn new(kind: InstrumentKind, sample: Arc<Sample>, root: u8) -> Self {
        Self {
            kind,
            zones: alloc::vec![KeyZone {
                low: 0,
                high: 127,
                root,
                sample,
            }],
            gain: 1.0,
            release: DEFAULT_RELEASE_SECONDS,
        }
    }

    /// Multi-sample instrument; the first zone containing a pitch wins.
    pub fn with_zones(kind: InstrumentKind, zones: Vec<KeyZone>) -> Self {
        Self {
            kind,
            zones,
            gain: 1.0,
            release: DEFAULT_RELEASE_SECONDS,
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_release(mut self, seconds: f64) -> Self {
        self.release = seconds.max(0.0);
        self
    }
}

impl Instrument for SampledKeys {
    fn kind(&self) -> InstrumentKind {
        self.kind
    }

    fn voice_for(&self, pitch: u8, velocity: f32) -> Option<NoteVoice> {
        let zone = self.zones.iter().find(|z| z.contains(pitch))?;
        Some(NoteVoice {
            sample: zone.sample.clone(),
            pitch_ratio: pitch_ratio(pitch, zone.root),
            gain: velocity.clamp(0.0, 1.0) * self.gain,
        })
    }

    fn release_seconds(&self) -> f64 {
        self.release
    }
}

/// One-shot drum pads keyed by pitch.
#[derive(Clone, Debug)]
pub struct DrumKit {
    pads: BTreeMap<u8, Arc<Sample>>,
    gain: f32,
}

impl DrumKit {
    pub fn new() -> Self {
        Self {
            pads: BTreeMap::new(),
            gain: 1.0,
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_pad(mut self, pitch: u8, sample: Arc<Sample>) -> Self {
        self.set_pad(pitch, sample);
        self
    }

    pub fn set_pad(&mut self, pitch: u8, sample: Arc<Sample>) {
        self.pads.insert(pitch, sample);
    }

    pub fn pads(&self) -> impl Iterator<Item = u8> + '_ {
        self.pads.keys().copied()
    }
}

impl Default for DrumKit {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for DrumKit {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Drums
    }

    fn voice_for(&self, pitch: u8, velocity: f32) -> Option<NoteVoice> {
        self.pads.get(&pitch).map(|sample| NoteVoice {
            sample: sample.clone(),
            pitch_ratio: 1.0,
            gain: velocity.clamp(0.0, 1.0) * self.gain,
        })
    }

    fn is_one_shot(&self) -> bool {
        true
    }
}

/// Instruments by kind, shared by every track of that kind.
#[derive(Default)]
pub struct InstrumentRack {
    instruments: BTreeMap<InstrumentKind, Box<dyn Instrument>>,
}

impl InstrumentRack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an instrument under its own kind, replacing any previous one.
    pub fn insert(&mut self, instrument: Box<dyn Instrument>) -> Option<Box<dyn Instrument>> {
        self.instruments.insert(instrument.kind(), instrument)
    }

    pub fn remove(&mut self, kind: InstrumentKind) -> Option<Box<dyn Instrument>> {
        self.instruments.remove(&kind)
    }

    pub fn get(&self, kind: InstrumentKind) -> Option<&dyn Instrument> {
        self.instruments.get(&kind).map(|i| i.as_ref())
    }

    pub fn contains(&self, kind: InstrumentKind) -> bool {
        self.instruments.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = InstrumentKind> + '_ {
        self.instruments.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    fn sample(frames: usize) -> Arc<Sample> {
        Arc::new(Sample::mono("s", 48_000, vec![0.1; frames]))
    }

    #[test]
    fn pitch_ratio_is_equal_tempered() {
        assert_eq!(pitch_ratio(60, 60), 1.0);
        assert!((pitch_ratio(72, 60) - 2.0).abs() < 1e-6);
        assert!((pitch_ratio(48, 60) - 0.5).abs() < 1e-6);
        assert!((pitch_ratio(67, 60) - 1.498_307).abs() < 1e-5);
    }

    #[test]
    fn keys_repitch_from_root() {
        let keys = SampledKeys::new(InstrumentKind::Keys, sample(10), 60).with_gain(0.5);
        let voice = keys.voice_for(72, 0.8).unwrap();
        assert!((voice.pitch_ratio - 2.0).abs() < 1e-6);
        assert!((voice.gain - 0.4).abs() < 1e-6);
    }

    #[test]
    fn zones_pick_first_match() {
        let low = sample(1);
        let high = sample(2);
        let keys = SampledKeys::with_zones(
            InstrumentKind::Bass,
            vec![
                KeyZone { low: 0, high: 59, root: 48, sample: low },
                KeyZone { low: 60, high: 100, root: 72, sample: high },
            ],
        );
        assert_eq!(keys.voice_for(50, 1.0).unwrap().sample.len(), 1);
        assert_eq!(keys.voice_for(72, 1.0).unwrap().sample.len(), 2);
        assert!(keys.voice_for(120, 1.0).is_none());
    }

    #[test]
    fn keys_release_on_note_off() {
        let keys = SampledKeys::new(InstrumentKind::Keys, sample(10), 60).with_release(0.2);
        let mut sink = RecordingSink::default();
        let h = keys.schedule_note(&mut sink, 3, 64, 1.0, 1.0, 1.5).unwrap();
        keys.schedule_note_off(&mut sink, h, 2.0);
        assert_eq!(sink.starts[0].tag, VoiceTag::new(3, 64));
        assert_eq!(sink.starts[0].time, Some(1.5));
        assert_eq!(sink.stops, vec![(h, 2.0, 0.2)]);
    }

    #[test]
    fn gain_scales_past_velocity_clamp() {
        let keys = SampledKeys::new(InstrumentKind::Keys, sample(10), 60);
        let mut sink = RecordingSink::default();
        keys.schedule_note(&mut sink, 0, 60, 1.0, 2.0, 0.0).unwrap();
        keys.schedule_note(&mut sink, 0, 60, 0.5, 0.5, 0.0).unwrap();
        assert_eq!(sink.starts[0].gain, 2.0);
        assert_eq!(sink.starts[1].gain, 0.25);
    }

    #[test]
    fn drums_ignore_note_off() {
        let kit = DrumKit::new().with_pad(36, sample(10));
        let mut sink = RecordingSink::default();
        let h = kit.play_note_now(&mut sink, 0, 36, 1.0).unwrap();
        kit.stop_note(&mut sink, h, 1.0);
        assert!(sink.stops.is_empty());
        assert_eq!(sink.starts[0].time, None);
        assert_eq!(sink.starts[0].pitch_ratio, 1.0);
    }

    #[test]
    fn unmapped_pitch_is_an_error() {
        let kit = DrumKit::new().with_pad(36, sample(10));
        let mut sink = RecordingSink::default();
        assert_eq!(
            kit.schedule_note(&mut sink, 0, 40, 1.0, 1.0, 0.0),
            Err(ScheduleError::UnmappedPitch(40))
        );
        assert!(sink.starts.is_empty());
    }

    #[test]
    fn rack_lookup_by_kind() {
        let mut rack = InstrumentRack::new();
        rack.insert(Box::new(DrumKit::new()));
        rack.insert(Box::new(SampledKeys::new(InstrumentKind::Keys, sample(4), 60)));
        assert_eq!(rack.len(), 2);
        assert!(rack.get(InstrumentKind::Drums).unwrap().is_one_shot());
        assert!(rack.get(InstrumentKind::Synth).is_none());
        assert!(rack.remove(InstrumentKind::Keys).is_some());
        assert!(!rack.contains(InstrumentKind::Keys));
    }
}
