//! Tracks: ordered note lists with mix settings.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::instrument::InstrumentKind;
use crate::note::NoteEvent;

/// Stable identity of a track inside a station.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u32);

/// Stable identity of an event inside its track.
///
/// Indices shift when notes are recorded into a playing loop; ids don't,
/// which is what the scheduler's dedup bookkeeping keys on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u32);

/// A track: note events sorted by beat time plus mix settings.
#[derive(Clone, Debug)]
pub struct Track {
    /// Identity assigned by the owning station
    pub id: TrackId,
    /// Display name
    pub name: ArrayString<32>,
    /// Instrument used to render the events
    pub instrument: InstrumentKind,
    /// Muted tracks are skipped by the scheduler
    pub muted: bool,
    /// Gain multiplier applied on top of note velocity
    pub volume: f32,
    events: Vec<NoteEvent>,
    ids: Vec<EventId>,
    next_event_id: u32,
}

impl Track {
    /// Create an empty track.
    pub fn new(name: &str, instrument: InstrumentKind) -> Self {
        let mut track = Self {
            id: TrackId::default(),
            name: ArrayString::new(),
            instrument,
            muted: false,
            volume: 1.0,
            events: Vec::new(),
            ids: Vec::new(),
            next_event_id: 0,
        };
        let _ = track.name.try_push_str(name);
        track
    }

    /// Create a track from a batch of events (importer path).
    pub fn with_events(
        name: &str,
        instrument: InstrumentKind,
        events: impl IntoIterator<Item = NoteEvent>,
    ) -> Self {
        let mut track = Self::new(name, instrument);
        for event in events {
            track.insert(event);
        }
        track
    }

    /// Insert an event keeping beat order; equal beat times keep insertion
    /// order. Returns the new event's id.
    pub fn insert(&mut self, event: NoteEvent) -> EventId {
        let pos = self.events.partition_point(|e| e.beat_time <= event.beat_time);
        let id = EventId(self.next_event_id);
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.events.insert(pos, event);
        self.ids.insert(pos, id);
        id
    }

    /// Remove an event by id.
    pub fn remove(&mut self, id: EventId) -> Option<NoteEvent> {
        let pos = self.position(id)?;
        self.ids.remove(pos);
        Some(self.events.remove(pos))
    }

    /// Remove all events.
    pub fn clear(&mut self) {
        self.events.clear();
        self.ids.clear();
    }

    /// Events in beat order.
    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    /// Look up an event by id.
    pub fn get(&self, id: EventId) -> Option<&NoteEvent> {
        self.position(id).map(|pos| &self.events[pos])
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the track holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate `(id, event)` pairs whose beat time lies in the half-open
    /// window `(from, to]`.
    pub fn events_in_window(
        &self,
        from: f64,
        to: f64,
    ) -> impl Iterator<Item = (EventId, &NoteEvent)> + '_ {
        let start = self.events.partition_point(|e| e.beat_time <= from);
        let end = self.events.partition_point(|e| e.beat_time <= to).max(start);
        self.ids[start..end].iter().copied().zip(self.events[start..end].iter())
    }

    /// Most recently recorded held note with this pitch.
    pub fn find_held(&self, pitch: u8) -> Option<EventId> {
        self.events
            .iter()
            .zip(self.ids.iter())
            .filter(|(e, _)| e.pitch == pitch && e.is_held())
            .map(|(_, id)| *id)
            .last()
    }

    /// Patch the duration of a held note. Only the first call for a given
    /// note has an effect; finished notes are immutable.
    pub fn finalize(&mut self, id: EventId, duration: f64) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let event = &mut self.events[pos];
        if !event.is_held() || duration <= 0.0 {
            return false;
        }
        event.duration = duration;
        true
    }

    fn position(&self, id: EventId) -> Option<usize> {
        self.ids.iter().position(|i| *i == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(events: &[NoteEvent]) -> Track {
        Track::with_events("t", InstrumentKind::Keys, events.iter().copied())
    }

    #[test]
    fn insert_keeps_beat_order() {
        let track = keys(&[
            NoteEvent::new(3.0, 60, 1.0, 1.0),
            NoteEvent::new(1.0, 62, 1.0, 1.0),
            NoteEvent::new(2.0, 64, 1.0, 1.0),
        ]);
        let beats: Vec<f64> = track.events().iter().map(|e| e.beat_time).collect();
        assert_eq!(beats, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn equal_beats_keep_insertion_order() {
        let track = keys(&[
            NoteEvent::new(1.0, 60, 1.0, 1.0),
            NoteEvent::new(1.0, 64, 1.0, 1.0),
        ]);
        assert_eq!(track.events()[0].pitch, 60);
        assert_eq!(track.events()[1].pitch, 64);
    }

    #[test]
    fn ids_survive_insertions() {
        let mut track = keys(&[NoteEvent::new(2.0, 60, 1.0, 1.0)]);
        let first = EventId(0);
        track.insert(NoteEvent::new(0.5, 72, 1.0, 1.0));
        assert_eq!(track.get(first).unwrap().pitch, 60);
    }

    #[test]
    fn window_is_open_closed() {
        let track = keys(&[
            NoteEvent::new(0.0, 60, 1.0, 1.0),
            NoteEvent::new(1.5, 62, 1.0, 1.0),
            NoteEvent::new(3.75, 64, 1.0, 1.0),
        ]);
        let hits: Vec<u8> = track.events_in_window(0.0, 1.5).map(|(_, e)| e.pitch).collect();
        assert_eq!(hits, vec![62]);
        let hits: Vec<u8> = track.events_in_window(-0.001, 0.0).map(|(_, e)| e.pitch).collect();
        assert_eq!(hits, vec![60]);
    }

    #[test]
    fn empty_window_when_reversed() {
        let track = keys(&[NoteEvent::new(1.0, 60, 1.0, 1.0)]);
        assert_eq!(track.events_in_window(2.0, 0.5).count(), 0);
    }

    #[test]
    fn finalize_only_once() {
        let mut track = Track::new("rec", InstrumentKind::Keys);
        let id = track.insert(NoteEvent::held(1.0, 60, 0.9));
        assert_eq!(track.find_held(60), Some(id));
        assert!(track.finalize(id, 0.5));
        assert!(!track.finalize(id, 2.0));
        assert_eq!(track.get(id).unwrap().duration, 0.5);
        assert_eq!(track.find_held(60), None);
    }

    #[test]
    fn remove_by_id() {
        let mut track = keys(&[NoteEvent::new(1.0, 60, 1.0, 1.0)]);
        assert!(track.remove(EventId(0)).is_some());
        assert!(track.is_empty());
        assert!(track.remove(EventId(0)).is_none());
    }
}
