//! Observer interface: station events, listeners and timed cues.

use ls_engine::TransportState;
use ls_ir::TrackId;

/// Something listeners may want to react to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StationEvent {
    PlayStateChanged(TransportState),
    CountInCompleted,
    LoopCompleted { loop_index: i64 },
    TempoChanged { bpm: f64, beats_per_bar: u32, bars: u32 },
    /// A scheduled note reached its start time
    NoteStarted { track: TrackId, pitch: u8, time: f64 },
    /// A scheduled note reached its release time
    NoteEnded { track: TrackId, pitch: u8, time: f64 },
    /// The armed track changed (`None` when disarmed)
    RecordingChanged { track: Option<TrackId> },
}

/// Handle returned by [`Listeners::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&StationEvent) + Send>;

/// Registered event callbacks, called in subscription order.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&StationEvent) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn emit(&mut self, event: &StationEvent) {
        for (_, listener) in &mut self.entries {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An event to emit once the audio clock reaches `time`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cue {
    pub time: f64,
    pub event: StationEvent,
}

/// Pending cues ordered by time; equal times fire in insertion order.
#[derive(Clone, Debug, Default)]
pub struct CueList {
    cues: Vec<Cue>,
}

impl CueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: f64, event: StationEvent) {
        let pos = self.cues.partition_point(|c| c.time <= time);
        self.cues.insert(pos, Cue { time, event });
    }

    /// Emit and remove every cue at or before `now`. Returns how many fired.
    pub fn fire_due(&mut self, now: f64, listeners: &mut Listeners) -> usize {
        let due = self.cues.partition_point(|c| c.time <= now);
        for cue in self.cues.drain(..due) {
            listeners.emit(&cue.event);
        }
        due
    }

    /// Drop pending cues belonging to `track`.
    pub fn remove_track(&mut self, track: TrackId) {
        self.cues.retain(|cue| match cue.event {
            StationEvent::NoteStarted { track: t, .. } | StationEvent::NoteEnded { track: t, .. } => {
                t != track
            }
            _ => true,
        });
    }

    pub fn clear(&mut self) {
        self.cues.clear();
    }

    pub fn next_time(&self) -> Option<f64> {
        self.cues.first().map(|c| c.time)
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}
