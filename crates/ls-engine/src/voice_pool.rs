//! Voice slots: a control-side allocation table plus the audio-side pool.
//!
//! The control thread reserves slots in the shared [`SlotTable`] and ships
//! the voice through the command queue; the audio thread installs it into
//! the [`VoicePool`] at the same index and frees the slot when the voice
//! finishes. Neither side ever blocks on the other.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::voice::{Voice, VoiceHandle};

const SLOT_FREE: u8 = 0;
const SLOT_RESERVED: u8 = 1;
const SLOT_ACTIVE: u8 = 2;

#[derive(Debug, Default)]
struct SlotState {
    generation: AtomicU32,
    state: AtomicU8,
}

/// Slot states shared between the control and audio threads.
#[derive(Debug)]
pub struct SlotTable {
    slots: Box<[SlotState]>,
    dropped: AtomicU64,
    started: AtomicU64,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u16::MAX as usize);
        Self {
            slots: (0..capacity).map(|_| SlotState::default()).collect(),
            dropped: AtomicU64::new(0),
            started: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reserve a free slot (control thread only). Never blocks, never grows.
    pub fn reserve(&self) -> Option<VoiceHandle> {
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.state.load(Ordering::Acquire) == SLOT_FREE {
                let generation = slot.generation.load(Ordering::Relaxed).wrapping_add(1);
                slot.generation.store(generation, Ordering::Relaxed);
                slot.state.store(SLOT_RESERVED, Ordering::Release);
                self.started.fetch_add(1, Ordering::Relaxed);
                return Some(VoiceHandle::new(i as u16, generation));
            }
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Undo a reservation whose start command never reached the audio thread.
    pub fn cancel(&self, handle: VoiceHandle) {
        if self.is_valid(handle) {
            self.started.fetch_sub(1, Ordering::Relaxed);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.slots[handle.slot()].state.store(SLOT_FREE, Ordering::Release);
        }
    }

    /// True until the voice behind `handle` has finished.
    pub fn is_valid(&self, handle: VoiceHandle) -> bool {
        self.slots.get(handle.slot()).is_some_and(|slot| {
            slot.state.load(Ordering::Acquire) != SLOT_FREE
                && slot.generation.load(Ordering::Relaxed) == handle.generation()
        })
    }

    fn activate(&self, slot: usize) {
        self.slots[slot].state.store(SLOT_ACTIVE, Ordering::Release);
    }

    fn retire(&self, slot: usize) {
        self.slots[slot].state.store(SLOT_FREE, Ordering::Release);
    }

    /// Slots reserved or playing.
    pub fn allocated(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Relaxed) != SLOT_FREE)
            .count()
    }

    /// Slots the audio thread has picked up.
    pub fn active(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Relaxed) == SLOT_ACTIVE)
            .count()
    }

    /// Starts refused because every slot was taken (or the queue was full).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Voices successfully handed to the audio thread.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }
}

/// Audio-side voice storage, preallocated to the table's capacity.
pub struct VoicePool {
    voices: Vec<Option<Voice>>,
    table: Arc<SlotTable>,
}

impl VoicePool {
    pub fn new(table: Arc<SlotTable>) -> Self {
        Self {
            voices: (0..table.capacity()).map(|_| None).collect(),
            table,
        }
    }

    /// Install a voice into its reserved slot.
    pub fn start(&mut self, voice: Voice) {
        let slot = voice.handle.slot();
        if let Some(entry) = self.voices.get_mut(slot) {
            *entry = Some(voice);
            self.table.activate(slot);
        }
    }

    fn voice_mut(&mut self, handle: VoiceHandle) -> Option<&mut Voice> {
        self.voices
            .get_mut(handle.slot())
            .and_then(|v| v.as_mut())
            .filter(|v| v.handle == handle)
    }

    /// Schedule a fade-out; stale handles are ignored.
    pub fn stop_at(&mut self, handle: VoiceHandle, frame: u64, fade_frames: u32) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.stop_at(frame, fade_frames);
        }
    }

    /// Fade out every voice starting at `frame`.
    pub fn stop_all(&mut self, frame: u64, fade_frames: u32) {
        for voice in self.voices.iter_mut().flatten() {
            voice.stop_at(frame, fade_frames);
        }
    }

    /// Count of occupied slots.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_some()).count()
    }

    /// Render every voice into `out`, freeing those that finished.
    pub fn render_all(&mut self, out: &mut [f32], channels: usize, buffer_start: u64) {
        for (slot, entry) in self.voices.iter_mut().enumerate() {
            let finished = match entry {
                Some(voice) => !voice.render(out, channels, buffer_start),
                None => false,
            };
            if finished {
                *entry = None;
                self.table.retire(slot);
            }
        }
    }
}
