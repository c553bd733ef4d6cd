//! Test double for [`VoiceSink`]: records every call instead of mixing.

use alloc::sync::Arc;
use alloc::vec::Vec;
use ls_ir::Sample;

use crate::error::ScheduleError;
use crate::mixer::VoiceSink;
use crate::voice::{VoiceHandle, VoiceTag};

#[derive(Clone, Debug)]
pub struct StartCall {
    pub handle: VoiceHandle,
    /// `None` for `play_note_now`
    pub time: Option<f64>,
    pub gain: f32,
    pub pitch_ratio: f32,
    pub tag: VoiceTag,
    pub sample_len: usize,
}

#[derive(Default)]
pub struct RecordingSink {
    pub starts: Vec<StartCall>,
    pub stops: Vec<(VoiceHandle, f64, f64)>,
    pub immediate: Vec<VoiceHandle>,
    pub stop_all_calls: usize,
    /// Maximum live handles before `PoolExhausted`
    pub capacity: Option<usize>,
    finished: Vec<VoiceHandle>,
    next: u32,
}

impl RecordingSink {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Simulate the audio thread retiring a voice.
    pub fn finish(&mut self, handle: VoiceHandle) {
        if !self.finished.contains(&handle) {
            self.finished.push(handle);
        }
    }

    pub fn live(&self) -> usize {
        self.starts.len() - self.finished.len()
    }

    fn start(
        &mut self,
        sample: &Arc<Sample>,
        time: Option<f64>,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError> {
        if sample.is_empty() {
            return Err(ScheduleError::InvalidSample);
        }
        if self.capacity.is_some_and(|cap| self.live() >= cap) {
            return Err(ScheduleError::PoolExhausted);
        }
        self.next += 1;
        let handle = VoiceHandle::new(0, self.next);
        self.starts.push(StartCall {
            handle,
            time,
            gain,
            pitch_ratio,
            tag,
            sample_len: sample.len(),
        });
        Ok(handle)
    }
}

impl VoiceSink for RecordingSink {
    fn schedule_note(
        &mut self,
        sample: &Arc<Sample>,
        start_time: f64,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError> {
        self.start(sample, Some(start_time), gain, pitch_ratio, tag)
    }

    fn play_note_now(
        &mut self,
        sample: &Arc<Sample>,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError> {
        self.start(sample, None, gain, pitch_ratio, tag)
    }

    fn schedule_stop(&mut self, handle: VoiceHandle, stop_time: f64, fade_seconds: f64) {
        if self.is_valid(handle) {
            self.stops.push((handle, stop_time, fade_seconds));
        }
    }

    fn stop_note_immediate(&mut self, handle: VoiceHandle) {
        if self.is_valid(handle) {
            self.immediate.push(handle);
            self.finish(handle);
        }
    }

    fn stop_all_notes(&mut self) {
        self.stop_all_calls += 1;
        let handles: Vec<VoiceHandle> = self.starts.iter().map(|s| s.handle).collect();
        for handle in handles {
            self.finish(handle);
        }
    }

    fn is_valid(&self, handle: VoiceHandle) -> bool {
        self.starts.iter().any(|s| s.handle == handle) && !self.finished.contains(&handle)
    }
}
