//! Voice mixer: a control-side handle and an audio-side renderer.
//!
//! [`create_mixer`] splits the mixer in two. [`VoiceMixer`] lives on the
//! control thread, allocates voice slots and sends commands through a
//! lock-free ring buffer. [`MixerRenderer`] lives on the audio thread,
//! applies pending commands at each buffer boundary, sums active voices
//! into the output and advances the shared [`FrameClock`].
//!
//! The render path never locks, allocates or logs.

use alloc::sync::Arc;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use ls_ir::Sample;

use crate::clock::{AudioClock, FrameClock};
use crate::command::MixerCommand;
use crate::error::ScheduleError;
use crate::voice::{Voice, VoiceHandle, VoiceTag};
use crate::voice_pool::{SlotTable, VoicePool};

/// Output level above which the limiter starts compressing.
const LIMITER_KNEE: f32 = 0.9;

/// Mixer sizing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixerConfig {
    /// Maximum simultaneous voices
    pub max_voices: usize,
    /// Capacity of the control → audio command queue
    pub command_capacity: usize,
    /// Fade used for immediate stops, in seconds
    pub forced_fade_seconds: f64,
    /// Interleaved output channels
    pub output_channels: u16,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            max_voices: 64,
            command_capacity: 1024,
            forced_fade_seconds: 0.005,
            output_channels: 2,
        }
    }
}

/// Snapshot of mixer occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MixerStats {
    pub max_voices: usize,
    /// Slots reserved or playing
    pub allocated: usize,
    /// Slots the audio thread is rendering
    pub active: usize,
    /// Voices handed to the audio thread since creation
    pub started: u64,
    /// Starts refused (pool exhausted or queue full)
    pub dropped: u64,
}

/// Anything that can play scheduled voices.
///
/// Implemented by [`VoiceMixer`]; tests substitute counting doubles.
pub trait VoiceSink {
    /// Start `sample` at the audio-clock time `start_time`.
    fn schedule_note(
        &mut self,
        sample: &Arc<Sample>,
        start_time: f64,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError>;

    /// Start `sample` at the next buffer boundary.
    fn play_note_now(
        &mut self,
        sample: &Arc<Sample>,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError>;

    /// Fade the voice out over `fade_seconds`, starting at `stop_time`.
    /// Stale handles are ignored.
    fn schedule_stop(&mut self, handle: VoiceHandle, stop_time: f64, fade_seconds: f64);

    /// Stop the voice at the next buffer boundary with a short fade.
    fn stop_note_immediate(&mut self, handle: VoiceHandle);

    /// Fade out every voice.
    fn stop_all_notes(&mut self);

    /// True until the voice behind `handle` has finished.
    fn is_valid(&self, handle: VoiceHandle) -> bool;
}

/// Create a connected mixer pair sharing `clock`.
pub fn create_mixer(config: MixerConfig, clock: FrameClock) -> (VoiceMixer, MixerRenderer) {
    let table = Arc::new(SlotTable::new(config.max_voices));
    let rb = HeapRb::<MixerCommand>::new(config.command_capacity.max(1));
    let (producer, consumer) = rb.split();
    let forced_fade_frames = clock.frame_for_time(config.forced_fade_seconds) as u32;

    let mixer = VoiceMixer {
        producer,
        table: table.clone(),
        clock: clock.clone(),
    };
    let renderer = MixerRenderer {
        consumer,
        pool: VoicePool::new(table),
        clock,
        forced_fade_frames,
        channels: config.output_channels.max(1) as usize,
    };
    (mixer, renderer)
}

/// Control-thread side of the mixer.
pub struct VoiceMixer {
    producer: HeapProd<MixerCommand>,
    table: Arc<SlotTable>,
    clock: FrameClock,
}

impl VoiceMixer {
    /// The clock the renderer advances.
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn stats(&self) -> MixerStats {
        MixerStats {
            max_voices: self.table.capacity(),
            allocated: self.table.allocated(),
            active: self.table.active(),
            started: self.table.started(),
            dropped: self.table.dropped(),
        }
    }

    fn start_voice(
        &mut self,
        sample: &Arc<Sample>,
        start_frame: Option<u64>,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError> {
        if !self.clock.is_available() {
            return Err(ScheduleError::Unavailable);
        }
        // a zero rate would leave the cursor parked and the voice alive forever
        if sample.is_empty()
            || sample.sample_rate == 0
            || !(pitch_ratio > 0.0 && pitch_ratio.is_finite())
        {
            return Err(ScheduleError::InvalidSample);
        }

        let handle = self.table.reserve().ok_or(ScheduleError::PoolExhausted)?;
        let mut voice = Voice::new(
            sample.clone(),
            handle,
            tag,
            gain,
            pitch_ratio,
            self.clock.sample_rate(),
        );
        voice.start_frame = start_frame;

        if self.producer.try_push(MixerCommand::Start(voice)).is_err() {
            self.table.cancel(handle);
            return Err(ScheduleError::QueueFull);
        }
        Ok(handle)
    }

    fn send(&mut self, command: MixerCommand) {
        if self.producer.try_push(command).is_err() {
            log::warn!("mixer command queue full, dropping stop command");
        }
    }
}

impl VoiceSink for VoiceMixer {
    fn schedule_note(
        &mut self,
        sample: &Arc<Sample>,
        start_time: f64,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError> {
        let frame = self.clock.frame_for_time(start_time);
        self.start_voice(sample, Some(frame), gain, pitch_ratio, tag)
    }

    fn play_note_now(
        &mut self,
        sample: &Arc<Sample>,
        gain: f32,
        pitch_ratio: f32,
        tag: VoiceTag,
    ) -> Result<VoiceHandle, ScheduleError> {
        self.start_voice(sample, None, gain, pitch_ratio, tag)
    }

    fn schedule_stop(&mut self, handle: VoiceHandle, stop_time: f64, fade_seconds: f64) {
        if !self.table.is_valid(handle) {
            return;
        }
        let frame = self.clock.frame_for_time(stop_time);
        let fade_frames = self.clock.frame_for_time(fade_seconds) as u32;
        self.send(MixerCommand::StopAt {
            handle,
            frame,
            fade_frames,
        });
    }

    fn stop_note_immediate(&mut self, handle: VoiceHandle) {
        if self.table.is_valid(handle) {
            self.send(MixerCommand::StopNow { handle });
        }
    }

    fn stop_all_notes(&mut self) {
        self.send(MixerCommand::StopAll);
    }

    fn is_valid(&self, handle: VoiceHandle) -> bool {
        self.table.is_valid(handle)
    }
}

/// Audio-thread side of the mixer.
pub struct MixerRenderer {
    consumer: HeapCons<MixerCommand>,
    pool: VoicePool,
    clock: FrameClock,
    forced_fade_frames: u32,
    channels: usize,
}

impl MixerRenderer {
    /// Interleaved channel count `render` expects.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Match the device's channel layout. Call before the stream starts.
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels.max(1);
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    /// Fill one interleaved output buffer and advance the clock by its
    /// frame count.
    pub fn render(&mut self, out: &mut [f32]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_inner(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_inner(out);
    }

    fn render_inner(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = self.channels;
        let frames = out.len() / channels;
        let buffer_start = self.clock.frames();

        while let Some(command) = self.consumer.try_pop() {
            match command {
                MixerCommand::Start(voice) => self.pool.start(voice),
                MixerCommand::StopAt {
                    handle,
                    frame,
                    fade_frames,
                } => self.pool.stop_at(handle, frame, fade_frames),
                MixerCommand::StopNow { handle } => {
                    self.pool.stop_at(handle, buffer_start, self.forced_fade_frames)
                }
                MixerCommand::StopAll => self.pool.stop_all(buffer_start, self.forced_fade_frames),
            }
        }

        self.pool.render_all(out, channels, buffer_start);
        for sample in out.iter_mut() {
            *sample = limit(*sample);
        }
        self.clock.advance(frames as u32);
    }
}

/// Soft-knee limiter followed by a hard clip at ±1.
///
/// Below the knee the signal passes untouched; above it the excess is
/// compressed asymptotically towards full scale with a continuous slope.
pub fn limit(x: f32) -> f32 {
    let magnitude = if x < 0.0 { -x } else { x };
    if magnitude <= LIMITER_KNEE {
        return x;
    }
    if !magnitude.is_finite() {
        return if x.is_nan() {
            0.0
        } else if x > 0.0 {
            1.0
        } else {
            -1.0
        };
    }
    let over = (magnitude - LIMITER_KNEE) / (1.0 - LIMITER_KNEE);
    let y = (LIMITER_KNEE + (1.0 - LIMITER_KNEE) * over / (1.0 + over)).min(1.0);
    if x < 0.0 {
        -y
    } else {
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 48_000;

    fn setup(max_voices: usize) -> (VoiceMixer, MixerRenderer) {
        let config = MixerConfig {
            max_voices,
            command_capacity: 64,
            ..Default::default()
        };
        create_mixer(config, FrameClock::new(RATE))
    }

    fn dc(level: f32, frames: usize) -> Arc<Sample> {
        Arc::new(Sample::mono("dc", RATE, vec![level; frames]))
    }

    fn render(renderer: &mut MixerRenderer, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * renderer.channels()];
        renderer.render(&mut out);
        out
    }

    fn first_nonzero_frame(out: &[f32]) -> Option<usize> {
        out.iter().position(|&s| s != 0.0).map(|i| i / 2)
    }

    #[test]
    fn render_advances_clock() {
        let (mixer, mut renderer) = setup(4);
        render(&mut renderer, 256);
        render(&mut renderer, 256);
        assert_eq!(mixer.clock().frames(), 512);
        assert_eq!(mixer.clock().buffer_size_frames(), 256);
        assert!((mixer.clock().now() - 512.0 / RATE as f64).abs() < 1e-12);
    }

    #[test]
    fn scheduled_start_is_sample_accurate() {
        let (mut mixer, mut renderer) = setup(4);
        let sample = dc(0.5, 10_000);
        let start = 300.0 / RATE as f64;
        mixer
            .schedule_note(&sample, start, 1.0, 1.0, VoiceTag::default())
            .unwrap();

        let out = render(&mut renderer, 256);
        assert!(out.iter().all(|&s| s == 0.0));
        let out = render(&mut renderer, 256);
        assert_eq!(first_nonzero_frame(&out), Some(44));
    }

    #[test]
    fn late_start_plays_immediately() {
        let (mut mixer, mut renderer) = setup(4);
        render(&mut renderer, 512);
        let sample = dc(0.5, 10_000);
        mixer
            .schedule_note(&sample, 0.001, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        let out = render(&mut renderer, 64);
        assert_eq!(first_nonzero_frame(&out), Some(0));
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let (mut mixer, mut renderer) = setup(2);
        let sample = dc(0.1, 10_000);
        let tag = VoiceTag::default();
        assert!(mixer.play_note_now(&sample, 1.0, 1.0, tag).is_ok());
        assert!(mixer.play_note_now(&sample, 1.0, 1.0, tag).is_ok());
        assert_eq!(
            mixer.play_note_now(&sample, 1.0, 1.0, tag),
            Err(ScheduleError::PoolExhausted)
        );
        render(&mut renderer, 64);
        let stats = mixer.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.started, 2);
    }

    #[test]
    fn slots_are_reused_after_voices_finish() {
        let (mut mixer, mut renderer) = setup(1);
        let sample = dc(0.1, 32);
        let first = mixer
            .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        render(&mut renderer, 64);
        assert!(!mixer.is_valid(first));
        let second = mixer
            .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        assert!(mixer.is_valid(second));
        assert_ne!(first, second);
    }

    #[test]
    fn invalid_samples_are_rejected() {
        let (mut mixer, _renderer) = setup(2);
        let empty = Arc::new(Sample::mono("empty", RATE, Vec::new()));
        let tag = VoiceTag::default();
        assert_eq!(
            mixer.play_note_now(&empty, 1.0, 1.0, tag),
            Err(ScheduleError::InvalidSample)
        );
        assert_eq!(
            mixer.play_note_now(&dc(0.1, 10), 1.0, 0.0, tag),
            Err(ScheduleError::InvalidSample)
        );
    }

    #[test]
    fn zero_rate_sample_is_rejected() {
        let (mut mixer, mut renderer) = setup(2);
        let silent_rate = Arc::new(Sample::mono("z", 0, vec![0.5; 16]));
        let tag = VoiceTag::default();
        assert_eq!(
            mixer.play_note_now(&silent_rate, 1.0, 1.0, tag),
            Err(ScheduleError::InvalidSample)
        );
        assert_eq!(
            mixer.schedule_note(&silent_rate, 0.0, 1.0, 1.0, tag),
            Err(ScheduleError::InvalidSample)
        );
        render(&mut renderer, 64);
        assert_eq!(renderer.active_voices(), 0);
        assert_eq!(mixer.stats().allocated, 0);
    }

    #[test]
    fn unavailable_clock_refuses_voices() {
        let (mut mixer, _renderer) = setup(2);
        mixer.clock().set_available(false);
        assert_eq!(
            mixer.play_note_now(&dc(0.1, 10), 1.0, 1.0, VoiceTag::default()),
            Err(ScheduleError::Unavailable)
        );
    }

    #[test]
    fn queue_full_releases_slot() {
        let config = MixerConfig {
            max_voices: 8,
            command_capacity: 1,
            ..Default::default()
        };
        let (mut mixer, _renderer) = create_mixer(config, FrameClock::new(RATE));
        let sample = dc(0.1, 100);
        let tag = VoiceTag::default();
        mixer.play_note_now(&sample, 1.0, 1.0, tag).unwrap();
        assert_eq!(
            mixer.play_note_now(&sample, 1.0, 1.0, tag),
            Err(ScheduleError::QueueFull)
        );
        assert_eq!(mixer.stats().allocated, 1);
    }

    #[test]
    fn scheduled_stop_fades_then_frees() {
        let (mut mixer, mut renderer) = setup(4);
        let sample = dc(0.5, 100_000);
        let handle = mixer
            .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        mixer.schedule_stop(handle, 100.0 / RATE as f64, 10.0 / RATE as f64);
        let out = render(&mut renderer, 256);
        assert_eq!(out[99 * 2], 0.5);
        assert!(out[105 * 2] < 0.5 && out[105 * 2] > 0.0);
        assert_eq!(out[110 * 2], 0.0);
        assert!(!mixer.is_valid(handle));
    }

    #[test]
    fn immediate_stop_uses_forced_fade() {
        let (mut mixer, mut renderer) = setup(4);
        let sample = dc(0.5, 100_000);
        let handle = mixer
            .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        render(&mut renderer, 128);
        mixer.stop_note_immediate(handle);
        // 5 ms at 48 kHz = 240 frames
        let out = render(&mut renderer, 512);
        assert!(out[0] > 0.0);
        assert_eq!(out[240 * 2], 0.0);
        assert!(!mixer.is_valid(handle));
    }

    #[test]
    fn stop_all_cuts_a_long_release_short() {
        let (mut mixer, mut renderer) = setup(4);
        let sample = dc(0.5, 200_000);
        let handle = mixer
            .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        render(&mut renderer, 128);
        let now = mixer.clock().now();
        mixer.schedule_stop(handle, now, 2.0);
        render(&mut renderer, 256);
        assert!(mixer.is_valid(handle));

        mixer.stop_all_notes();
        let out = render(&mut renderer, 512);
        assert!(out[0] > 0.0);
        assert_eq!(out[240 * 2], 0.0);
        assert!(!mixer.is_valid(handle));
    }

    #[test]
    fn saturated_pool_voices_stop_independently() {
        let (mut mixer, mut renderer) = setup(3);
        let tag = VoiceTag::default();
        let levels = [0.1, 0.2, 0.4];
        let handles: Vec<VoiceHandle> = levels
            .iter()
            .map(|&level| mixer.play_note_now(&dc(level, 100_000), 1.0, 1.0, tag).unwrap())
            .collect();
        assert_eq!(
            mixer.play_note_now(&dc(0.3, 100_000), 1.0, 1.0, tag),
            Err(ScheduleError::PoolExhausted)
        );
        let out = render(&mut renderer, 64);
        assert!((out[0] - 0.7).abs() < 1e-6);

        let mut remaining = 0.7;
        for (i, &handle) in handles.iter().enumerate() {
            mixer.stop_note_immediate(handle);
            let out = render(&mut renderer, 512);
            remaining -= levels[i];
            let last = out[out.len() - 2];
            assert!((last - remaining).abs() < 1e-5);
            assert!(!mixer.is_valid(handle));
            assert!(handles[i + 1..].iter().all(|&h| mixer.is_valid(h)));
            assert_eq!(renderer.active_voices(), levels.len() - i - 1);
        }
    }

    #[test]
    fn stop_before_start_cancels_voice() {
        let (mut mixer, mut renderer) = setup(4);
        let sample = dc(0.5, 1000);
        let handle = mixer
            .schedule_note(&sample, 0.5, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        mixer.stop_note_immediate(handle);
        let out = render(&mut renderer, 128);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!mixer.is_valid(handle));
    }

    #[test]
    fn stop_all_silences_everything() {
        let (mut mixer, mut renderer) = setup(8);
        let sample = dc(0.1, 100_000);
        for _ in 0..5 {
            mixer
                .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
                .unwrap();
        }
        render(&mut renderer, 64);
        mixer.stop_all_notes();
        render(&mut renderer, 512);
        assert_eq!(renderer.active_voices(), 0);
        assert_eq!(mixer.stats().allocated, 0);
    }

    #[test]
    fn stale_handle_operations_are_noops() {
        let (mut mixer, mut renderer) = setup(1);
        let sample = dc(0.1, 16);
        let old = mixer
            .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        render(&mut renderer, 64);
        let long = dc(0.1, 100_000);
        let new = mixer
            .play_note_now(&long, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        mixer.stop_note_immediate(old);
        mixer.schedule_stop(old, 0.0, 0.0);
        render(&mut renderer, 512);
        assert!(mixer.is_valid(new));
    }

    #[test]
    fn output_is_limited() {
        let (mut mixer, mut renderer) = setup(8);
        let sample = dc(0.8, 1000);
        for _ in 0..4 {
            mixer
                .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
                .unwrap();
        }
        let out = render(&mut renderer, 64);
        assert!(out.iter().all(|&s| s <= 1.0 && s > 0.9));
    }

    #[test]
    fn limiter_is_transparent_below_knee() {
        assert_eq!(limit(0.5), 0.5);
        assert_eq!(limit(-0.9), -0.9);
        assert!(limit(1.0) > 0.9 && limit(1.0) < 1.0);
        assert!(limit(100.0) <= 1.0);
        assert!(limit(-100.0) >= -1.0);
        assert_eq!(limit(f32::NAN), 0.0);
        assert_eq!(limit(f32::INFINITY), 1.0);
    }

    #[test]
    fn limiter_is_monotonic() {
        let mut prev = limit(0.0);
        for i in 1..400 {
            let y = limit(i as f32 * 0.01);
            assert!(y >= prev);
            prev = y;
        }
    }

    #[test]
    fn mono_output_averages_sides() {
        let config = MixerConfig {
            output_channels: 1,
            ..Default::default()
        };
        let (mut mixer, mut renderer) = create_mixer(config, FrameClock::new(RATE));
        let sample = Arc::new(Sample {
            data: ls_ir::SampleData::Stereo(vec![0.2; 100], vec![0.4; 100]),
            ..Sample::new("st", RATE)
        });
        mixer
            .play_note_now(&sample, 1.0, 1.0, VoiceTag::default())
            .unwrap();
        let mut out = vec![0.0; 16];
        renderer.render(&mut out);
        assert!((out[0] - 0.3).abs() < 1e-6);
    }
}
