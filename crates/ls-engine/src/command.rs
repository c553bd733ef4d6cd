//! Commands sent from the control thread to the audio thread.
//!
//! Commands travel through a bounded SPSC ring buffer and are applied at
//! the start of each render call, so every voice assignment is committed
//! before the buffer it affects is rendered.

use crate::voice::{Voice, VoiceHandle};

pub enum MixerCommand {
    /// Install a voice into its reserved slot
    Start(Voice),
    /// Begin a fade-out at an absolute output frame
    StopAt {
        handle: VoiceHandle,
        frame: u64,
        fade_frames: u32,
    },
    /// Fade out at the next buffer boundary with the forced short fade
    StopNow { handle: VoiceHandle },
    /// Fade out everything at the next buffer boundary
    StopAll,
}
