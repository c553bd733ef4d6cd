//! Offline rendering: drive a station and its renderer without a device.

use ls_engine::MixerRenderer;

use crate::station::LoopStation;

/// Render `seconds` of interleaved output, running one control tick per
/// block of `buffer_frames`.
///
/// `renderer` must be the one paired with the station by
/// [`LoopStation::with_frame_clock`]; its clock is the station's clock.
pub fn render_frames(station: &mut LoopStation, renderer: &mut MixerRenderer, seconds: f64) -> Vec<f32> {
    let channels = renderer.channels();
    let sample_rate = station.config().sample_rate as f64;
    let block_frames = station.config().buffer_frames.max(1) as usize;
    let total_frames = (seconds.max(0.0) * sample_rate).round() as usize;

    let mut out = vec![0.0f32; total_frames * channels];
    for block in out.chunks_mut(block_frames * channels) {
        station.update();
        renderer.render(block);
    }
    log::debug!("rendered {} frames ({} ch)", total_frames, channels);
    out
}

/// Render `seconds` and encode as 16-bit PCM WAV.
pub fn render_to_wav(station: &mut LoopStation, renderer: &mut MixerRenderer, seconds: f64) -> Vec<u8> {
    let samples = render_frames(station, renderer, seconds);
    ls_formats::frames_to_wav(&samples, renderer.channels() as u16, station.config().sample_rate)
}
