//! loopstation CLI: play a demo loop live or bounce it to WAV.
//!
//! Usage:
//!   cargo run --bin ls-cli -- [samples_dir] [--config station.yaml]
//!   cargo run --bin ls-cli -- samples/ --wav loop.wav --seconds 16
//!
//! `samples_dir` may hold kick.wav, snare.wav, hat.wav and keys.wav;
//! anything missing is replaced by a generated tone.

use anyhow::{bail, Context, Result};
use ls_station::{
    render_to_wav, sine_click, AudioOutput, DrumKit, InstrumentKind, LoopStation, NoteEvent,
    Sample, SampledKeys, StationConfig, StationEvent, Track, WavSampleLoader,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs};

struct Args {
    samples_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    wav: Option<PathBuf>,
    seconds: Option<f64>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        samples_dir: None,
        config: None,
        wav: None,
        seconds: None,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(it.next().context("--config needs a path")?.into()),
            "--wav" => args.wav = Some(it.next().context("--wav needs a path")?.into()),
            "--seconds" => {
                let value = it.next().context("--seconds needs a value")?;
                args.seconds = Some(value.parse().with_context(|| format!("bad --seconds {value}"))?);
            }
            flag if flag.starts_with("--") => {
                bail!("unknown option {flag}\nUsage: ls-cli [samples_dir] [--config file] [--wav out.wav] [--seconds N]")
            }
            _ => args.samples_dir = Some(arg.into()),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => StationConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StationConfig::default(),
    };

    match &args.wav {
        Some(path) => bounce(config, &args, path),
        None => play_live(config, &args),
    }
}

fn bounce(config: StationConfig, args: &Args, path: &Path) -> Result<()> {
    let (mut station, mut renderer) = LoopStation::with_frame_clock(config);
    setup_demo(&mut station, args.samples_dir.as_deref())?;
    let seconds = args.seconds.unwrap_or_else(|| 2.0 * station.tempo().loop_duration() + 0.5);

    println!("Rendering {:.1}s to {} at {} Hz...", seconds, path.display(), station.config().sample_rate);
    station.play();
    let wav = render_to_wav(&mut station, &mut renderer, seconds);
    fs::write(path, &wav).with_context(|| format!("writing {}", path.display()))?;

    let stats = station.stats();
    println!(
        "Rendered {} bytes: {} notes, {} late, {} dropped",
        wav.len(),
        stats.scheduler.scheduled,
        stats.scheduler.dropped_late,
        stats.scheduler.dropped_voice
    );
    Ok(())
}

fn play_live(config: StationConfig, args: &Args) -> Result<()> {
    let (mut station, output) = LoopStation::open_device(config).context("opening audio device")?;
    setup_demo(&mut station, args.samples_dir.as_deref())?;
    station.subscribe(|event| {
        if let StationEvent::LoopCompleted { loop_index } = event {
            log::info!("loop {} complete", loop_index);
        }
    });

    let seconds = args.seconds.unwrap_or(4.0 * station.tempo().loop_duration());
    println!("Playing for {:.1}s ({} Hz)...", seconds, output.sample_rate());
    station.play();

    let started = Instant::now();
    while started.elapsed().as_secs_f64() < seconds {
        if !station.update() {
            bail!("audio device lost");
        }
        let stats = station.stats();
        print!(
            "\r{:?} | Loop: {:3} | Beat: {:5.2} | Voices: {:2}",
            stats.state, stats.loop_index, stats.beat, stats.mixer.active
        );
        let _ = std::io::stdout().flush();
        std::thread::sleep(Duration::from_millis(5));
    }

    station.stop();
    // let the stop fade reach the device
    std::thread::sleep(Duration::from_millis(50));
    println!("\rDone.                                          ");
    Ok(())
}

/// Install instruments and a two-track groove.
fn setup_demo(station: &mut LoopStation, samples_dir: Option<&Path>) -> Result<()> {
    let sample_rate = station.config().sample_rate;
    let mut load = |id: &str, freq: f32, seconds: f32| -> Result<Arc<Sample>> {
        if let Some(dir) = samples_dir {
            let loader = WavSampleLoader::new(dir);
            if loader.path_for(id).exists() {
                return station.preload_sample(id, &loader).with_context(|| format!("loading {id}"));
            }
            log::warn!("{} not found in {}, using a generated tone", id, dir.display());
        }
        Ok(Arc::new(sine_click(id, sample_rate, freq, seconds)))
    };

    let kick = load("kick", 60.0, 0.3)?;
    let snare = load("snare", 220.0, 0.2)?;
    let hat = load("hat", 6000.0, 0.05)?;
    let keys = load("keys", 261.63, 1.5)?;

    station.set_instrument(Box::new(
        DrumKit::new().with_pad(36, kick).with_pad(38, snare).with_pad(42, hat),
    ));
    station.set_instrument(Box::new(
        SampledKeys::new(InstrumentKind::Keys, keys, 60).with_release(0.1),
    ));

    let total = station.tempo().total_beats() as u32;
    let drums = (0..total).flat_map(|beat| {
        let b = beat as f64;
        let mut hits = vec![NoteEvent::new(b, 42, 0.5, 0.25), NoteEvent::new(b + 0.5, 42, 0.3, 0.25)];
        hits.push(match beat % 2 {
            0 => NoteEvent::new(b, 36, 1.0, 0.5),
            _ => NoteEvent::new(b, 38, 0.8, 0.5),
        });
        hits
    });
    station.add_track_with(Track::with_events("drums", InstrumentKind::Drums, drums));

    let chords = [[60, 64, 67], [57, 60, 64], [53, 57, 60], [55, 59, 62]];
    let bar = station.tempo().beats_per_bar() as f64;
    let keys = (0..station.tempo().bars()).flat_map(|i| {
        let chord = chords[i as usize % chords.len()];
        chord.map(|pitch| NoteEvent::new(i as f64 * bar, pitch, 0.6, bar - 0.5))
    });
    station.add_track_with(Track::with_events("keys", InstrumentKind::Keys, keys));
    Ok(())
}
