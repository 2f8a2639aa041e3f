use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{error, info, warn};
use mirrorcast_render::bitstream::{access_units, adts_frames, adts_sample_rate, AAC_FRAME_SAMPLES};
use mirrorcast_render::convert::Geometry;
use mirrorcast_render::present::PresentQueue;
use mirrorcast_render::utils::config::{BackgroundMode, Flip, Rotation};
use mirrorcast_render::window::{self, WindowQueue, WindowSettings};
use mirrorcast_render::{Config, MirrorSession, RendererConfig, RendererFactory};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// mirrorcast-play - play a raw mirroring stream through the receiver renderers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Annex-B H.264 elementary stream
    #[arg(value_name = "VIDEO")]
    video: PathBuf,

    /// ADTS AAC stream played alongside the video
    #[arg(short, long, value_name = "FILE")]
    audio: Option<PathBuf>,

    /// Clockwise rotation in degrees (0, 90, 180, 270)
    #[arg(short, long, value_parser = parse_rotation)]
    rotation: Option<Rotation>,

    /// Mirror the picture (none, horizontal, vertical)
    #[arg(long)]
    flip: Option<Flip>,

    /// Hide the window instead of showing a black background while idle
    #[arg(long = "no-background", action = ArgAction::SetFalse)]
    background: bool,

    /// Tune decoding and audio buffering for latency
    #[arg(long)]
    low_latency: bool,

    /// Audio output ("default", "hdmi", "analog", a device name, or "none")
    #[arg(long, value_name = "DEVICE")]
    audio_device: Option<String>,

    /// Video frame rate used to pace the stream
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Append every video unit to this file
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn parse_rotation(value: &str) -> std::result::Result<Rotation, String> {
    let degrees: u16 = value.parse().map_err(|_| format!("'{}' is not a number", value))?;
    Rotation::try_from(degrees)
}

impl Args {
    /// Command-line flags override every other configuration source
    fn apply(&self, config: &mut RendererConfig) {
        if let Some(rotation) = self.rotation {
            config.video.rotation = rotation;
        }
        if let Some(flip) = self.flip {
            config.video.flip = flip;
        }
        if !self.background {
            config.video.background = BackgroundMode::Off;
        }
        if self.low_latency {
            config.low_latency = true;
        }
        if let Some(device) = &self.audio_device {
            config.audio.device = device.clone();
        }
        if let Some(path) = &self.dump {
            config.video.dump_path = Some(path.clone());
        }
        // The player always draws into its own window
        config.video.backend = "wgpu".to_string();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before logging so the configured level applies
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config.renderer);
    config.validate()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(config.general.effective_log_level(args.debug)))
        .format_timestamp_millis()
        .init();

    info!("Starting mirrorcast-play v{}", env!("CARGO_PKG_VERSION"));

    anyhow::ensure!(args.fps > 0.0 && args.fps.is_finite(), "frame rate must be positive");

    let video_stream = std::fs::read(&args.video)
        .with_context(|| format!("Failed to read video stream {}", args.video.display()))?;
    let audio_stream = match &args.audio {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("Failed to read audio stream {}", path.display()))?,
        ),
        None => None,
    };

    let event_loop = window::create_event_loop()?;
    let queue = Arc::new(WindowQueue::new(&event_loop));
    let display: Arc<dyn PresentQueue> = Arc::clone(&queue) as Arc<dyn PresentQueue>;
    let factory = RendererFactory::new(config.renderer.clone()).with_display(display);
    let running = Arc::new(AtomicBool::new(true));

    // Building the wgpu renderer waits for the window, so it happens here
    // while the main thread runs the event loop
    let player = {
        let queue = Arc::clone(&queue);
        let running = Arc::clone(&running);
        let interval = Duration::from_secs_f64(1.0 / args.fps);
        thread::Builder::new()
            .name("mirrorcast-video-feed".to_string())
            .spawn(move || {
                let result = play(&factory, video_stream, audio_stream, interval, &running);
                if let Err(err) = &result {
                    error!("Cannot start playback: {:#}", err);
                    queue.close();
                }
                result
            })?
    };

    let settings = WindowSettings {
        title: config.general.name.clone(),
        initial_size: Geometry::new(config.renderer.video.initial_width, config.renderer.video.initial_height),
    };
    let window_result = window::run(event_loop, &queue, settings);
    running.store(false, Ordering::SeqCst);

    let play_result = match player.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("video feeder panicked")),
    };

    window_result?;
    play_result?;
    info!("mirrorcast-play exiting");
    Ok(())
}

/// Build the renderers, then feed both streams until done or stopped
///
/// Only failing to build the renderers is an error.
fn play(
    factory: &RendererFactory,
    video_stream: Vec<u8>,
    audio_stream: Option<Vec<u8>>,
    interval: Duration,
    running: &Arc<AtomicBool>,
) -> Result<()> {
    let video = factory.create_video()?;
    let audio = if audio_stream.is_some() {
        Some(factory.create_audio()?)
    } else {
        None
    };
    let session = Arc::new(MirrorSession::new(video, audio));

    let audio_feeder = match audio_stream {
        Some(stream) => {
            let session = Arc::clone(&session);
            let running = Arc::clone(running);
            Some(
                thread::Builder::new()
                    .name("mirrorcast-audio-feed".to_string())
                    .spawn(move || feed_audio(&session, &stream, &running))?,
            )
        }
        None => None,
    };

    // Closing the window fails the blocked submit, so this is not fatal
    if let Err(err) = feed_video(&session, &video_stream, interval, running) {
        warn!("video feeder stopped: {:#}", err);
        running.store(false, Ordering::SeqCst);
    }

    if let Some(feeder) = audio_feeder {
        match feeder.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("audio feeder stopped: {:#}", err),
            Err(_) => error!("audio feeder panicked"),
        }
    }

    session.shutdown()?;
    Ok(())
}

/// Submit access units at a fixed rate, as a mirroring client would
fn feed_video(session: &MirrorSession, stream: &[u8], interval: Duration, running: &AtomicBool) -> Result<()> {
    session.start()?;
    session.open_connection()?;

    let units = access_units(stream);
    info!("Feeding {} video access units", units.len());

    let started = Instant::now();
    for (index, unit) in units.iter().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let due = interval * index as u32;
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
        session.video_process(unit, due.as_micros() as u64)?;
    }

    info!("Video stream finished, close the window to exit");
    session.close_connection()?;
    Ok(())
}

/// Submit ADTS frames paced by their sample rate
fn feed_audio(session: &MirrorSession, stream: &[u8], running: &AtomicBool) -> Result<()> {
    let frames = adts_frames(stream);
    info!("Feeding {} audio frames", frames.len());

    let started = Instant::now();
    let mut position = Duration::ZERO;
    for frame in frames {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if let Some(wait) = position.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
        session.audio_process(frame, position.as_micros() as u64)?;

        let rate = adts_sample_rate(frame).unwrap_or(44_100);
        position += Duration::from_secs_f64(f64::from(AAC_FRAME_SAMPLES) / f64::from(rate));
    }
    Ok(())
}
