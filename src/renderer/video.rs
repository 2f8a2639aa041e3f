//! Video pipeline: decode, convert, hand off for presentation
//!
//! `submit` runs on the caller's thread and only returns once every picture
//! the unit produced has been shown. That block is the pipeline's only
//! backpressure; no frame is ever dropped to catch up.

use super::dump::BitstreamDump;
use super::{AccessUnit, Backend, Renderer, VideoBackend, VideoRenderer};
use crate::convert::{ConversionContext, Geometry, ScaleFilter, SurfaceSizing};
use crate::decoder::{DecodeError, DecoderState, VideoDecoder};
use crate::present::{ConvertedFrame, Orientation, PresentationSurface, Presenter};
use crate::utils::config::{BackgroundMode, VideoConfig};
use crate::utils::error::{RendererError, Result};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::util::frame;
use log::{debug, error, info, warn};
use std::path::PathBuf;

/// Per-pipeline settings, fixed at construction
#[derive(Debug, Clone)]
pub struct VideoSettings {
    /// Pixel format the surface consumes
    pub destination_format: Pixel,
    pub sizing: SurfaceSizing,
    pub filter: ScaleFilter,
    pub orientation: Orientation,
    pub background: BackgroundMode,
    pub dump_path: Option<PathBuf>,
}

impl VideoSettings {
    pub fn from_config(config: &VideoConfig, destination_format: Pixel) -> Self {
        Self {
            destination_format,
            sizing: SurfaceSizing::from_fixed(config.fixed_size),
            filter: config.scale_filter,
            orientation: Orientation::new(config.rotation, config.flip),
            background: config.background,
            dump_path: config.dump_path.clone(),
        }
    }
}

/// Software video renderer
pub struct VideoPipeline {
    backend: VideoBackend,
    decoder: Box<dyn VideoDecoder>,
    presenter: Presenter,
    conversion: ConversionContext,
    sizing: SurfaceSizing,
    orientation: Orientation,
    background: BackgroundMode,
    dump: Option<BitstreamDump>,
    /// Reused decode target
    picture: frame::Video,
    state: DecoderState,
    connections: u32,
    frames_presented: u64,
    reopens: u64,
}

impl VideoPipeline {
    /// Assemble a pipeline around an already opened decoder
    ///
    /// A dump file that cannot be opened is reported and skipped.
    pub fn new(
        backend: VideoBackend,
        decoder: Box<dyn VideoDecoder>,
        presenter: Presenter,
        settings: VideoSettings,
    ) -> Self {
        let dump = settings.dump_path.as_deref().and_then(|path| {
            BitstreamDump::create(path)
                .map_err(|err| warn!("Cannot open bitstream dump {}: {}", path.display(), err))
                .ok()
        });

        Self {
            backend,
            decoder,
            presenter,
            conversion: ConversionContext::new(settings.destination_format, settings.filter),
            sizing: settings.sizing,
            orientation: settings.orientation,
            background: settings.background,
            dump,
            picture: frame::Video::empty(),
            state: DecoderState::Uninitialized,
            connections: 0,
            frames_presented: 0,
            reopens: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// How many times the conversion context was rebuilt
    pub fn conversion_rebuilds(&self) -> u64 {
        self.conversion.rebuilds()
    }

    pub fn connections(&self) -> u32 {
        self.connections
    }

    /// How many times the decoder was reopened after a fatal error
    pub fn decoder_reopens(&self) -> u64 {
        self.reopens
    }

    fn closed_error() -> RendererError {
        RendererError::decoder_error("video decoder is closed")
    }

    fn handle_decode_error(&mut self, err: DecodeError, pts: u64) -> Result<()> {
        match err {
            DecodeError::NeedMoreData | DecodeError::EndOfStream => {
                debug!("Decoder not accepting unit at {} us: {}", pts, err);
                Ok(())
            }
            DecodeError::InvalidData => {
                warn!("Dropping malformed video unit at {} us", pts);
                Ok(())
            }
            DecodeError::Fatal(reason) => self.recover(&reason),
        }
    }

    /// Tear the decoder down and start over with a fresh one
    fn recover(&mut self, reason: &str) -> Result<()> {
        error!("Video decoder failed ({}), reopening it", reason);
        self.conversion.invalidate();

        match self.decoder.reopen() {
            Ok(()) => {
                self.reopens += 1;
                self.state = DecoderState::Ready;
                Ok(())
            }
            Err(err) => {
                error!("Reopening video decoder failed: {}", err);
                self.decoder.close();
                self.state = DecoderState::Closed;
                Err(err)
            }
        }
    }

    /// Receive and present every picture the decoder has ready
    fn drain(&mut self) -> Result<()> {
        loop {
            match self.decoder.receive(&mut self.picture) {
                Ok(()) => self.present_picture()?,
                Err(DecodeError::Fatal(reason)) => return self.recover(&reason),
                Err(_) => return Ok(()),
            }
        }
    }

    fn present_picture(&mut self) -> Result<()> {
        let pts = self.picture.pts().map_or(0, |pts| pts.max(0) as u64);
        let source = Geometry::of(&self.picture);
        // Rotation is applied by the surface, never by the scaler
        let destination = self.sizing.destination_for(source);

        match self.conversion.prepare(&self.picture, destination) {
            Ok(true) => info!(
                "Video stream is now {} ({:?} -> {:?})",
                source,
                self.picture.format(),
                self.conversion.destination_format()
            ),
            Ok(false) => {}
            Err(err) => {
                warn!("Dropping picture at {} us: {}", pts, err);
                return Ok(());
            }
        }
        if let Err(err) = self.conversion.convert(&self.picture) {
            warn!("Dropping picture at {} us: {}", pts, err);
            return Ok(());
        }
        let Some(buffer) = self.conversion.take_buffer() else {
            warn!("Conversion buffer missing, dropping picture at {} us", pts);
            return Ok(());
        };

        let shown = self.presenter.present(ConvertedFrame {
            buffer,
            pts,
            orientation: self.orientation,
        })?;
        self.conversion.restore_buffer(shown.buffer);
        self.frames_presented += 1;
        debug!("Presented frame {} at {} us", self.frames_presented, pts);

        Ok(())
    }

    fn show_idle(&self) -> Result<()> {
        let background = self.background;
        self.presenter.run(move |surface: &mut dyn PresentationSurface| match background {
            BackgroundMode::On => surface.clear(),
            BackgroundMode::Off => surface.set_visible(false),
        })
    }

    fn leave_idle(&self) -> Result<()> {
        if self.background == BackgroundMode::Off {
            self.presenter
                .run(|surface: &mut dyn PresentationSurface| surface.set_visible(true))?;
        }
        Ok(())
    }
}

impl Renderer for VideoPipeline {
    fn backend(&self) -> Backend {
        Backend::Video(self.backend)
    }

    fn start(&mut self) -> Result<()> {
        match self.state {
            DecoderState::Uninitialized => {}
            DecoderState::Closed => return Err(Self::closed_error()),
            _ => return Ok(()),
        }

        self.state = DecoderState::Ready;
        if self.connections == 0 {
            self.show_idle()?;
        }
        info!("{} renderer started", self.backend());
        Ok(())
    }

    fn submit(&mut self, unit: &AccessUnit<'_>) -> Result<()> {
        match self.state {
            DecoderState::Closed => return Err(Self::closed_error()),
            DecoderState::Uninitialized => self.start()?,
            _ => {}
        }

        if let Some(dump) = self.dump.as_mut() {
            dump.write(unit.data);
        }
        self.state = DecoderState::Decoding;

        match self.decoder.send(unit) {
            Ok(()) => {}
            Err(DecodeError::NeedMoreData) => {
                // Input queue full: make room, then try the unit once more
                self.drain()?;
                if self.state == DecoderState::Closed {
                    return Err(Self::closed_error());
                }
                if let Err(err) = self.decoder.send(unit) {
                    return self.handle_decode_error(err, unit.pts);
                }
            }
            Err(err) => return self.handle_decode_error(err, unit.pts),
        }

        self.drain()
    }

    fn flush(&mut self) -> Result<()> {
        match self.state {
            DecoderState::Uninitialized | DecoderState::Closed => {
                debug!("Flush ignored, video decoder is {:?}", self.state);
                return Ok(());
            }
            _ => {}
        }

        self.state = DecoderState::Draining;
        self.decoder.flush();
        self.state = DecoderState::Ready;
        info!("Video renderer flushed");
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.decoder.close();
        self.conversion.invalidate();
        if let Some(mut dump) = self.dump.take() {
            dump.finish();
        }
        self.state = DecoderState::Closed;
        info!(
            "{} renderer closed after {} frames ({} conversion rebuilds)",
            self.backend(),
            self.frames_presented,
            self.conversion.rebuilds()
        );
        Ok(())
    }
}

impl VideoRenderer for VideoPipeline {
    fn notify_background_state(&mut self, delta: i32) -> Result<()> {
        let previous = self.connections;
        let next = i64::from(previous) + i64::from(delta);
        if next < 0 {
            warn!("Connection count would drop to {}, clamping to 0", next);
        }
        self.connections = next.clamp(0, i64::from(u32::MAX)) as u32;
        debug!("Active connections: {} -> {}", previous, self.connections);

        if self.state == DecoderState::Uninitialized {
            // start() applies the idle background
            return Ok(());
        }

        match (previous, self.connections) {
            (0, now) if now > 0 => self.leave_idle(),
            (before, 0) if before > 0 => self.show_idle(),
            _ => Ok(()),
        }
    }
}
