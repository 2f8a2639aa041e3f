//! Integration test utilities for the mirrorcast renderers
//!
//! This module provides stand-ins for the native collaborators so the
//! pipelines can be driven deterministically:
//! - a scripted video decoder whose units name the picture size they produce
//! - a presentation surface that records every call it receives
//! - an in-memory audio sink

use ffmpeg_next::format::Pixel;
use ffmpeg_next::util::frame;
use mirrorcast_render::audio::AudioSink;
use mirrorcast_render::convert::Geometry;
use mirrorcast_render::decoder::{AudioDecoder, DecodeError, VideoDecoder};
use mirrorcast_render::present::{ConvertedFrame, PresentationSurface, PresentationThread, Presenter};
use mirrorcast_render::renderer::{VideoPipeline, VideoSettings};
use mirrorcast_render::utils::config::BackgroundMode;
use mirrorcast_render::{AccessUnit, RendererError, Result, VideoBackend};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unit payload asking the scripted decoder for a `width`x`height` picture
pub fn picture_unit(width: u32, height: u32) -> Vec<u8> {
    format!("{}x{}", width, height).into_bytes()
}

/// Counters observable after the decoder moved into a pipeline
#[derive(Debug, Default)]
pub struct DecoderProbe {
    pub opens: AtomicUsize,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl DecoderProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Video decoder driven by unit contents
///
/// `WxH` units produce one YUV420P picture of that size, held back until
/// more than `delay` pictures are queued. `FAIL` is a fatal error and `BAD`
/// is malformed input.
pub struct ScriptedDecoder {
    pending: VecDeque<(Geometry, u64)>,
    delay: usize,
    reopen_fails: bool,
    probe: Arc<DecoderProbe>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        let probe = Arc::new(DecoderProbe::default());
        probe.opens.fetch_add(1, Ordering::SeqCst);
        Self {
            pending: VecDeque::new(),
            delay: 0,
            reopen_fails: false,
            probe,
        }
    }

    /// Hold back `delay` pictures, like a decoder with reordering
    pub fn with_delay(mut self, delay: usize) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_reopen(mut self) -> Self {
        self.reopen_fails = true;
        self
    }

    pub fn probe(&self) -> Arc<DecoderProbe> {
        Arc::clone(&self.probe)
    }

    fn parse(data: &[u8]) -> Option<Geometry> {
        let text = std::str::from_utf8(data).ok()?;
        let (width, height) = text.split_once('x')?;
        Some(Geometry::new(width.parse().ok()?, height.parse().ok()?))
    }
}

impl Default for ScriptedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for ScriptedDecoder {
    fn send(&mut self, unit: &AccessUnit<'_>) -> std::result::Result<(), DecodeError> {
        if unit.data == b"FAIL" {
            return Err(DecodeError::Fatal("scripted failure".to_string()));
        }
        let size = Self::parse(unit.data).ok_or(DecodeError::InvalidData)?;
        self.pending.push_back((size, unit.pts));
        Ok(())
    }

    fn receive(&mut self, picture: &mut frame::Video) -> std::result::Result<(), DecodeError> {
        if self.pending.len() <= self.delay {
            return Err(DecodeError::NeedMoreData);
        }
        let (size, pts) = self.pending.pop_front().ok_or(DecodeError::NeedMoreData)?;

        let mut next = frame::Video::new(Pixel::YUV420P, size.width, size.height);
        next.data_mut(0).fill(16);
        next.data_mut(1).fill(128);
        next.data_mut(2).fill(128);
        next.set_pts(Some(pts as i64));
        *picture = next;
        Ok(())
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.probe.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn reopen(&mut self) -> Result<()> {
        self.pending.clear();
        if self.reopen_fails {
            return Err(RendererError::decoder_error("scripted reopen failure"));
        }
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.pending.clear();
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// One call a [`RecordingSurface`] received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Resize(Geometry),
    /// Geometry of the uploaded frame and the surface size at that moment
    Upload { frame: Geometry, surface: Geometry, pts: u64 },
    Present,
    Clear,
    Visible(bool),
}

/// Shared view of everything a surface was asked to do
pub type SurfaceLog = Arc<Mutex<Vec<SurfaceCall>>>;

/// Presentation surface that records calls instead of drawing
pub struct RecordingSurface {
    size: Geometry,
    log: SurfaceLog,
    present_delay: Duration,
}

impl RecordingSurface {
    pub fn new(initial: Geometry, log: SurfaceLog) -> Self {
        Self {
            size: initial,
            log,
            present_delay: Duration::ZERO,
        }
    }

    /// Make every present take at least `delay`
    pub fn with_present_delay(mut self, delay: Duration) -> Self {
        self.present_delay = delay;
        self
    }
}

impl PresentationSurface for RecordingSurface {
    fn size(&self) -> Geometry {
        self.size
    }

    fn resize(&mut self, size: Geometry) -> Result<()> {
        self.size = size;
        self.log.lock().push(SurfaceCall::Resize(size));
        Ok(())
    }

    fn upload(&mut self, frame: &ConvertedFrame) -> Result<()> {
        self.log.lock().push(SurfaceCall::Upload {
            frame: frame.geometry(),
            surface: self.size,
            pts: frame.pts,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if !self.present_delay.is_zero() {
            std::thread::sleep(self.present_delay);
        }
        self.log.lock().push(SurfaceCall::Present);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.log.lock().push(SurfaceCall::Clear);
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.log.lock().push(SurfaceCall::Visible(visible));
        Ok(())
    }
}

/// Everything needed to build a pipeline against a recording surface
pub struct PipelineFixture {
    pub initial_size: Geometry,
    pub background: BackgroundMode,
    pub present_delay: Duration,
}

impl Default for PipelineFixture {
    fn default() -> Self {
        Self {
            initial_size: Geometry::default(),
            background: BackgroundMode::On,
            present_delay: Duration::ZERO,
        }
    }
}

impl PipelineFixture {
    /// Build a pipeline presenting on its own thread into a recording surface
    pub fn build(&self, decoder: Box<dyn VideoDecoder>) -> Result<(VideoPipeline, SurfaceLog)> {
        let log = SurfaceLog::default();
        let surface = RecordingSurface::new(self.initial_size, Arc::clone(&log)).with_present_delay(self.present_delay);
        let thread = PresentationThread::spawn("test-present", surface)?;

        let settings = VideoSettings {
            background: self.background,
            ..test_settings()
        };
        let pipeline = VideoPipeline::new(
            VideoBackend::Callback,
            decoder,
            Presenter::new(Arc::new(thread)),
            settings,
        );
        Ok((pipeline, log))
    }
}

fn test_settings() -> VideoSettings {
    VideoSettings {
        destination_format: Pixel::RGB24,
        sizing: Default::default(),
        filter: Default::default(),
        orientation: Default::default(),
        background: BackgroundMode::On,
        dump_path: None,
    }
}

/// Count calls matching `predicate`
pub fn count_calls(log: &SurfaceLog, predicate: impl Fn(&SurfaceCall) -> bool) -> usize {
    log.lock().iter().filter(|&call| predicate(call)).count()
}

/// Audio decoder that turns every input byte into one S16 sample
#[derive(Default)]
pub struct PassthroughAudioDecoder {
    pub probe: Arc<DecoderProbe>,
}

impl AudioDecoder for PassthroughAudioDecoder {
    fn decode(&mut self, unit: &AccessUnit<'_>, out: &mut Vec<u8>) -> std::result::Result<usize, DecodeError> {
        for byte in unit.data {
            out.extend_from_slice(&i16::from(*byte).to_le_bytes());
        }
        Ok(unit.data.len() * 2)
    }

    fn flush(&mut self) {
        self.probe.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn reopen(&mut self) -> Result<()> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a [`MemorySink`] has seen
#[derive(Debug, Default)]
pub struct SinkState {
    pub pcm: Vec<u8>,
    pub playing: bool,
    pub clears: usize,
    pub volume: f32,
}

/// Audio sink collecting PCM in memory
#[derive(Clone, Default)]
pub struct MemorySink {
    pub state: Arc<Mutex<SinkState>>,
}

impl AudioSink for MemorySink {
    fn start(&mut self) -> Result<()> {
        self.state.lock().playing = true;
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        self.state.lock().pcm.extend_from_slice(pcm);
        Ok(pcm.len())
    }

    fn clear(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.pcm.clear();
        state.clears += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().playing = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }
}
