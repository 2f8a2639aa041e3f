//! Backend selection

use super::{
    AudioBackend, AudioHandle, AudioPipeline, NullAudioRenderer, VideoBackend, VideoHandle,
    VideoPipeline, VideoSettings,
};
use crate::audio::{AudioFormat, CpalSink};
use crate::decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
use crate::present::{
    CallbackSurface, FrameCallback, PresentQueue, PresentationSurface, PresentationThread, Presenter,
};
use crate::utils::config::RendererConfig;
use crate::utils::error::{RendererError, Result};
use ffmpeg_next::format::Pixel;
use log::info;
use std::sync::Arc;

/// Builds renderers from a configuration snapshot
///
/// The configuration is copied in at construction; later changes to the
/// caller's copy do not affect renderers built afterwards.
pub struct RendererFactory {
    config: RendererConfig,
    display: Option<Arc<dyn PresentQueue>>,
    frame_callback: Option<FrameCallback>,
}

impl RendererFactory {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            display: None,
            frame_callback: None,
        }
    }

    /// Presentation context of the window the wgpu backend draws into
    pub fn with_display(mut self, display: Arc<dyn PresentQueue>) -> Self {
        self.display = Some(display);
        self
    }

    /// Toolkit callback used by the callback backend
    pub fn with_frame_callback(mut self, callback: FrameCallback) -> Self {
        self.frame_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Build the configured video renderer
    ///
    /// # Returns
    ///
    /// `BackendUnavailable` if the selector is unknown, the backend's
    /// collaborator (display or callback) was not supplied, or the display
    /// could not open its surface
    ///
    /// For the wgpu backend this waits until the display has a surface, so
    /// it must not be called on the thread running the display's event loop.
    pub fn create_video(&self) -> Result<VideoHandle> {
        let backend: VideoBackend = self.config.video.backend.parse()?;

        // Resolve the presentation context before anything native is opened
        let (queue, format): (Arc<dyn PresentQueue>, Pixel) = match backend {
            VideoBackend::Wgpu => {
                let display = self
                    .display
                    .clone()
                    .ok_or_else(|| RendererError::unavailable("wgpu video backend needs a display"))?;
                // Returns once the window holds a surface, fails if it never will
                Presenter::new(Arc::clone(&display))
                    .run(|_surface: &mut dyn PresentationSurface| Ok(()))
                    .map_err(|err| RendererError::unavailable(format!("wgpu surface could not be opened: {}", err)))?;
                (display, Pixel::RGBA)
            }
            VideoBackend::Callback => {
                let callback = self
                    .frame_callback
                    .clone()
                    .ok_or_else(|| RendererError::unavailable("callback video backend needs a frame callback"))?;
                let thread = PresentationThread::spawn("mirrorcast-present", CallbackSurface::new(callback))?;
                (Arc::new(thread), Pixel::RGB24)
            }
        };

        let decoder = FfmpegVideoDecoder::h264(self.config.low_latency)?;
        if self.config.low_latency {
            info!("Using low-latency mode");
        }

        let settings = VideoSettings::from_config(&self.config.video, format);
        info!(
            "Video renderer: {} ({:?}, rotation {}, flip {}, background {:?})",
            backend.name(),
            format,
            self.config.video.rotation.degrees(),
            self.config.video.flip,
            self.config.video.background
        );

        let pipeline = VideoPipeline::new(backend, Box::new(decoder), Presenter::new(queue), settings);
        Ok(VideoHandle::new(Box::new(pipeline)))
    }

    /// Build the configured audio renderer
    pub fn create_audio(&self) -> Result<AudioHandle> {
        let audio = &self.config.audio;

        match AudioBackend::for_device(&audio.device) {
            AudioBackend::Null => {
                info!("Audio renderer: null");
                Ok(AudioHandle::new(Box::new(NullAudioRenderer::new(audio.volume))))
            }
            AudioBackend::Cpal => {
                let format = AudioFormat::default();
                let buffer_ms = audio.effective_buffer_ms(self.config.low_latency);
                let sink = CpalSink::open(&audio.device, format, buffer_ms, audio.volume)?;
                let decoder = FfmpegAudioDecoder::aac(format)?;
                info!(
                    "Audio renderer: cpal on '{}' ({}, {} ms buffer)",
                    sink.device_name(),
                    format,
                    buffer_ms
                );

                let pipeline = AudioPipeline::new(AudioBackend::Cpal, Box::new(decoder), Box::new(sink));
                Ok(AudioHandle::new(Box::new(pipeline)))
            }
        }
    }
}
