//! Glue between a mirroring session and its renderers
//!
//! Connection and stream callbacks arrive on different threads. Video and
//! audio each sit behind their own lock, so a video submit blocked on
//! presentation never holds up audio.

use crate::bitstream::unit_kind;
use crate::renderer::{AccessUnit, AudioHandle, RendererFactory, VideoHandle};
use crate::utils::airplay_volume_to_gain;
use crate::utils::error::Result;
use log::{debug, info, warn};
use parking_lot::Mutex;

/// Renderers of one receiver, driven by session events
pub struct MirrorSession {
    video: Mutex<VideoHandle>,
    audio: Mutex<Option<AudioHandle>>,
}

impl MirrorSession {
    pub fn new(video: VideoHandle, audio: Option<AudioHandle>) -> Self {
        Self {
            video: Mutex::new(video),
            audio: Mutex::new(audio),
        }
    }

    /// Build and start both renderers
    ///
    /// If either cannot be built, the other one is destroyed again before
    /// the error is returned.
    pub fn from_factory(factory: &RendererFactory) -> Result<Self> {
        let video = factory.create_video()?;
        let audio = factory.create_audio()?;
        let session = Self::new(video, Some(audio));
        session.start()?;
        Ok(session)
    }

    pub fn start(&self) -> Result<()> {
        self.video.lock().start()?;
        if let Some(audio) = self.audio.lock().as_mut() {
            audio.start()?;
        }
        Ok(())
    }

    /// A client connected
    pub fn open_connection(&self) -> Result<()> {
        info!("Connection opened");
        self.video.lock().notify_background_state(1)
    }

    /// A client disconnected
    pub fn close_connection(&self) -> Result<()> {
        info!("Connection closed");
        self.video.lock().notify_background_state(-1)
    }

    /// Submit one H.264 access unit; blocks until its pictures are shown
    pub fn video_process(&self, data: &[u8], pts: u64) -> Result<()> {
        let unit = AccessUnit::video(data, pts, unit_kind(data));
        self.video.lock().submit(&unit)
    }

    /// Submit one AAC frame; a session without audio ignores it
    pub fn audio_process(&self, data: &[u8], pts: u64) -> Result<()> {
        match self.audio.lock().as_mut() {
            Some(audio) => audio.submit(&AccessUnit::audio(data, pts)),
            None => Ok(()),
        }
    }

    pub fn video_flush(&self) -> Result<()> {
        self.video.lock().flush()
    }

    pub fn audio_flush(&self) -> Result<()> {
        match self.audio.lock().as_mut() {
            Some(audio) => audio.flush(),
            None => Ok(()),
        }
    }

    /// Apply a volume in AirPlay decibels (-144 mutes, -30..0 is audible)
    pub fn set_airplay_volume(&self, db: f32) -> Result<()> {
        let gain = airplay_volume_to_gain(db);
        debug!("AirPlay volume {} dB -> gain {:.3}", db, gain);
        match self.audio.lock().as_mut() {
            Some(audio) => audio.set_volume(gain),
            None => Ok(()),
        }
    }

    /// Destroy audio first, then video; later calls are no-ops
    pub fn shutdown(&self) -> Result<()> {
        let audio_result = match self.audio.lock().take() {
            Some(mut audio) => audio.destroy(),
            None => Ok(()),
        };

        let mut video = self.video.lock();
        if video.is_destroyed() {
            return audio_result;
        }
        let video_result = video.destroy();
        info!("Session shut down");

        audio_result.and(video_result)
    }
}

impl Drop for MirrorSession {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("Session shutdown failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::RendererConfig;
    use crate::utils::error::RendererError;

    #[test]
    fn test_from_factory_fails_without_display() {
        let mut config = RendererConfig::default();
        config.audio.device = "none".to_string();
        let factory = RendererFactory::new(config);
        assert!(matches!(
            MirrorSession::from_factory(&factory),
            Err(RendererError::BackendUnavailable(_))
        ));
    }
}
