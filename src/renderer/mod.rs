//! Renderer interface
//!
//! The session layer talks to every backend through the same small set of
//! operations. A backend is chosen once, by the [`RendererFactory`], and is
//! then only reachable through a [`RendererHandle`], which enforces the
//! destroy-once rule for all of them.

mod access_unit;
mod audio;
mod dump;
mod factory;
mod handle;
mod video;

pub use access_unit::{AccessUnit, UnitKind};
pub use audio::{AudioPipeline, NullAudioRenderer};
pub use dump::BitstreamDump;
pub use factory::RendererFactory;
pub use handle::{AudioHandle, RendererHandle, VideoHandle};
pub use video::{VideoPipeline, VideoSettings};

use crate::utils::error::{RendererError, Result};
use std::fmt;
use std::str::FromStr;

/// Video backends the factory can build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoBackend {
    /// Software decode, presented through wgpu on a winit window
    Wgpu,
    /// Software decode, frames handed to an embedding toolkit
    Callback,
}

/// Audio backends the factory can build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    /// Decode and play through a cpal output device
    Cpal,
    /// Audio disabled; units are accepted and discarded
    Null,
}

/// Tag identifying the backend behind a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Video(VideoBackend),
    Audio(AudioBackend),
}

impl VideoBackend {
    pub fn name(&self) -> &'static str {
        match self {
            VideoBackend::Wgpu => "wgpu",
            VideoBackend::Callback => "callback",
        }
    }
}

impl FromStr for VideoBackend {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" => Ok(VideoBackend::Wgpu),
            "callback" => Ok(VideoBackend::Callback),
            other => Err(RendererError::unavailable(format!("Unknown video backend '{}'", other))),
        }
    }
}

impl AudioBackend {
    /// Backend implied by an audio device selector
    pub fn for_device(device: &str) -> Self {
        if device.eq_ignore_ascii_case("none") {
            AudioBackend::Null
        } else {
            AudioBackend::Cpal
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioBackend::Cpal => "cpal",
            AudioBackend::Null => "null",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Video(backend) => write!(f, "{} video", backend.name()),
            Backend::Audio(backend) => write!(f, "{} audio", backend.name()),
        }
    }
}

/// Operations shared by every renderer
pub trait Renderer: Send {
    /// Which backend this is
    fn backend(&self) -> Backend;

    /// Prepare the backend; calling it again is a no-op
    fn start(&mut self) -> Result<()>;

    /// Consume one access unit
    ///
    /// # Arguments
    ///
    /// * `unit` - Compressed unit; its bytes are copied before anything else happens
    ///
    /// # Returns
    ///
    /// Ok even when the unit could not be decoded; only lifecycle and
    /// presentation-context failures are reported
    fn submit(&mut self, unit: &AccessUnit<'_>) -> Result<()>;

    /// Discard buffered and in-flight decode state, keeping the codec open
    fn flush(&mut self) -> Result<()>;

    /// Release every native resource
    fn destroy(&mut self) -> Result<()>;
}

/// Video-specific operations
pub trait VideoRenderer: Renderer {
    /// Adjust the active connection count by `delta`
    ///
    /// Drives what the surface shows while nobody is connected; never touches
    /// decoder state.
    fn notify_background_state(&mut self, delta: i32) -> Result<()>;
}

/// Audio-specific operations
pub trait AudioRenderer: Renderer {
    /// Set the playback gain, clamped to 0.0 - 1.0
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;
}
