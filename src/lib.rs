//! Rendering backend for screen-mirroring receivers
//!
//! A session layer hands over compressed, timestamped access units; this
//! crate decodes them, converts pictures for the active display surface and
//! plays audio through a sound device. Backends are picked once by the
//! [`RendererFactory`] and then driven through [`RendererHandle`]s, or
//! through a [`MirrorSession`] that wires session events to both of them.

pub mod audio;
pub mod bitstream;
pub mod convert;
pub mod decoder;
pub mod present;
pub mod renderer;
pub mod session;
pub mod utils;
pub mod window;

pub use renderer::{
    AccessUnit, AudioBackend, AudioHandle, Backend, RendererFactory, RendererHandle, UnitKind, VideoBackend,
    VideoHandle,
};
pub use session::MirrorSession;
pub use utils::config::{Config, RendererConfig};
pub use utils::error::{RendererError, Result};
