//! Surface that hands frames to an embedding toolkit

use super::{ConvertedFrame, Orientation, PresentationSurface};
use crate::convert::Geometry;
use crate::utils::error::Result;
use std::sync::Arc;

/// A converted frame, borrowed for the duration of the callback
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Packed pixels, `stride` bytes per row
    pub data: &'a [u8],
    pub stride: usize,
    pub width: u32,
    pub height: u32,
    pub pts: u64,
    pub orientation: Orientation,
}

/// What the toolkit is told
#[derive(Debug, Clone, Copy)]
pub enum SurfaceEvent<'a> {
    /// The display area should take this size
    Resized(Geometry),
    /// A new frame is ready; copy it before returning
    Frame(FrameView<'a>),
    /// No connection is active; paint the background
    Idle,
    /// Show or hide the display area
    Visibility(bool),
}

/// Callback invoked on the presentation thread
pub type FrameCallback = Arc<dyn Fn(SurfaceEvent<'_>) + Send + Sync>;

/// Presentation surface backed by a toolkit callback
///
/// The toolkit schedules its own repaint, so the frame is delivered on
/// upload and `present` only counts.
pub struct CallbackSurface {
    callback: FrameCallback,
    size: Geometry,
    presented: u64,
}

impl CallbackSurface {
    pub fn new(callback: FrameCallback) -> Self {
        Self {
            callback,
            size: Geometry::default(),
            presented: 0,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl PresentationSurface for CallbackSurface {
    fn size(&self) -> Geometry {
        self.size
    }

    fn resize(&mut self, size: Geometry) -> Result<()> {
        self.size = size;
        (self.callback)(SurfaceEvent::Resized(size));
        Ok(())
    }

    fn upload(&mut self, frame: &ConvertedFrame) -> Result<()> {
        let size = frame.geometry();
        (self.callback)(SurfaceEvent::Frame(FrameView {
            data: frame.pixels(),
            stride: frame.stride(),
            width: size.width,
            height: size.height,
            pts: frame.pts,
            orientation: frame.orientation,
        }));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presented += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        (self.callback)(SurfaceEvent::Idle);
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        (self.callback)(SurfaceEvent::Visibility(visible));
        Ok(())
    }
}
