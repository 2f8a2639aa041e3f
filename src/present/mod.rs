//! Presentation dispatch
//!
//! The presentation surface belongs to another execution context (the winit
//! event loop, or a dedicated thread for toolkit callbacks). Decode threads
//! never touch it directly: they post a [`PresentTask`] through a
//! [`PresentQueue`] and wait for the task to hand the converted buffer back.
//! Because the buffer is moved into the task, a pipeline cannot start a
//! second presentation before the first one has finished.

mod blit;
mod callback;
mod thread;
mod wgpu_surface;

pub use callback::{CallbackSurface, FrameCallback, FrameView, SurfaceEvent};
pub use thread::PresentationThread;
pub use wgpu_surface::WgpuSurface;

use crate::convert::Geometry;
use crate::utils::config::{Flip, Rotation};
use crate::utils::error::{RendererError, Result};
use crossbeam_channel::bounded;
use ffmpeg_next::util::frame;
use log::warn;
use std::sync::Arc;

/// Work executed on the presentation context
pub type PresentTask = Box<dyn FnOnce(&mut dyn PresentationSurface) + Send>;

/// Something that runs [`PresentTask`]s on the context owning a surface
pub trait PresentQueue: Send + Sync {
    /// Queue a task; it runs after every task posted before it
    ///
    /// # Returns
    ///
    /// An error if the presentation context no longer accepts work
    fn post(&self, task: PresentTask) -> Result<()>;
}

/// On-screen target, only ever used from its owning context
pub trait PresentationSurface {
    /// Current logical size
    fn size(&self) -> Geometry;

    /// Resize the surface (and its window, if any)
    fn resize(&mut self, size: Geometry) -> Result<()>;

    /// Copy a converted frame into the surface's backing store
    fn upload(&mut self, frame: &ConvertedFrame) -> Result<()>;

    /// Show what was last uploaded
    fn present(&mut self) -> Result<()>;

    /// Paint the idle background
    fn clear(&mut self) -> Result<()>;

    /// Show or hide the surface
    fn set_visible(&mut self, visible: bool) -> Result<()>;
}

/// Rotation and mirroring applied when a frame is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Orientation {
    pub rotation: Rotation,
    pub flip: Flip,
}

impl Orientation {
    pub fn new(rotation: Rotation, flip: Flip) -> Self {
        Self { rotation, flip }
    }

    /// Size of a `frame`-sized picture once it is on screen
    pub fn display_geometry(&self, frame: Geometry) -> Geometry {
        if self.rotation.swaps_axes() {
            frame.transposed()
        } else {
            frame
        }
    }

    /// Maps centred screen texture coordinates to centred frame coordinates
    ///
    /// Column-major, as WGSL expects it. Only the upper 2x2 block is used.
    pub fn uv_transform(&self) -> [[f32; 4]; 4] {
        // frame = R * F * screen, rows of R as (a, b) and (c, d)
        let (a, b, c, d) = match self.rotation {
            Rotation::None => (1.0, 0.0, 0.0, 1.0),
            Rotation::Quarter => (0.0, 1.0, -1.0, 0.0),
            Rotation::Half => (-1.0, 0.0, 0.0, -1.0),
            Rotation::ThreeQuarter => (0.0, -1.0, 1.0, 0.0),
        };
        let (fx, fy) = match self.flip {
            Flip::None => (1.0, 1.0),
            Flip::Horizontal => (-1.0, 1.0),
            Flip::Vertical => (1.0, -1.0),
        };

        [
            [a * fx, c * fx, 0.0, 0.0],
            [b * fy, d * fy, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

/// A picture converted to the surface's pixel format, ready for upload
pub struct ConvertedFrame {
    /// Packed pixels in plane 0
    pub buffer: frame::Video,

    /// Presentation timestamp in microseconds
    pub pts: u64,

    pub orientation: Orientation,
}

impl ConvertedFrame {
    pub fn geometry(&self) -> Geometry {
        Geometry::of(&self.buffer)
    }

    /// Geometry the surface must have to show this frame unscaled
    pub fn display_geometry(&self) -> Geometry {
        self.orientation.display_geometry(self.geometry())
    }

    pub fn pixels(&self) -> &[u8] {
        self.buffer.data(0)
    }

    /// Bytes per row in [`pixels`](Self::pixels), padding included
    pub fn stride(&self) -> usize {
        self.buffer.stride(0)
    }
}

/// Posts frames to a presentation context and waits for them to be shown
#[derive(Clone)]
pub struct Presenter {
    queue: Arc<dyn PresentQueue>,
}

impl Presenter {
    pub fn new(queue: Arc<dyn PresentQueue>) -> Self {
        Self { queue }
    }

    /// Show a frame, blocking until the presentation context is done with it
    ///
    /// The task resizes the surface before uploading whenever the frame's
    /// geometry differs from the surface's. Surface-level failures are logged
    /// and the frame is still returned.
    ///
    /// # Returns
    ///
    /// The frame, so its buffer can be reused for the next conversion
    pub fn present(&self, frame: ConvertedFrame) -> Result<ConvertedFrame> {
        let (done_tx, done_rx) = bounded(1);

        self.queue.post(Box::new(move |surface: &mut dyn PresentationSurface| {
            let outcome = show_frame(surface, &frame);
            let _ = done_tx.send((frame, outcome));
        }))?;

        match done_rx.recv() {
            Ok((frame, Ok(()))) => Ok(frame),
            Ok((frame, Err(err))) => {
                warn!("Presenting frame at {} us failed: {}", frame.pts, err);
                Ok(frame)
            }
            Err(_) => Err(dropped_task()),
        }
    }

    /// Run arbitrary surface work on the presentation context and wait for it
    pub fn run<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut dyn PresentationSurface) -> Result<()> + Send + 'static,
    {
        let (done_tx, done_rx) = bounded(1);

        self.queue.post(Box::new(move |surface: &mut dyn PresentationSurface| {
            let _ = done_tx.send(job(surface));
        }))?;

        done_rx.recv().map_err(|_| dropped_task())?
    }
}

fn show_frame(surface: &mut dyn PresentationSurface, frame: &ConvertedFrame) -> Result<()> {
    let size = frame.display_geometry();
    if surface.size() != size {
        surface.resize(size)?;
    }
    surface.upload(frame)?;
    surface.present()
}

fn dropped_task() -> RendererError {
    RendererError::Surface("Presentation context dropped the task".to_string())
}
