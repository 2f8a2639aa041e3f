//! Window management for the wgpu backend
//!
//! winit insists on running its event loop on the main thread, so the
//! window and its [`WgpuSurface`](crate::present::WgpuSurface) live there.
//! Decode threads reach them through a [`WindowQueue`], which turns each
//! [`PresentTask`] into a user event on the loop.

mod app;

use crate::convert::Geometry;
use crate::present::{PresentQueue, PresentTask, PresentationSurface};
use crate::utils::error::{IntoRendererError, RendererError, Result};
use app::App;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use winit::event_loop::{EventLoop, EventLoopProxy};

/// How the window starts out
#[derive(Debug, Clone)]
pub struct WindowSettings {
    /// Window title
    pub title: String,

    /// Inner size until the first frame arrives
    pub initial_size: Geometry,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Mirrorcast".to_string(),
            initial_size: Geometry::new(1280, 720),
        }
    }
}

/// Event loop carrying present tasks as user events
pub fn create_event_loop() -> Result<EventLoop<PresentTask>> {
    EventLoop::<PresentTask>::with_user_event()
        .build()
        .window_err("Failed to create event loop")
}

/// Posts present tasks to the window's event loop
///
/// Tasks posted before the window exists are held until it does.
pub struct WindowQueue {
    proxy: Mutex<EventLoopProxy<PresentTask>>,
    closing: Arc<AtomicBool>,
}

impl WindowQueue {
    pub fn new(event_loop: &EventLoop<PresentTask>) -> Self {
        Self {
            proxy: Mutex::new(event_loop.create_proxy()),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the event loop to exit, as if the window had been closed
    ///
    /// Tasks still queued are dropped.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        // Wakes the loop; the task itself is discarded
        let _ = self.post(Box::new(|_surface: &mut dyn PresentationSurface| {}));
    }
}

impl PresentQueue for WindowQueue {
    fn post(&self, task: PresentTask) -> Result<()> {
        self.proxy
            .lock()
            .send_event(task)
            .map_err(|_| RendererError::Surface("Window event loop has exited".to_string()))
    }
}

/// Run the event loop until the window is closed
///
/// Blocks the calling thread, which must be the main thread. Tasks still
/// queued when the loop exits are dropped, which fails the presentations
/// waiting on them instead of leaving them blocked.
pub fn run(event_loop: EventLoop<PresentTask>, queue: &WindowQueue, settings: WindowSettings) -> Result<()> {
    let mut app = App::new(settings, Arc::clone(&queue.closing));
    event_loop.run_app(&mut app).window_err("Event loop error")?;
    app.into_result()
}
