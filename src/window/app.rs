//! winit application handler owning the window and its surface

use super::WindowSettings;
use crate::present::{PresentTask, PresentationSurface, WgpuSurface};
use crate::utils::error::{RendererError, Result};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

pub(super) struct App {
    settings: WindowSettings,
    surface: Option<WgpuSurface>,
    /// Tasks that arrived before the surface existed
    pending: Vec<PresentTask>,
    failure: Option<RendererError>,
    /// Set by [`super::WindowQueue::close`]
    closing: Arc<AtomicBool>,
}

impl App {
    pub(super) fn new(settings: WindowSettings, closing: Arc<AtomicBool>) -> Self {
        Self {
            settings,
            surface: None,
            pending: Vec::new(),
            failure: None,
            closing,
        }
    }

    /// Outcome of the run, once the loop has exited
    pub(super) fn into_result(self) -> Result<()> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn create_surface(&self, event_loop: &ActiveEventLoop) -> Result<WgpuSurface> {
        let size = self.settings.initial_size;
        let attributes = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(PhysicalSize::new(size.width, size.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attributes)
            .map_err(|err| RendererError::Window(format!("Failed to create window: {}", err)))?;

        WgpuSurface::new(Arc::new(window))
    }

    fn run_task(&mut self, task: PresentTask) {
        match self.surface.as_mut() {
            Some(surface) => task(surface as &mut dyn PresentationSurface),
            None => self.pending.push(task),
        }
    }

    fn toggle_fullscreen(&self) {
        if let Some(surface) = self.surface.as_ref() {
            let window = surface.window();
            if window.fullscreen().is_some() {
                window.set_fullscreen(None);
            } else {
                window.set_fullscreen(Some(Fullscreen::Borderless(window.current_monitor())));
            }
        }
    }
}

impl ApplicationHandler<PresentTask> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }

        match self.create_surface(event_loop) {
            Ok(surface) => {
                info!("Window created: {}", self.settings.initial_size);
                self.surface = Some(surface);
                for task in std::mem::take(&mut self.pending) {
                    self.run_task(task);
                }
            }
            Err(err) => {
                error!("Cannot present video: {}", err);
                self.pending.clear();
                self.failure = Some(err);
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, task: PresentTask) {
        if self.closing.load(Ordering::SeqCst) {
            info!("Window close requested by the player");
            event_loop.exit();
            return;
        }
        self.run_task(task);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(surface) = self.surface.as_mut() {
                    surface.reconfigure(size);
                    surface.window().request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(surface) = self.surface.as_mut() {
                    if let Err(err) = surface.redraw() {
                        warn!("Redraw failed: {}", err);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape | KeyCode::KeyQ => event_loop.exit(),
                KeyCode::KeyF => self.toggle_fullscreen(),
                _ => {}
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        let dropped = self.pending.len();
        self.pending.clear();
        self.surface = None;
        debug!("Event loop exiting, {} queued tasks dropped", dropped);
    }
}
