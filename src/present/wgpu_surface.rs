//! wgpu presentation surface on a winit window
//!
//! Lives on the event-loop thread. The logical size tracks the frames being
//! presented; the swapchain follows whatever physical size the window
//! actually has, and the blit stretches the frame to fill it.

use super::blit::BlitPipeline;
use super::{ConvertedFrame, PresentationSurface};
use crate::convert::Geometry;
use crate::utils::error::{IntoRendererError, RendererError, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// GPU-backed surface drawing into a window
pub struct WgpuSurface {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    blit: BlitPipeline,
    /// Size of the frames being shown
    size: Geometry,
    /// Whether the texture holds a frame worth redrawing
    has_frame: bool,
}

impl WgpuSurface {
    /// Create a surface for `window`, blocking on adapter and device setup
    pub fn new(window: Arc<Window>) -> Result<Self> {
        pollster::block_on(Self::init(window))
    }

    async fn init(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let surface = instance
            .create_surface(Arc::clone(&window))
            .surface_err("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .surface_err("Failed to find suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Mirrorcast GPU Device"),
                ..Default::default()
            })
            .await
            .surface_err("Failed to create GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| RendererError::Surface("Surface reports no formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let physical = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: physical.width.max(1),
            height: physical.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let blit = BlitPipeline::new(&device, format);
        info!("wgpu surface ready: {:?} on {}", format, adapter.get_info().name);

        Ok(Self {
            size: Geometry::new(physical.width, physical.height),
            window,
            surface,
            device,
            queue,
            config,
            blit,
            has_frame: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Follow a physical resize of the window
    pub fn reconfigure(&mut self, physical: PhysicalSize<u32>) {
        if physical.width == 0 || physical.height == 0 {
            return;
        }
        if self.config.width != physical.width || self.config.height != physical.height {
            self.config.width = physical.width;
            self.config.height = physical.height;
            self.surface.configure(&self.device, &self.config);
            debug!("Swapchain reconfigured to {}x{}", physical.width, physical.height);
        }
    }

    /// Draw again whatever was last shown
    pub fn redraw(&mut self) -> Result<()> {
        self.render(self.has_frame)
    }

    fn render(&mut self, with_frame: bool) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(RendererError::Surface("Out of GPU memory".to_string()));
            }
            Err(err) => {
                warn!("Surface texture acquisition failed: {:?}", err);
                return Ok(());
            }
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Blit Encoder"),
        });
        self.blit.draw(&mut encoder, &view, with_frame);

        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();

        Ok(())
    }
}

impl PresentationSurface for WgpuSurface {
    fn size(&self) -> Geometry {
        self.size
    }

    fn resize(&mut self, size: Geometry) -> Result<()> {
        self.size = size;
        if let Some(applied) = self
            .window
            .request_inner_size(PhysicalSize::new(size.width, size.height))
        {
            self.reconfigure(applied);
        }
        info!("Window resized to {}", size);
        Ok(())
    }

    fn upload(&mut self, frame: &ConvertedFrame) -> Result<()> {
        self.blit.upload(&self.device, &self.queue, frame)?;
        self.has_frame = true;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.render(true)
    }

    fn clear(&mut self) -> Result<()> {
        self.has_frame = false;
        self.render(false)
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.window.set_visible(visible);
        Ok(())
    }
}
