//! Owning handle around a boxed renderer backend

use super::{AccessUnit, AudioRenderer, Backend, Renderer, VideoRenderer};
use crate::utils::error::{RendererError, Result};
use log::{info, warn};

/// Owns one backend and guards its lifecycle
///
/// `destroy` releases the backend exactly once; repeating it only logs a
/// warning. Every other operation on a destroyed handle fails with
/// [`RendererError::Destroyed`]. Dropping a live handle destroys it.
pub struct RendererHandle<R: Renderer + ?Sized> {
    backend: Backend,
    inner: Option<Box<R>>,
}

/// Handle to any video backend
pub type VideoHandle = RendererHandle<dyn VideoRenderer>;

/// Handle to any audio backend
pub type AudioHandle = RendererHandle<dyn AudioRenderer>;

impl<R: Renderer + ?Sized> RendererHandle<R> {
    pub fn new(inner: Box<R>) -> Self {
        Self {
            backend: inner.backend(),
            inner: Some(inner),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_none()
    }

    fn live(&mut self) -> Result<&mut R> {
        self.inner.as_deref_mut().ok_or(RendererError::Destroyed)
    }

    pub fn start(&mut self) -> Result<()> {
        self.live()?.start()
    }

    pub fn submit(&mut self, unit: &AccessUnit<'_>) -> Result<()> {
        self.live()?.submit(unit)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.live()?.flush()
    }

    /// Destroy the backend; a second call is a logged no-op
    pub fn destroy(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut inner) => {
                let result = inner.destroy();
                drop(inner);
                info!("{} renderer destroyed", self.backend);
                result
            }
            None => {
                warn!("{} renderer destroyed twice, ignoring", self.backend);
                Ok(())
            }
        }
    }
}

impl RendererHandle<dyn VideoRenderer> {
    pub fn notify_background_state(&mut self, delta: i32) -> Result<()> {
        self.live()?.notify_background_state(delta)
    }
}

impl RendererHandle<dyn AudioRenderer> {
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.live()?.set_volume(volume);
        Ok(())
    }

    pub fn volume(&self) -> Result<f32> {
        self.inner
            .as_deref()
            .map(|inner| inner.volume())
            .ok_or(RendererError::Destroyed)
    }
}

impl<R: Renderer + ?Sized> Drop for RendererHandle<R> {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            if let Err(err) = inner.destroy() {
                warn!("Destroying {} renderer on drop failed: {}", self.backend, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{AudioBackend, NullAudioRenderer};

    fn null_handle() -> AudioHandle {
        AudioHandle::new(Box::new(NullAudioRenderer::new(1.0)))
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut handle = null_handle();
        assert_eq!(handle.backend(), Backend::Audio(AudioBackend::Null));

        handle.start().unwrap();
        handle.destroy().unwrap();
        assert!(handle.is_destroyed());
        handle.destroy().unwrap();
    }

    #[test]
    fn test_operations_after_destroy_fail() {
        let mut handle = null_handle();
        handle.destroy().unwrap();

        assert!(matches!(handle.start(), Err(RendererError::Destroyed)));
        assert!(matches!(
            handle.submit(&AccessUnit::audio(&[1, 2, 3], 0)),
            Err(RendererError::Destroyed)
        ));
        assert!(matches!(handle.flush(), Err(RendererError::Destroyed)));
        assert!(matches!(handle.set_volume(0.5), Err(RendererError::Destroyed)));
        assert!(matches!(handle.volume(), Err(RendererError::Destroyed)));
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut handle = null_handle();
        handle.set_volume(2.5).unwrap();
        assert_eq!(handle.volume().unwrap(), 1.0);
        handle.set_volume(-1.0).unwrap();
        assert_eq!(handle.volume().unwrap(), 0.0);
    }
}
