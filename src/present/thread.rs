//! Dedicated presentation thread for surfaces without an event loop

use super::{PresentQueue, PresentTask, PresentationSurface};
use crate::utils::error::{IntoRendererError, RendererError, Result};
use crossbeam_channel::{unbounded, Sender};
use log::{debug, error};
use std::thread;

/// Owns a surface on its own thread and runs posted tasks in order
///
/// The thread exits once the queue is dropped.
pub struct PresentationThread {
    sender: Option<Sender<PresentTask>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PresentationThread {
    /// Move `surface` onto a new thread named `name`
    pub fn spawn<S>(name: &str, surface: S) -> Result<Self>
    where
        S: PresentationSurface + Send + 'static,
    {
        let (sender, tasks) = unbounded::<PresentTask>();

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut surface = surface;
                for task in tasks.iter() {
                    task(&mut surface as &mut dyn PresentationSurface);
                }
                debug!("Presentation thread exiting");
            })
            .surface_err("Failed to spawn presentation thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl PresentQueue for PresentationThread {
    fn post(&self, task: PresentTask) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| RendererError::Surface("Presentation thread stopped".to_string()))?
            .send(task)
            .map_err(|_| RendererError::Surface("Presentation thread stopped".to_string()))
    }
}

impl Drop for PresentationThread {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Presentation thread panicked");
            }
        }
    }
}
