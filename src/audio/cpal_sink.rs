//! cpal-backed audio sink
//!
//! cpal streams are not `Send`, so the stream lives on its own thread and is
//! driven through a command channel. Samples travel through a ring buffer
//! whose consumer half is shared with the stream callback behind a mutex, so
//! that `clear` takes effect before the next write lands.

use super::{clamp_volume, device_matches, s16le_to_f32, AtomicF32, AudioFormat, AudioSink, VolumeRamp};
use crate::utils::error::{IntoRendererError, RendererError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use crossbeam_channel::{bounded, unbounded, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

enum StreamCommand {
    Play,
    Pause,
    Shutdown,
}

/// State shared between the sink and the stream callback
struct SinkShared {
    volume: AtomicF32,
    playing: AtomicBool,
    underruns: AtomicU64,
    dropped_samples: AtomicU64,
}

/// Audio sink playing through a cpal output device
pub struct CpalSink {
    format: AudioFormat,
    device_name: String,
    producer: HeapProd<f32>,
    consumer: Arc<Mutex<HeapCons<f32>>>,
    shared: Arc<SinkShared>,
    control: Sender<StreamCommand>,
    worker: Option<thread::JoinHandle<()>>,
    scratch: Vec<f32>,
}

impl CpalSink {
    /// Open an output device and build a paused stream on it
    ///
    /// # Arguments
    ///
    /// * `selector` - "default", "hdmi", "analog" or part of a device name
    /// * `format` - PCM format that will be written
    /// * `buffer_ms` - Ring buffer length
    /// * `volume` - Initial linear gain
    pub fn open(selector: &str, format: AudioFormat, buffer_ms: u32, volume: f32) -> Result<Self> {
        let capacity = format.samples_for_millis(buffer_ms).max(format.channels as usize * 256);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let consumer = Arc::new(Mutex::new(consumer));

        let shared = Arc::new(SinkShared {
            volume: AtomicF32::new(clamp_volume(volume)),
            playing: AtomicBool::new(false),
            underruns: AtomicU64::new(0),
            dropped_samples: AtomicU64::new(0),
        });

        let (ready_tx, ready_rx) = bounded::<Result<String>>(1);
        let (control, commands) = unbounded::<StreamCommand>();

        let selector = selector.to_string();
        let stream_consumer = Arc::clone(&consumer);
        let stream_shared = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name("mirrorcast-audio".to_string())
            .spawn(move || {
                let stream = match build_stream(&selector, format, stream_consumer, stream_shared) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for command in commands.iter() {
                    let result = match command {
                        StreamCommand::Play => stream.play().audio_err("Failed to start audio stream"),
                        StreamCommand::Pause => stream.pause().audio_err("Failed to pause audio stream"),
                        StreamCommand::Shutdown => break,
                    };
                    if let Err(err) = result {
                        warn!("{}", err);
                    }
                }

                debug!("Audio stream thread exiting");
            })
            .audio_err("Failed to spawn audio thread")?;

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(RendererError::Audio("Audio thread exited during setup".to_string()));
            }
        };

        info!(
            "Audio sink on '{}': {}, {} ms buffer",
            device_name, format, buffer_ms
        );

        Ok(Self {
            format,
            device_name,
            producer,
            consumer,
            shared,
            control,
            worker: Some(worker),
            scratch: Vec::new(),
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Interleaved samples waiting to be played
    pub fn buffered_samples(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Number of callbacks that ran out of samples
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Samples discarded because the ring buffer was full
    pub fn dropped_samples(&self) -> u64 {
        self.shared.dropped_samples.load(Ordering::Relaxed)
    }

    fn send(&self, command: StreamCommand) -> Result<()> {
        self.control
            .send(command)
            .map_err(|_| RendererError::Audio("Audio stream thread is gone".to_string()))
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self) -> Result<()> {
        if !self.shared.playing.swap(true, Ordering::AcqRel) {
            self.send(StreamCommand::Play)?;
        }
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        s16le_to_f32(pcm, &mut self.scratch);
        let pushed = self.producer.push_slice(&self.scratch);

        if pushed < self.scratch.len() {
            let dropped = (self.scratch.len() - pushed) as u64;
            self.shared.dropped_samples.fetch_add(dropped, Ordering::Relaxed);
            debug!("Audio ring buffer full, dropped {} samples", dropped);
        }

        Ok(pushed * 2)
    }

    fn clear(&mut self) -> Result<()> {
        let cleared = self.consumer.lock().clear();
        debug!("Cleared {} buffered samples", cleared);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.shared.playing.swap(false, Ordering::AcqRel) {
            self.send(StreamCommand::Pause)?;
        }
        info!(
            "Audio output stopped: {} underruns, {} samples dropped, {} still buffered",
            self.underruns(),
            self.dropped_samples(),
            self.buffered_samples()
        );
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.volume.store(clamp_volume(volume), Ordering::Relaxed);
    }

    fn volume(&self) -> f32 {
        self.shared.volume.load(Ordering::Relaxed)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.control.send(StreamCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Audio stream thread panicked");
            }
        }
    }
}

fn select_device(host: &cpal::Host, selector: &str) -> Result<cpal::Device> {
    if selector.eq_ignore_ascii_case("default") {
        return host
            .default_output_device()
            .ok_or_else(|| RendererError::unavailable("No default output device found"));
    }

    for device in host.output_devices().audio_err("Failed to enumerate output devices")? {
        if let Ok(name) = device.name() {
            if device_matches(&name, selector) {
                return Ok(device);
            }
        }
    }

    Err(RendererError::unavailable(format!("Audio device '{}' not found", selector)))
}

fn build_stream(
    selector: &str,
    format: AudioFormat,
    consumer: Arc<Mutex<HeapCons<f32>>>,
    shared: Arc<SinkShared>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = select_device(&host, selector)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut ramp = VolumeRamp::new(shared.volume.load(Ordering::Relaxed));
    let callback_shared = Arc::clone(&shared);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !callback_shared.playing.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }

                ramp.retarget(callback_shared.volume.load(Ordering::Relaxed));

                let read = consumer.lock().pop_slice(data);
                for sample in &mut data[..read] {
                    *sample = ramp.process(*sample);
                }

                if read < data.len() {
                    data[read..].fill(0.0);
                    callback_shared.underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .audio_err("Failed to create audio stream")?;

    // Streams may start running on creation; keep silent until `start`
    if let Err(err) = stream.pause() {
        debug!("Audio stream cannot be paused ({}), relying on silence", err);
    }

    Ok((stream, name))
}
