//! Audio renderers

use super::{AccessUnit, AudioBackend, AudioRenderer, Backend, Renderer};
use crate::audio::{clamp_volume, AudioSink};
use crate::decoder::{AudioDecoder, DecodeError, DecoderState};
use crate::utils::error::{RendererError, Result};
use log::{debug, error, info, warn};

/// Decodes units synchronously and queues the PCM on a sink
///
/// Samples reach the sink in submission order. The sink does its own
/// buffering, so `submit` never waits for playback.
pub struct AudioPipeline {
    backend: AudioBackend,
    decoder: Box<dyn AudioDecoder>,
    sink: Box<dyn AudioSink>,
    state: DecoderState,
    /// Reused PCM scratch buffer
    pcm: Vec<u8>,
    bytes_written: u64,
    reopens: u64,
}

impl AudioPipeline {
    pub fn new(backend: AudioBackend, decoder: Box<dyn AudioDecoder>, sink: Box<dyn AudioSink>) -> Self {
        Self {
            backend,
            decoder,
            sink,
            state: DecoderState::Uninitialized,
            pcm: Vec::with_capacity(8192),
            bytes_written: 0,
            reopens: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// PCM bytes accepted by the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn decoder_reopens(&self) -> u64 {
        self.reopens
    }

    fn recover(&mut self, reason: &str) -> Result<()> {
        error!("Audio decoder failed ({}), reopening it", reason);
        match self.decoder.reopen() {
            Ok(()) => {
                self.reopens += 1;
                self.state = DecoderState::Ready;
                Ok(())
            }
            Err(err) => {
                error!("Reopening audio decoder failed: {}", err);
                self.decoder.close();
                self.state = DecoderState::Closed;
                Err(err)
            }
        }
    }
}

impl Renderer for AudioPipeline {
    fn backend(&self) -> Backend {
        Backend::Audio(self.backend)
    }

    fn start(&mut self) -> Result<()> {
        match self.state {
            DecoderState::Uninitialized => {}
            DecoderState::Closed => return Err(RendererError::decoder_error("audio decoder is closed")),
            _ => return Ok(()),
        }

        self.sink.start()?;
        self.state = DecoderState::Ready;
        info!("{} renderer started", self.backend());
        Ok(())
    }

    fn submit(&mut self, unit: &AccessUnit<'_>) -> Result<()> {
        match self.state {
            DecoderState::Closed => return Err(RendererError::decoder_error("audio decoder is closed")),
            DecoderState::Uninitialized => self.start()?,
            _ => {}
        }

        self.state = DecoderState::Decoding;
        self.pcm.clear();
        match self.decoder.decode(unit, &mut self.pcm) {
            Ok(0) => Ok(()),
            Ok(decoded) => {
                let accepted = self.sink.write(&self.pcm)?;
                self.bytes_written += accepted as u64;
                if accepted < decoded {
                    debug!("Sink accepted {} of {} bytes at {} us", accepted, decoded, unit.pts);
                }
                Ok(())
            }
            Err(DecodeError::InvalidData) => {
                warn!("Dropping malformed audio unit at {} us", unit.pts);
                Ok(())
            }
            Err(DecodeError::Fatal(reason)) => self.recover(&reason),
            Err(err) => {
                debug!("Audio decoder returned nothing at {} us: {}", unit.pts, err);
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        if matches!(self.state, DecoderState::Uninitialized | DecoderState::Closed) {
            debug!("Flush ignored, audio decoder is {:?}", self.state);
            return Ok(());
        }

        self.state = DecoderState::Draining;
        self.decoder.flush();
        self.sink.clear()?;
        self.state = DecoderState::Ready;
        info!("Audio renderer flushed");
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        let stopped = self.sink.stop();
        self.decoder.close();
        self.state = DecoderState::Closed;
        info!("{} renderer closed after {} PCM bytes", self.backend(), self.bytes_written);
        stopped
    }
}

impl AudioRenderer for AudioPipeline {
    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(clamp_volume(volume));
    }

    fn volume(&self) -> f32 {
        self.sink.volume()
    }
}

/// Audio disabled: every unit is accepted and discarded
pub struct NullAudioRenderer {
    volume: f32,
    started: bool,
    units: u64,
}

impl NullAudioRenderer {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: clamp_volume(volume),
            started: false,
            units: 0,
        }
    }

    /// Units discarded so far
    pub fn units(&self) -> u64 {
        self.units
    }
}

impl Renderer for NullAudioRenderer {
    fn backend(&self) -> Backend {
        Backend::Audio(AudioBackend::Null)
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.started = true;
            info!("Audio output disabled, discarding audio units");
        }
        Ok(())
    }

    fn submit(&mut self, _unit: &AccessUnit<'_>) -> Result<()> {
        self.units += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        debug!("Null audio renderer discarded {} units", self.units);
        Ok(())
    }
}

impl AudioRenderer for NullAudioRenderer {
    fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    fn volume(&self) -> f32 {
        self.volume
    }
}
