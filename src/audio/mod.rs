//! Audio output module
//!
//! Decoded PCM leaves the audio pipeline through an [`AudioSink`]. The sink
//! owns its buffering and applies volume; the pipeline only writes samples in
//! submission order and asks for a clear on flush.

mod cpal_sink;

pub use cpal_sink::CpalSink;

use crate::utils::error::Result;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Volume ramp duration for smooth transitions (in samples)
pub const VOLUME_RAMP_SAMPLES: usize = 512;

/// PCM format written to sinks: always interleaved signed 16-bit little endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
        }
    }
}

impl AudioFormat {
    /// Bytes in one frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * 2
    }

    /// Interleaved samples needed to hold `millis` of audio
    pub fn samples_for_millis(&self, millis: u32) -> usize {
        self.sample_rate as usize * self.channels as usize * millis as usize / 1000
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, s16le", self.sample_rate, self.channels)
    }
}

/// Destination for decoded PCM
pub trait AudioSink: Send {
    /// Start (or resume) playback
    fn start(&mut self) -> Result<()>;

    /// Queue interleaved S16LE samples
    ///
    /// # Arguments
    ///
    /// * `pcm` - Raw bytes in the sink's [`AudioFormat`]
    ///
    /// # Returns
    ///
    /// Number of bytes accepted; the rest was dropped because the sink is full
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;

    /// Drop everything buffered but not yet played
    fn clear(&mut self) -> Result<()>;

    /// Stop playback; buffered samples are kept
    fn stop(&mut self) -> Result<()>;

    /// Set the linear gain, clamped to 0.0 - 1.0
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;
}

/// Clamp a requested volume into `[0.0, 1.0]`; NaN mutes
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Lock-free f32 shared with the audio callback
#[derive(Debug)]
pub struct AtomicF32 {
    inner: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.inner.load(ordering))
    }

    pub fn store(&self, value: f32, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }
}

/// Gain with smooth transitions, owned by the audio callback
#[derive(Debug, Clone)]
pub struct VolumeRamp {
    current: f32,
    target: f32,
    remaining: usize,
}

impl VolumeRamp {
    pub fn new(volume: f32) -> Self {
        let volume = clamp_volume(volume);
        Self {
            current: volume,
            target: volume,
            remaining: 0,
        }
    }

    /// Start ramping towards `volume` unless it is already the target
    pub fn retarget(&mut self, volume: f32) {
        let volume = clamp_volume(volume);
        if (volume - self.target).abs() > f32::EPSILON {
            self.target = volume;
            self.remaining = VOLUME_RAMP_SAMPLES;
        }
    }

    /// Apply the gain to one sample
    pub fn process(&mut self, sample: f32) -> f32 {
        if self.remaining > 0 {
            let step = (self.target - self.current) / self.remaining as f32;
            self.current += step;
            self.remaining -= 1;

            if self.remaining == 0 {
                self.current = self.target;
            }
        }

        sample * self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }
}

/// Whether an output device called `name` satisfies a device selector
///
/// `hdmi` and `analog` pick the first device of that kind; anything else is
/// a case-insensitive substring of the device name.
pub fn device_matches(name: &str, selector: &str) -> bool {
    let name = name.to_lowercase();
    let selector = selector.to_lowercase();

    match selector.as_str() {
        "hdmi" => name.contains("hdmi"),
        "analog" => {
            !name.contains("hdmi")
                && (name.contains("analog") || name.contains("headphone") || name.contains("speaker"))
        }
        _ => name.contains(&selector),
    }
}

/// Decode little-endian S16 bytes into normalised f32 samples
pub fn s16le_to_f32(pcm: &[u8], out: &mut Vec<f32>) {
    out.clear();
    out.extend(
        pcm.chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format() {
        let format = AudioFormat::default();
        assert_eq!(format.sample_rate, 44_100);
        assert_eq!(format.channels, 2);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.samples_for_millis(500), 44_100);
        assert_eq!(format.to_string(), "44100 Hz, 2 ch, s16le");
    }

    #[test]
    fn test_volume_ramp() {
        let mut ramp = VolumeRamp::new(1.0);
        assert_eq!(ramp.process(0.5), 0.5);

        ramp.retarget(0.5);
        let _ = ramp.process(1.0);
        assert!(ramp.current() < 1.0);
        assert!(ramp.current() > 0.5);

        for _ in 0..VOLUME_RAMP_SAMPLES {
            ramp.process(1.0);
        }
        assert_eq!(ramp.current(), 0.5);
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(0.4), 0.4);
        assert_eq!(clamp_volume(-1.0), 0.0);
        assert_eq!(clamp_volume(f32::INFINITY), 1.0);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_ramp_clamps() {
        let mut ramp = VolumeRamp::new(3.0);
        assert_eq!(ramp.current(), 1.0);
        ramp.retarget(-1.0);
        for _ in 0..VOLUME_RAMP_SAMPLES {
            ramp.process(1.0);
        }
        assert_eq!(ramp.current(), 0.0);
    }

    #[test]
    fn test_device_matching() {
        assert!(device_matches("HDMI 0 Output", "hdmi"));
        assert!(!device_matches("Built-in Analog Stereo", "hdmi"));
        assert!(device_matches("Built-in Analog Stereo", "analog"));
        assert!(device_matches("USB Headphones", "analog"));
        assert!(!device_matches("HDMI Speaker", "analog"));
        assert!(device_matches("Scarlett 2i2 USB", "scarlett"));
    }

    #[test]
    fn test_s16le_conversion() {
        let mut out = Vec::new();
        s16le_to_f32(&[0x00, 0x80, 0x00, 0x00, 0xff, 0x7f, 0x01], &mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], -1.0);
        assert_eq!(out[1], 0.0);
        assert!(out[2] > 0.999);
    }

    #[test]
    fn test_atomic_f32() {
        let value = AtomicF32::new(0.25);
        assert_eq!(value.load(Ordering::Relaxed), 0.25);
        value.store(0.75, Ordering::Relaxed);
        assert_eq!(value.load(Ordering::Relaxed), 0.75);
    }
}
