//! Utility module for the mirrorcast renderers
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Configuration management
//! - Logging setup for FFmpeg

pub mod config;
pub mod error;

pub use config::{AudioConfig, BackgroundMode, Config, Flip, RendererConfig, Rotation, VideoConfig};
pub use error::{IntoRendererError, RendererError, Result};

use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

/// Initialize FFmpeg once per process
///
/// Safe to call from every decoder constructor. FFmpeg's own logging is
/// lowered to warnings so it does not drown the `log` output.
pub fn init_ffmpeg() -> Result<()> {
    let mut result = Ok(());
    FFMPEG_INIT.call_once(|| {
        result = ffmpeg_next::init().decoder_err("Failed to initialize FFmpeg");
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Warning);
    });
    result
}

/// Convert an AirPlay volume in dB into a linear gain
///
/// # Arguments
///
/// * `db` - Volume as sent by the client: 0.0 is full scale, -30.0 is the
///   quietest audible step and -144.0 means mute
///
/// # Returns
///
/// Linear gain in the range 0.0 - 1.0
pub fn airplay_volume_to_gain(db: f32) -> f32 {
    if db.is_nan() || db <= -30.0 {
        0.0
    } else if db >= 0.0 {
        1.0
    } else {
        10f32.powf(db / 20.0)
    }
}
