//! Scale / colour-conversion stage
//!
//! Decoded pictures arrive in whatever geometry and pixel format the stream
//! currently uses. The [`ConversionContext`] turns them into the format the
//! presentation surface wants, rebuilding its scaler and destination buffer
//! only when the [`ConversionKey`] changes.

use crate::utils::error::{IntoRendererError, RendererError, Result};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Geometry of a decoded or converted picture
    pub fn of(frame: &frame::Video) -> Self {
        Self::new(frame.width(), frame.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Same area with width and height exchanged
    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Scaling kernel, fixed for the lifetime of a conversion context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleFilter {
    Bilinear,
    #[default]
    Bicubic,
    Lanczos,
}

impl ScaleFilter {
    fn flags(self) -> scaling::Flags {
        match self {
            ScaleFilter::Bilinear => scaling::Flags::BILINEAR,
            ScaleFilter::Bicubic => scaling::Flags::BICUBIC,
            ScaleFilter::Lanczos => scaling::Flags::LANCZOS,
        }
    }
}

/// How the destination geometry is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceSizing {
    /// Convert at the decoded size; the surface follows the stream
    #[default]
    FollowStream,
    /// Always convert to this size
    Fixed(Geometry),
}

impl SurfaceSizing {
    pub fn from_fixed(size: Option<Geometry>) -> Self {
        size.map_or(SurfaceSizing::FollowStream, SurfaceSizing::Fixed)
    }

    /// Destination geometry for a picture of the given size
    pub fn destination_for(&self, source: Geometry) -> Geometry {
        match self {
            SurfaceSizing::FollowStream => source,
            SurfaceSizing::Fixed(size) => *size,
        }
    }
}

/// Everything that determines the shape of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionKey {
    pub source: Geometry,
    pub source_format: Pixel,
    pub destination: Geometry,
    pub destination_format: Pixel,
}

struct Scaler(scaling::Context);

// SAFETY: the SwsContext is only ever used through `&mut ConversionContext`,
// so it is never touched from two threads at once. Moving it between threads
// is fine; libswscale keeps no thread-local state.
unsafe impl Send for Scaler {}

/// Cached scaler plus the reusable destination buffer
pub struct ConversionContext {
    filter: ScaleFilter,
    destination_format: Pixel,
    key: Option<ConversionKey>,
    scaler: Option<Scaler>,
    buffer: Option<frame::Video>,
    rebuilds: u64,
}

impl ConversionContext {
    /// Create an empty context; nothing is allocated until the first `prepare`
    pub fn new(destination_format: Pixel, filter: ScaleFilter) -> Self {
        Self {
            filter,
            destination_format,
            key: None,
            scaler: None,
            buffer: None,
            rebuilds: 0,
        }
    }

    pub fn key(&self) -> Option<ConversionKey> {
        self.key
    }

    pub fn destination_format(&self) -> Pixel {
        self.destination_format
    }

    /// How many times the scaler has been (re)built
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Make the context match `source` converted to `destination`
    ///
    /// # Arguments
    ///
    /// * `source` - The picture about to be converted
    /// * `destination` - Target geometry
    ///
    /// # Returns
    ///
    /// `true` if the scaler was rebuilt, `false` if the cached one fits
    pub fn prepare(&mut self, source: &frame::Video, destination: Geometry) -> Result<bool> {
        let key = ConversionKey {
            source: Geometry::of(source),
            source_format: source.format(),
            destination,
            destination_format: self.destination_format,
        };

        if key.source.is_empty() || key.destination.is_empty() {
            return Err(RendererError::Scaler(format!(
                "cannot convert {} to {}",
                key.source, key.destination
            )));
        }

        if self.key == Some(key) && self.scaler.is_some() {
            if self.buffer.is_none() {
                warn!("Destination buffer was lost, reallocating {}", destination);
                self.buffer = Some(frame::Video::new(
                    self.destination_format,
                    destination.width,
                    destination.height,
                ));
            }
            return Ok(false);
        }

        // Drop the old scaler and buffer before allocating the new ones
        self.invalidate();

        let scaler = scaling::Context::get(
            key.source_format,
            key.source.width,
            key.source.height,
            key.destination_format,
            key.destination.width,
            key.destination.height,
            self.filter.flags(),
        )
        .scaler_err("Failed to create scaling context")?;

        self.scaler = Some(Scaler(scaler));
        self.buffer = Some(frame::Video::new(
            key.destination_format,
            key.destination.width,
            key.destination.height,
        ));
        self.key = Some(key);
        self.rebuilds += 1;

        debug!(
            "Conversion context rebuilt: {} {:?} -> {} {:?}",
            key.source, key.source_format, key.destination, key.destination_format
        );

        Ok(true)
    }

    /// Convert `source` into the destination buffer
    ///
    /// `prepare` must have been called for this picture first.
    pub fn convert(&mut self, source: &frame::Video) -> Result<()> {
        let (Some(Scaler(scaler)), Some(buffer)) = (self.scaler.as_mut(), self.buffer.as_mut()) else {
            return Err(RendererError::Scaler("conversion context is not prepared".to_string()));
        };

        scaler.run(source, buffer).scaler_err("Failed to convert frame")
    }

    /// Take the converted buffer out for presentation
    pub fn take_buffer(&mut self) -> Option<frame::Video> {
        self.buffer.take()
    }

    /// Hand a buffer back after presentation
    ///
    /// A buffer that no longer matches the current key is dropped.
    pub fn restore_buffer(&mut self, buffer: frame::Video) {
        let matches = self.key.is_some_and(|key| {
            Geometry::of(&buffer) == key.destination && buffer.format() == key.destination_format
        });
        if matches {
            self.buffer = Some(buffer);
        }
    }

    /// Release the scaler and buffer; the next `prepare` rebuilds
    pub fn invalidate(&mut self) {
        self.key = None;
        self.scaler = None;
        self.buffer = None;
    }
}
