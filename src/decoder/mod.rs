//! Decoder module
//!
//! Stateful decoders for the compressed units the session layer submits.
//! Video decoders hand out FFmpeg pictures one at a time in decoder order;
//! audio decoders produce interleaved PCM in the sink's format. Both are
//! owned by exactly one pipeline and never shared.

mod ffmpeg_audio;
mod ffmpeg_video;

pub use ffmpeg_audio::FfmpegAudioDecoder;
pub use ffmpeg_video::FfmpegVideoDecoder;

use crate::renderer::AccessUnit;
use crate::utils::error::Result;
use ffmpeg_next::util::frame;
use std::fmt;

/// Outcome of a failed send or receive, classified by how to react to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The decoder needs more input before it can output anything
    NeedMoreData,
    /// The decoder has been drained
    EndOfStream,
    /// The unit was malformed and has been skipped
    InvalidData,
    /// The decoder is no longer usable
    Fatal(String),
}

impl DecodeError {
    /// Whether the pipeline can simply carry on with the next unit
    pub fn is_transient(&self) -> bool {
        !matches!(self, DecodeError::Fatal(_))
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NeedMoreData => write!(f, "decoder needs more data"),
            DecodeError::EndOfStream => write!(f, "end of stream"),
            DecodeError::InvalidData => write!(f, "invalid data"),
            DecodeError::Fatal(msg) => write!(f, "fatal decoder error: {}", msg),
        }
    }
}

impl From<ffmpeg_next::Error> for DecodeError {
    fn from(err: ffmpeg_next::Error) -> Self {
        match err {
            ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::EAGAIN => {
                DecodeError::NeedMoreData
            }
            ffmpeg_next::Error::Eof => DecodeError::EndOfStream,
            ffmpeg_next::Error::InvalidData => DecodeError::InvalidData,
            other => DecodeError::Fatal(other.to_string()),
        }
    }
}

/// Lifecycle of a pipeline's decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Constructed, `start` not called yet
    Uninitialized,
    /// Open and idle
    Ready,
    /// At least one unit sent since the last flush
    Decoding,
    /// A flush is discarding buffered state
    Draining,
    /// Torn down; no further units are accepted
    Closed,
}

/// Stateful video decoder
pub trait VideoDecoder: Send {
    /// Send one compressed unit to the decoder
    ///
    /// # Arguments
    ///
    /// * `unit` - The unit to decode; its bytes are copied before returning
    fn send(&mut self, unit: &AccessUnit<'_>) -> std::result::Result<(), DecodeError>;

    /// Receive the next decoded picture
    ///
    /// # Arguments
    ///
    /// * `picture` - Reused output picture, overwritten on success
    ///
    /// # Returns
    ///
    /// `Err(DecodeError::NeedMoreData)` once the decoder has nothing more to give
    fn receive(&mut self, picture: &mut frame::Video) -> std::result::Result<(), DecodeError>;

    /// Discard every buffered unit and picture, keeping the codec open
    fn flush(&mut self);

    /// Tear the codec down and open a fresh one with the same parameters
    fn reopen(&mut self) -> Result<()>;

    /// Release the codec
    fn close(&mut self);
}

/// Stateful audio decoder producing interleaved PCM
pub trait AudioDecoder: Send {
    /// Decode one compressed unit
    ///
    /// # Arguments
    ///
    /// * `unit` - The unit to decode
    /// * `out` - Decoded samples are appended here as interleaved S16LE bytes
    ///
    /// # Returns
    ///
    /// Number of bytes appended
    fn decode(&mut self, unit: &AccessUnit<'_>, out: &mut Vec<u8>) -> std::result::Result<usize, DecodeError>;

    /// Discard every buffered unit and sample
    fn flush(&mut self);

    /// Tear the codec down and open a fresh one
    fn reopen(&mut self) -> Result<()>;

    /// Release the codec
    fn close(&mut self);
}
