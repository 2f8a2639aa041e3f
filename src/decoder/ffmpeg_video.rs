//! FFmpeg-backed H.264 decoder

use super::{DecodeError, VideoDecoder};
use crate::renderer::AccessUnit;
use crate::utils::error::{RendererError, Result};
use crate::utils::init_ffmpeg;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::{self, threading};
use ffmpeg_next::util::frame;
use log::{debug, info};

/// Software video decoder driven unit by unit
pub struct FfmpegVideoDecoder {
    codec_id: codec::Id,
    low_latency: bool,
    decoder: Option<codec::decoder::Video>,
}

impl FfmpegVideoDecoder {
    /// Open an H.264 decoder
    pub fn h264(low_latency: bool) -> Result<Self> {
        Self::open(codec::Id::H264, low_latency)
    }

    /// Open a decoder for `codec_id`
    ///
    /// # Arguments
    ///
    /// * `codec_id` - Codec of the incoming stream
    /// * `low_latency` - Output pictures as early as possible instead of
    ///   using frame threading
    pub fn open(codec_id: codec::Id, low_latency: bool) -> Result<Self> {
        init_ffmpeg()?;
        let decoder = Self::open_codec(codec_id, low_latency)?;
        info!(
            "Opened {:?} decoder ({} threading)",
            codec_id,
            if low_latency { "slice" } else { "frame" }
        );
        Ok(Self {
            codec_id,
            low_latency,
            decoder: Some(decoder),
        })
    }

    fn open_codec(codec_id: codec::Id, low_latency: bool) -> Result<codec::decoder::Video> {
        let codec = codec::decoder::find(codec_id)
            .ok_or_else(|| RendererError::unavailable(format!("No decoder for {:?}", codec_id)))?;

        let mut context = codec::context::Context::new_with_codec(codec);
        if low_latency {
            context.set_flags(codec::Flags::LOW_DELAY);
            context.set_threading(threading::Config::kind(threading::Type::Slice));
        } else {
            context.set_threading(threading::Config::kind(threading::Type::Frame));
        }

        let decoder = context.decoder().video()?;
        Ok(decoder)
    }

    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }

    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    fn decoder(&mut self) -> std::result::Result<&mut codec::decoder::Video, DecodeError> {
        self.decoder
            .as_mut()
            .ok_or_else(|| DecodeError::Fatal("decoder is closed".to_string()))
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn send(&mut self, unit: &AccessUnit<'_>) -> std::result::Result<(), DecodeError> {
        // An empty packet would put the codec into drain mode
        if unit.is_empty() {
            return Ok(());
        }

        let mut packet = ffmpeg::Packet::copy(unit.data);
        packet.set_pts(Some(unit.pts_i64()));
        packet.set_dts(Some(unit.pts_i64()));

        self.decoder()?.send_packet(&packet).map_err(DecodeError::from)
    }

    fn receive(&mut self, picture: &mut frame::Video) -> std::result::Result<(), DecodeError> {
        self.decoder()?.receive_frame(picture).map_err(DecodeError::from)
    }

    fn flush(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
            debug!("Video decoder flushed");
        }
    }

    fn reopen(&mut self) -> Result<()> {
        self.decoder = None;
        self.decoder = Some(Self::open_codec(self.codec_id, self.low_latency)?);
        info!("Reopened {:?} decoder", self.codec_id);
        Ok(())
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            debug!("Closed {:?} decoder", self.codec_id);
        }
    }
}
