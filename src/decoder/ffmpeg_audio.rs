//! FFmpeg-backed AAC decoder with resampling to the sink format

use super::{AudioDecoder, DecodeError};
use crate::audio::AudioFormat;
use crate::renderer::AccessUnit;
use crate::utils::error::{RendererError, Result};
use crate::utils::init_ffmpeg;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::channel_layout::ChannelLayout;
use ffmpeg_next::codec;
use ffmpeg_next::format::{sample, Sample};
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::frame;
use log::{debug, info, warn};

struct Resampler {
    context: resampling::Context,
    input: (Sample, ChannelLayout, u32),
}

// SAFETY: the SwrContext is only reached through `&mut FfmpegAudioDecoder`
// and libswresample keeps no thread-local state.
unsafe impl Send for Resampler {}

/// Audio decoder producing interleaved S16 in the configured output format
pub struct FfmpegAudioDecoder {
    codec_id: codec::Id,
    output: AudioFormat,
    decoder: Option<codec::decoder::Audio>,
    resampler: Option<Resampler>,
    decoded: frame::Audio,
}

impl FfmpegAudioDecoder {
    /// Open an AAC decoder (ADTS or raw with in-band configuration)
    pub fn aac(output: AudioFormat) -> Result<Self> {
        Self::open(codec::Id::AAC, output)
    }

    pub fn open(codec_id: codec::Id, output: AudioFormat) -> Result<Self> {
        init_ffmpeg()?;
        let decoder = Self::open_codec(codec_id)?;
        info!("Opened {:?} decoder, output {}", codec_id, output);
        Ok(Self {
            codec_id,
            output,
            decoder: Some(decoder),
            resampler: None,
            decoded: frame::Audio::empty(),
        })
    }

    fn open_codec(codec_id: codec::Id) -> Result<codec::decoder::Audio> {
        let codec = codec::decoder::find(codec_id)
            .ok_or_else(|| RendererError::unavailable(format!("No decoder for {:?}", codec_id)))?;
        let context = codec::context::Context::new_with_codec(codec);
        Ok(context.decoder().audio()?)
    }

    pub fn output_format(&self) -> AudioFormat {
        self.output
    }

    fn output_layout(&self) -> ChannelLayout {
        match self.output.channels {
            1 => ChannelLayout::MONO,
            2 => ChannelLayout::STEREO,
            n => ChannelLayout::default(i32::from(n)),
        }
    }

    /// Resample `self.decoded` and append the result to `out`
    fn resample_into(&mut self, out: &mut Vec<u8>) -> std::result::Result<usize, DecodeError> {
        let mut layout = self.decoded.channel_layout();
        if layout.is_empty() {
            layout = ChannelLayout::default(i32::from(self.decoded.channels()));
        }
        let input = (self.decoded.format(), layout, self.decoded.rate());

        if self.resampler.as_ref().map(|r| r.input) != Some(input) {
            let context = resampling::Context::get(
                input.0,
                input.1,
                input.2,
                Sample::I16(sample::Type::Packed),
                self.output_layout(),
                self.output.sample_rate,
            )
            .map_err(|e| DecodeError::Fatal(format!("resampler: {}", e)))?;
            debug!("Audio resampler built for {:?} {} Hz", input.0, input.2);
            self.resampler = Some(Resampler { context, input });
        }

        // Room for the rate change plus whatever the resampler still holds
        let capacity = self.decoded.samples() * self.output.sample_rate as usize / input.2.max(1) as usize + 256;
        let mut resampled = frame::Audio::new(Sample::I16(sample::Type::Packed), capacity, self.output_layout());

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(0);
        };
        resampler
            .context
            .run(&self.decoded, &mut resampled)
            .map_err(|e| DecodeError::Fatal(format!("resampler: {}", e)))?;

        let bytes = resampled.samples() * self.output.bytes_per_frame();
        let data = resampled.data(0);
        let bytes = bytes.min(data.len());
        out.extend_from_slice(&data[..bytes]);
        Ok(bytes)
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn decode(&mut self, unit: &AccessUnit<'_>, out: &mut Vec<u8>) -> std::result::Result<usize, DecodeError> {
        // An empty packet would put the codec into drain mode
        if unit.is_empty() {
            return Ok(0);
        }

        let mut packet = ffmpeg::Packet::copy(unit.data);
        packet.set_pts(Some(unit.pts_i64()));

        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| DecodeError::Fatal("decoder is closed".to_string()))?;
        decoder.send_packet(&packet).map_err(DecodeError::from)?;

        let mut written = 0;
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                break;
            };
            match decoder.receive_frame(&mut self.decoded) {
                Ok(()) => written += self.resample_into(out)?,
                Err(err) => match DecodeError::from(err) {
                    DecodeError::Fatal(msg) => return Err(DecodeError::Fatal(msg)),
                    DecodeError::InvalidData => warn!("Skipping undecodable audio frame"),
                    _ => break,
                },
            }
        }

        Ok(written)
    }

    fn flush(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
        // Drop samples buffered inside the resampler as well
        self.resampler = None;
    }

    fn reopen(&mut self) -> Result<()> {
        self.decoder = None;
        self.resampler = None;
        self.decoder = Some(Self::open_codec(self.codec_id)?);
        info!("Reopened {:?} decoder", self.codec_id);
        Ok(())
    }

    fn close(&mut self) {
        self.resampler = None;
        self.decoder = None;
    }
}
