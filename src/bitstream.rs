//! Elementary-stream splitting for the standalone player
//!
//! The session layer normally hands the renderers ready-made access units.
//! When playing from files, these helpers cut raw Annex-B H.264 and ADTS AAC
//! streams into the same units.

use crate::renderer::UnitKind;

const NAL_SLICE: u8 = 1;
const NAL_IDR: u8 = 5;
const NAL_SEI: u8 = 6;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_AUD: u8 = 9;

/// One NAL unit inside an Annex-B stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// Offset of the start code in the stream
    pub offset: usize,
    /// NAL header and payload, start code excluded
    pub payload: &'a [u8],
}

impl NalUnit<'_> {
    pub fn nal_type(&self) -> Option<u8> {
        self.payload.first().map(|header| header & 0x1f)
    }

    fn is_slice(&self) -> bool {
        matches!(self.nal_type(), Some(NAL_SLICE | NAL_IDR))
    }

    /// first_mb_in_slice == 0, i.e. the slice opens a new picture
    fn starts_picture(&self) -> bool {
        self.payload.get(1).is_some_and(|byte| byte & 0x80 != 0)
    }
}

/// Split an Annex-B stream on 3- and 4-byte start codes
pub fn nal_units(stream: &[u8]) -> Vec<NalUnit<'_>> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= stream.len() {
        if stream[i] == 0 && stream[i + 1] == 0 && stream[i + 2] == 1 {
            let offset = if i > 0 && stream[i - 1] == 0 { i - 1 } else { i };
            starts.push((offset, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(index, &(offset, payload_start))| {
            let end = starts.get(index + 1).map_or(stream.len(), |&(next, _)| next);
            NalUnit {
                offset,
                payload: &stream[payload_start..end.max(payload_start)],
            }
        })
        .collect()
}

/// Group the NAL units of an Annex-B stream into access units
///
/// A new unit begins at an AUD, SEI, SPS or PPS following a slice, or at a
/// slice whose first macroblock is 0. Each returned slice keeps its start
/// codes and can be submitted as is.
pub fn access_units(stream: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut current: Option<usize> = None;
    let mut has_slice = false;

    for nal in nal_units(stream) {
        let boundary = match nal.nal_type() {
            Some(NAL_SLICE | NAL_IDR) => has_slice && nal.starts_picture(),
            Some(NAL_SEI | NAL_SPS | NAL_PPS | NAL_AUD) => has_slice,
            _ => false,
        };

        if boundary {
            if let Some(start) = current.take() {
                units.push(&stream[start..nal.offset]);
            }
            has_slice = false;
        }
        current.get_or_insert(nal.offset);
        has_slice |= nal.is_slice();
    }

    if let Some(start) = current {
        units.push(&stream[start..]);
    }
    units
}

/// Classify an access unit by the NAL units it carries
pub fn unit_kind(unit: &[u8]) -> Option<UnitKind> {
    let nals = nal_units(unit);
    if nals.iter().any(NalUnit::is_slice) {
        Some(UnitKind::Picture)
    } else if nals
        .iter()
        .any(|nal| matches!(nal.nal_type(), Some(NAL_SPS | NAL_PPS)))
    {
        Some(UnitKind::ParameterSets)
    } else {
        None
    }
}

const ADTS_HEADER_LEN: usize = 7;
const ADTS_SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000, 7_350,
];

/// AAC samples per channel in one ADTS frame
pub const AAC_FRAME_SAMPLES: u32 = 1024;

fn adts_frame_len(header: &[u8]) -> Option<usize> {
    if header.len() < ADTS_HEADER_LEN || header[0] != 0xff || header[1] & 0xf0 != 0xf0 {
        return None;
    }
    let len = (usize::from(header[3] & 0x03) << 11) | (usize::from(header[4]) << 3) | usize::from(header[5] >> 5);
    (len >= ADTS_HEADER_LEN).then_some(len)
}

/// Split an ADTS stream into frames, skipping bytes that do not sync
pub fn adts_frames(stream: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < stream.len() {
        match adts_frame_len(&stream[pos..]) {
            Some(len) if pos + len <= stream.len() => {
                frames.push(&stream[pos..pos + len]);
                pos += len;
            }
            Some(_) => break,
            None => pos += 1,
        }
    }
    frames
}

/// Sampling rate announced by an ADTS header
pub fn adts_sample_rate(frame: &[u8]) -> Option<u32> {
    adts_frame_len(frame)?;
    let index = usize::from((frame[2] >> 2) & 0x0f);
    ADTS_SAMPLE_RATES.get(index).copied()
}
