//! Compressed units handed over by the session layer

/// What a video unit carries, when the session layer knows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// SPS/PPS only, produces no picture
    ParameterSets,
    /// Contains at least one coded slice
    Picture,
}

/// One already-demultiplexed, timestamped compressed unit
///
/// The bytes are borrowed for the duration of a single `submit` call. The
/// pipelines copy them into an owned packet before decoding, so callers may
/// reuse their buffer as soon as `submit` returns.
#[derive(Debug, Clone, Copy)]
pub struct AccessUnit<'a> {
    /// Compressed payload (Annex-B H.264 or raw AAC)
    pub data: &'a [u8],

    /// Presentation timestamp in microseconds on the receiver clock
    pub pts: u64,

    /// Optional hint about the payload
    pub kind: Option<UnitKind>,
}

impl<'a> AccessUnit<'a> {
    /// Create a video unit
    pub fn video(data: &'a [u8], pts: u64, kind: Option<UnitKind>) -> Self {
        Self { data, pts, kind }
    }

    /// Create an audio unit
    pub fn audio(data: &'a [u8], pts: u64) -> Self {
        Self { data, pts, kind: None }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Timestamp in the signed representation FFmpeg packets use
    pub fn pts_i64(&self) -> i64 {
        i64::try_from(self.pts).unwrap_or(i64::MAX)
    }
}
