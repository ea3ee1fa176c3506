//! In-memory model of a static, single-period on-demand MPD.
//! Each representation is one self-contained file addressed through `SegmentBase`.

pub mod builder;

use range_locator::{ByteRange, SegmentRanges};

pub const MPD_NAMESPACE: &str = "urn:mpeg:DASH:schema:MPD:2011";
pub const ON_DEMAND_PROFILE: &str = "urn:mpeg:dash:profile:isoff-main:2011";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const SCHEMA_LOCATION: &str = "urn:mpeg:DASH:schema:MPD:2011 DASH-MPD.xsd";
pub const ROLE_SCHEME: &str = "urn:mpeg:DASH:role:2011";
pub const AUDIO_CHANNEL_SCHEME: &str = "urn:mpeg:dash:23003:3:audio_channel_configuration:2011";

/// Buffer a client should hold before starting playback, in seconds.
pub const MIN_BUFFER_TIME: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Audio,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Audio => "audio",
            ContentType::Video => "video",
        }
    }
}

/// Byte ranges of the seek index and the initialization segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBase {
    pub index_range: ByteRange,
    pub initialization: ByteRange,
}

impl From<SegmentRanges> for SegmentBase {
    fn from(ranges: SegmentRanges) -> Self {
        Self {
            index_range: ranges.index,
            initialization: ranges.init,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub id: String,
    pub codecs: String,
    pub mime_type: String,
    /// Bits per second. Omitted from the document when unknown.
    pub bandwidth: Option<u64>,
    pub audio_sampling_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub frame_rate: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Text of the `BaseURL` child, already rewritten.
    pub base_url: String,
    pub segment_base: SegmentBase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationSet {
    pub id: u32,
    pub content_type: ContentType,
    pub representations: Vec<Representation>,
}

impl AdaptationSet {
    pub fn new(id: u32, content_type: ContentType) -> Self {
        Self {
            id,
            content_type,
            representations: vec![],
        }
    }
}

/// The only period of the presentation: one audio set, one video set.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub audio: AdaptationSet,
    pub video: AdaptationSet,
}

impl Default for Period {
    fn default() -> Self {
        Self {
            audio: AdaptationSet::new(0, ContentType::Audio),
            video: AdaptationSet::new(1, ContentType::Video),
        }
    }
}

/// Formats seconds as `P{d}DT{h}H{m}M{s}S`.
///
/// Days, hours and minutes are whole numbers; the seconds keep whatever
/// fraction the input had (`1.5` gives `P0DT0H0M1.5S`). Negative and NaN
/// inputs format as zero.
pub fn iso8601_duration(secs: f64) -> String {
    let secs = if secs > 0.0 { secs } else { 0.0 };
    let seconds = secs % 60.0;
    let total_minutes = ((secs - seconds) / 60.0) as u64;
    let days = total_minutes / (24 * 60);
    let hours = total_minutes / 60 % 24;
    let minutes = total_minutes % 60;
    format!("P{days}DT{hours}H{minutes}M{seconds}S")
}
