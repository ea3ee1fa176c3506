//! # Locating DASH byte ranges inside single-file media
//!
//! An on-demand DASH representation that lives in one file only needs two byte
//! ranges to be playable: the **initialization segment** (everything a decoder
//! must see before the first media sample) and the **seek index** that maps
//! presentation time to byte offsets. Both sit at the very front of a file
//! prepared for DASH, so they can be found from a small prefix of the resource.
//!
//! ## Supported containers
//! 1. **WebM / Matroska** (`webm_dash`):
//!    - The file is a tree of EBML elements, each framed by a variable-length
//!      element ID and a variable-length size.
//!    - The seek index is the top-level `Cues` element (`0x1C53BB6B`).
//!    - See [`ebml`].
//!
//! 2. **Fragmented MP4** (`mp4_dash`, `m4a_dash`, anything else):
//!    - The file is a flat sequence of ISO BMFF boxes, each framed by a 32-bit
//!      size and a four character type.
//!    - The seek index is the `sidx` (Segment Index) box.
//!    - See [`reader`].
//!
//! In both cases the initialization segment is everything before the index, so
//! a locator reports `init = (0, k - 1)` and `index = (k, k + len - 1)` for an
//! index found at offset `k`.
//!
//! ## Not found is not an error
//! A prefix that parses but never reaches the index yields
//! [`SegmentRanges::NOT_FOUND`]. Failing to *fetch* the prefix is a
//! [`FetchError`] and is never folded into the not-found result.

pub mod ebml;
pub mod error;
pub mod fetcher;
pub mod reader;

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, instrument};

pub use error::FetchError;
pub use fetcher::{HttpFetcher, PrefixFetcher};

/// Number of bytes fetched from the front of every resource.
pub const PREFIX_SIZE: usize = 1024;
/// `Range` header value asking for exactly [`PREFIX_SIZE`] bytes.
pub const PREFIX_RANGE: &str = "bytes=0-1023";

/// Inclusive byte range. `(0, 0)` is reserved for "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub const NOT_FOUND: ByteRange = ByteRange { start: 0, end: 0 };

    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_found(&self) -> bool {
        *self != Self::NOT_FOUND
    }
}

// Formatted the way MPD `range` and `indexRange` attributes expect it.
impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The two ranges a `SegmentBase` needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentRanges {
    pub init: ByteRange,
    pub index: ByteRange,
}

impl SegmentRanges {
    pub const NOT_FOUND: SegmentRanges = SegmentRanges {
        init: ByteRange::NOT_FOUND,
        index: ByteRange::NOT_FOUND,
    };

    /// Ranges for an index of `len` bytes starting at `offset`. An index at
    /// offset zero leaves no room for an initialization segment.
    pub(crate) fn split_at(offset: u64, len: u64) -> Option<Self> {
        let index_end = offset.checked_add(len)?.checked_sub(1)?;
        Some(Self {
            init: ByteRange::new(0, offset.checked_sub(1)?),
            index: ByteRange::new(offset, index_end),
        })
    }

    pub fn is_found(&self) -> bool {
        self.index.is_found()
    }
}

/// Container family of a representation, which decides how its prefix is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Webm,
    Mp4,
}

impl Container {
    /// Maps a yt-dlp container tag. Only `webm_dash` is WebM; every other tag
    /// (`mp4_dash`, `m4a_dash`, ...) is treated as fragmented MP4.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "webm_dash" => Container::Webm,
            _ => Container::Mp4,
        }
    }

    pub fn find_ranges(&self, prefix: &[u8]) -> SegmentRanges {
        match self {
            Container::Webm => ebml::find_cues(prefix),
            Container::Mp4 => reader::find_sidx(prefix),
        }
    }
}

/// Fetches a prefix of a resource and locates its init and index ranges.
pub struct RangeLocator<F = HttpFetcher> {
    fetcher: F,
}

impl<F: PrefixFetcher> RangeLocator<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// One fetch, no retries. A fetch failure is returned as is; a prefix
    /// without an index gives [`SegmentRanges::NOT_FOUND`].
    #[instrument(skip_all, fields(url = %url, container = ?container))]
    pub async fn locate(
        &self,
        url: &str,
        container: Container,
        headers: &HashMap<String, String>,
    ) -> Result<SegmentRanges, FetchError> {
        let prefix = self.fetcher.fetch_prefix(url, headers).await?;
        let ranges = container.find_ranges(&prefix);
        debug!(
            "Fetched {} bytes, init range {}, index range {}",
            prefix.len(),
            ranges.init,
            ranges.index
        );
        Ok(ranges)
    }
}

pub fn format_fourcc(fourcc: &[u8; 4]) -> String {
    std::str::from_utf8(fourcc).unwrap_or("????").to_string()
}

pub fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let bytes: [u8; 4] = data.get(offset..end)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}
