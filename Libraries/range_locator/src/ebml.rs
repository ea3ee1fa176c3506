//! EBML walking for WebM / Matroska prefixes.
//!
//! EBML frames every element as `ID | size | payload`, where both the ID and
//! the size are variable-length integers ("vints"). The number of leading zero
//! bits in the first byte gives the total length of the vint (1 to 8 bytes):
//!
//! | first byte  | length | value bits in first byte |
//! |-------------|--------|--------------------------|
//! | `1xxx xxxx` | 1      | 7                        |
//! | `01xx xxxx` | 2      | 6                        |
//! | `001x xxxx` | 3      | 5                        |
//! | ...         | ...    | ...                      |
//! | `0000 0001` | 8      | 0                        |
//!
//! Element IDs keep their marker bits (`0x1C53BB6B` is the Cues ID as written
//! on disk); sizes drop them.

use crate::{read_u32_be, SegmentRanges};

/// Signature of the EBML header element every WebM file starts with.
pub const EBML_MAGIC: u32 = 0x1A45_DFA3;
/// Matroska `Segment`, usually written with an unknown size.
pub const SEGMENT_ID: u64 = 0x1853_8067;
/// Matroska `Cues`, the seek index.
pub const CUES_ID: u64 = 0x1C53_BB6B;

// The walk starts right after the 4-byte EBML ID and a 1-byte header size,
// so it steps through the header's children before reaching the Segment.
const FIRST_ELEMENT_OFFSET: usize = 5;
// The walk stops once this many bytes or fewer remain unread.
const MIN_UNREAD: usize = 16;

/// Decodes the first byte of a vint into `(length, value bits)`.
///
/// `0x00` has no marker bit at all; like `0x01` it is reported as an 8-byte
/// vint with no value bits.
pub fn decode_vint_marker(byte: u8) -> (usize, u8) {
    let len = (byte.leading_zeros() as usize + 1).min(8);
    let value = if len >= 8 { 0 } else { byte & (0xFF >> len) };
    (len, value)
}

/// Reads a size vint at `offset`, returning `(length, value)`.
/// `None` if the vint runs past the end of `data`.
pub fn read_vint(data: &[u8], offset: usize) -> Option<(usize, u64)> {
    let (len, first) = decode_vint_marker(*data.get(offset)?);
    let rest = data.get(offset.checked_add(1)?..offset.checked_add(len)?)?;
    let value = rest
        .iter()
        .fold(first as u64, |acc, &byte| (acc << 8) | byte as u64);
    Some((len, value))
}

/// Reads an element ID at `offset`, marker bits included.
pub fn read_element_id(data: &[u8], offset: usize) -> Option<(usize, u64)> {
    let (len, _) = decode_vint_marker(*data.get(offset)?);
    let raw = data.get(offset..offset.checked_add(len)?)?;
    let id = raw.iter().fold(0u64, |acc, &byte| (acc << 8) | byte as u64);
    Some((len, id))
}

/// ID and size framing of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub offset: usize,
    pub id: u64,
    pub id_len: usize,
    pub size_len: usize,
    /// Declared payload size. Meaningless for an unknown-size Segment.
    pub size: u64,
}

impl ElementHeader {
    pub fn header_len(&self) -> usize {
        self.id_len + self.size_len
    }

    /// Length of the whole element: ID, size field and payload.
    pub fn total_len(&self) -> Option<u64> {
        (self.header_len() as u64).checked_add(self.size)
    }
}

/// Walks element headers the way a DASH index search needs: every element is
/// skipped by its declared size, except the Segment, which is entered so its
/// children (SeekHead, Info, Tracks, Cues, ...) are visited in turn.
///
/// Declared sizes are trusted. A size that points past the buffer, or past the
/// address space, ends the walk.
pub struct ElementWalk<'a> {
    data: &'a [u8],
    offset: Option<usize>,
}

pub fn elements(data: &[u8]) -> ElementWalk<'_> {
    ElementWalk {
        data,
        offset: Some(FIRST_ELEMENT_OFFSET),
    }
}

impl Iterator for ElementWalk<'_> {
    type Item = ElementHeader;

    fn next(&mut self) -> Option<ElementHeader> {
        let offset = self.offset.take()?;
        if offset.checked_add(MIN_UNREAD)? >= self.data.len() {
            return None;
        }

        let (id_len, id) = read_element_id(self.data, offset)?;
        let (size_len, size) = read_vint(self.data, offset + id_len)?;
        let header = ElementHeader { offset, id, id_len, size_len, size };

        self.offset = if id == SEGMENT_ID {
            offset.checked_add(header.header_len())
        } else {
            header
                .total_len()
                .and_then(|len| usize::try_from(len).ok())
                .and_then(|len| offset.checked_add(len))
        };
        Some(header)
    }
}

/// Finds the first `Cues` element in a WebM prefix.
///
/// Returns `init = (0, k - 1)` and `index = (k, k + len - 1)` for a Cues element
/// at offset `k` with total length `len`, or [`SegmentRanges::NOT_FOUND`] when
/// the EBML signature is missing or the prefix runs out first.
pub fn find_cues(data: &[u8]) -> SegmentRanges {
    if read_u32_be(data, 0) != Some(EBML_MAGIC) {
        return SegmentRanges::NOT_FOUND;
    }

    elements(data)
        .find(|element| element.id == CUES_ID)
        .and_then(|cues| SegmentRanges::split_at(cues.offset as u64, cues.total_len()?))
        .unwrap_or(SegmentRanges::NOT_FOUND)
}
