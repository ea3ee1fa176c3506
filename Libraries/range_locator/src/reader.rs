use crate::{format_fourcc, read_u32_be, SegmentRanges};

// Every ISO BMFF box starts with a 4-byte big-endian size and a 4-byte type.
const BOX_HEADER_SIZE: usize = 8;

/// Header of one top-level box.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Offset of the first header byte in the buffer.
    pub offset: usize,
    /// Declared box size, clamped to at least the header size.
    pub size: u32,
    pub box_type: [u8; 4],
}

impl std::fmt::Debug for BoxHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxHeader")
            .field("offset", &self.offset)
            .field("box_size", &self.size)
            .field("box_type", &format_fourcc(&self.box_type))
            .finish()
    }
}

/// Walks the top-level boxes of a (possibly truncated) MP4 buffer.
///
/// The walk only looks at headers, so boxes that extend past the end of the
/// buffer are still reported. A declared size below 8 (including the 0 meaning
/// "to end of file" and the 1 announcing a 64-bit largesize) is treated as 8,
/// which keeps the walk moving instead of looping on the same offset.
pub struct BoxHeaders<'a> {
    data: &'a [u8],
    offset: Option<usize>,
}

pub fn top_level_boxes(data: &[u8]) -> BoxHeaders<'_> {
    BoxHeaders { data, offset: Some(0) }
}

impl Iterator for BoxHeaders<'_> {
    type Item = BoxHeader;

    fn next(&mut self) -> Option<BoxHeader> {
        let offset = self.offset?;
        let size = read_u32_be(self.data, offset)?.max(BOX_HEADER_SIZE as u32);
        let box_type: [u8; 4] = self
            .data
            .get(offset + 4..offset + BOX_HEADER_SIZE)?
            .try_into()
            .ok()?;

        self.offset = offset.checked_add(size as usize);
        Some(BoxHeader { offset, size, box_type })
    }
}

/// Finds the `sidx` box in an MP4 prefix.
///
/// Returns `init = (0, k - 1)` and `index = (k, k + size - 1)` for a `sidx` box
/// at offset `k`, or [`SegmentRanges::NOT_FOUND`] if the prefix runs out first.
pub fn find_sidx(data: &[u8]) -> SegmentRanges {
    top_level_boxes(data)
        .find(|header| &header.box_type == b"sidx")
        .and_then(|sidx| SegmentRanges::split_at(sidx.offset as u64, sidx.size as u64))
        .unwrap_or(SegmentRanges::NOT_FOUND)
}
