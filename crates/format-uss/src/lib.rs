//! UAE state file (USS) container.
//!
//! A state file is a flat sequence of chunks:
//!
//! ```text
//! tag[4]  total_len u32  flags u32  payload[total_len - 12]  pad
//! ```
//!
//! All integers are big-endian. `total_len` counts the 12-byte header; a
//! value below 12 marks a chunk with no payload. Every non-empty payload is
//! followed by `4 - (len & 3)` pad bytes, so an already aligned payload
//! still carries four. Flag bit 0 marks a compressed payload.

mod error;
mod reader;
mod tag;
mod writer;

pub use error::ChunkError;
pub use reader::{Body, Chunk, ChunkReader};
pub use tag::{ChunkClass, MEMORY_TAGS, REGISTER_TAGS, Tag, UNSUPPORTED_TAGS, tags};
pub use writer::ChunkWriter;

/// Size of the tag + length + flags header.
pub const HEADER_LEN: u32 = 12;

/// Flag bit 0: payload is zlib-compressed.
pub const FLAG_COMPRESSED: u32 = 1;

/// Bytes of a memory chunk buffered during validation: enough for the
/// embedded uncompressed size.
pub const MEMORY_PEEK_LEN: u32 = 16;

/// Pad bytes following a payload of `len` bytes.
#[must_use]
pub const fn pad_len(len: u32) -> u32 {
    if len == 0 { 0 } else { 4 - (len & 3) }
}

/// Payload plus trailing pad.
#[must_use]
pub const fn padded_len(len: u32) -> u64 {
    len as u64 + pad_len(len) as u64
}

/// Header of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: Tag,
    /// Payload length, excluding header and pad.
    pub len: u32,
    pub flags: u32,
}

impl ChunkHeader {
    /// Decode a raw 12-byte header.
    #[must_use]
    pub fn from_bytes(raw: [u8; 12]) -> Self {
        let tag = Tag([raw[0], raw[1], raw[2], raw[3]]);
        let total = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let flags = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        if total < HEADER_LEN {
            return Self { tag, len: 0, flags: 0 };
        }
        Self {
            tag,
            len: total - HEADER_LEN,
            flags,
        }
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// Bytes from the end of the header to the next chunk header.
    #[must_use]
    pub fn padded_len(&self) -> u64 {
        padded_len(self.len)
    }
}

/// Big-endian long at `offset`, or `None` past the end of `buf`.
#[must_use]
pub fn be_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Big-endian word at `offset`, or `None` past the end of `buf`.
#[must_use]
pub fn be_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let b = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_always_at_least_one_byte() {
        assert_eq!(pad_len(0), 0);
        assert_eq!(pad_len(1), 3);
        assert_eq!(pad_len(3), 1);
        assert_eq!(pad_len(4), 4);
        assert_eq!(pad_len(6), 2);
    }

    #[test]
    fn short_total_is_a_marker() {
        let mut raw = [0u8; 12];
        raw[..4].copy_from_slice(b"END ");
        raw[7] = 8;
        raw[11] = 1;
        let h = ChunkHeader::from_bytes(raw);
        assert_eq!(h.tag, tags::END);
        assert_eq!(h.len, 0);
        assert_eq!(h.flags, 0);
    }

    #[test]
    fn header_subtracts_itself() {
        let mut raw = [0u8; 12];
        raw[..4].copy_from_slice(b"CRAM");
        raw[4..8].copy_from_slice(&(12u32 + 0x8_0000).to_be_bytes());
        raw[11] = 1;
        let h = ChunkHeader::from_bytes(raw);
        assert_eq!(h.len, 0x8_0000);
        assert!(h.compressed());
    }

    #[test]
    fn be_helpers_bounds_checked() {
        let buf = [0x12, 0x34, 0x56, 0x78, 0x9A];
        assert_eq!(be_u32(&buf, 0), Some(0x1234_5678));
        assert_eq!(be_u32(&buf, 2), None);
        assert_eq!(be_u16(&buf, 3), Some(0x789A));
        assert_eq!(be_u16(&buf, 4), None);
        assert_eq!(be_u32(&buf, usize::MAX), None);
    }
}
