//! Chunk tags and their classification.

use std::fmt;

/// Four-character chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    #[must_use]
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    #[must_use]
    pub fn class(self) -> ChunkClass {
        if UNSUPPORTED_TAGS.contains(&self) {
            ChunkClass::Unsupported
        } else if REGISTER_TAGS.contains(&self) {
            ChunkClass::Register
        } else if MEMORY_TAGS.contains(&self) {
            ChunkClass::Memory
        } else {
            ChunkClass::Unknown
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag('{self}')")
    }
}

/// How the loader treats a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkClass {
    /// Device state, buffered in full.
    Register,
    /// RAM image; only the prefix is peeked while validating.
    Memory,
    /// Hardware the loader cannot restore; its presence is fatal.
    Unsupported,
    /// Anything else, skipped without side effects.
    Unknown,
}

pub mod tags {
    use super::Tag;

    pub const ASF: Tag = Tag::new(b"ASF ");
    pub const CPU: Tag = Tag::new(b"CPU ");
    pub const CHIP: Tag = Tag::new(b"CHIP");
    pub const AGAC: Tag = Tag::new(b"AGAC");
    pub const CIAA: Tag = Tag::new(b"CIAA");
    pub const CIAB: Tag = Tag::new(b"CIAB");
    pub const ROM: Tag = Tag::new(b"ROM ");
    pub const DSK: [Tag; 4] = [
        Tag::new(b"DSK0"),
        Tag::new(b"DSK1"),
        Tag::new(b"DSK2"),
        Tag::new(b"DSK3"),
    ];
    pub const AUD: [Tag; 4] = [
        Tag::new(b"AUD0"),
        Tag::new(b"AUD1"),
        Tag::new(b"AUD2"),
        Tag::new(b"AUD3"),
    ];
    pub const SPR: [Tag; 8] = [
        Tag::new(b"SPR0"),
        Tag::new(b"SPR1"),
        Tag::new(b"SPR2"),
        Tag::new(b"SPR3"),
        Tag::new(b"SPR4"),
        Tag::new(b"SPR5"),
        Tag::new(b"SPR6"),
        Tag::new(b"SPR7"),
    ];
    pub const END: Tag = Tag::new(b"END ");

    pub const CRAM: Tag = Tag::new(b"CRAM");
    pub const BRAM: Tag = Tag::new(b"BRAM");
    pub const FRAM: Tag = Tag::new(b"FRAM");
}

/// Device chunks, buffered in full.
pub const REGISTER_TAGS: [Tag; 24] = [
    tags::ASF,
    tags::CPU,
    tags::CHIP,
    tags::AGAC,
    tags::CIAA,
    tags::CIAB,
    tags::ROM,
    tags::DSK[0],
    tags::DSK[1],
    tags::DSK[2],
    tags::DSK[3],
    tags::AUD[0],
    tags::AUD[1],
    tags::AUD[2],
    tags::AUD[3],
    tags::SPR[0],
    tags::SPR[1],
    tags::SPR[2],
    tags::SPR[3],
    tags::SPR[4],
    tags::SPR[5],
    tags::SPR[6],
    tags::SPR[7],
    tags::END,
];

/// RAM bank images in chip, slow, fast order.
pub const MEMORY_TAGS: [Tag; 3] = [tags::CRAM, tags::BRAM, tags::FRAM];

/// Expansion RAM, RTG boards, filesystems and other state the loader has
/// no way to put back.
pub const UNSUPPORTED_TAGS: [Tag; 13] = [
    Tag::new(b"FRA2"),
    Tag::new(b"FRA3"),
    Tag::new(b"FRA4"),
    Tag::new(b"ZRA2"),
    Tag::new(b"ZRA3"),
    Tag::new(b"ZRA4"),
    Tag::new(b"ZCRM"),
    Tag::new(b"PRAM"),
    Tag::new(b"A3K1"),
    Tag::new(b"A3K2"),
    Tag::new(b"BORO"),
    Tag::new(b"P96 "),
    Tag::new(b"FSYS"),
];
