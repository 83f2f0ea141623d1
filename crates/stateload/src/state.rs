//! The restore state shared by both passes and the takeover.

use format_uss::{FLAG_COMPRESSED, HEADER_LEN, Tag, tags};
use stateload_core::PoolId;
use stateload_core::map::{CHIP_RAM_BASE, FAST_RAM_BASE, SLOW_RAM_BASE};

use crate::banks::{Allocations, Scratch};

/// One of the three fixed-address RAM classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankKind {
    Chip,
    Slow,
    Fast,
}

impl BankKind {
    /// Materialisation order.
    pub const ALL: [Self; 3] = [Self::Chip, Self::Slow, Self::Fast];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Chip => 0,
            Self::Slow => 1,
            Self::Fast => 2,
        }
    }

    #[must_use]
    pub const fn tag(self) -> Tag {
        match self {
            Self::Chip => tags::CRAM,
            Self::Slow => tags::BRAM,
            Self::Fast => tags::FRAM,
        }
    }

    #[must_use]
    pub fn from_tag(tag: Tag) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Physical address the image is restored to.
    #[must_use]
    pub const fn base(self) -> u32 {
        match self {
            Self::Chip => CHIP_RAM_BASE,
            Self::Slow => SLOW_RAM_BASE,
            Self::Fast => FAST_RAM_BASE,
        }
    }

    /// Background colour shown while this bank is materialised.
    #[must_use]
    pub const fn progress_color(self) -> u16 {
        match self {
            Self::Chip => 0x0400,
            Self::Slow => 0x0040,
            Self::Fast => 0x0004,
        }
    }
}

/// What the state file asks of one bank and what the live system offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryBank {
    /// File offset of the chunk header.
    pub offset: u64,
    /// Payload length as stored in the file.
    pub payload_len: u32,
    pub flags: u32,
    /// Uncompressed image size.
    pub required: u32,
    /// Size of the live region found at the bank's base.
    pub capacity: u32,
    /// Address of the staged chunk (header included) after pass 2.
    pub staged: Option<u32>,
}

impl MemoryBank {
    #[must_use]
    pub fn compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// The state file carries an image for this bank.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.payload_len > 0
    }

    /// Bytes staged in pass 2: the chunk header plus its payload.
    #[must_use]
    pub fn staged_len(&self) -> u32 {
        HEADER_LEN + self.payload_len
    }

    /// Capacity the image leaves unused.
    #[must_use]
    pub fn leftover(&self) -> u32 {
        self.capacity.saturating_sub(self.required)
    }
}

/// Register chunk slots, one per tag instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Cpu,
    Chip,
    Agac,
    CiaA,
    CiaB,
    Dsk(u8),
    Aud(u8),
    Spr(u8),
}

pub const SLOT_COUNT: usize = 21;

impl Slot {
    #[must_use]
    pub fn from_tag(tag: Tag) -> Option<Self> {
        let fixed = [
            (tags::CPU, Self::Cpu),
            (tags::CHIP, Self::Chip),
            (tags::AGAC, Self::Agac),
            (tags::CIAA, Self::CiaA),
            (tags::CIAB, Self::CiaB),
        ];
        if let Some(&(_, slot)) = fixed.iter().find(|(t, _)| *t == tag) {
            return Some(slot);
        }
        let indexed = |set: &[Tag]| set.iter().position(|t| *t == tag).map(|n| n as u8);
        indexed(&tags::DSK)
            .map(Self::Dsk)
            .or_else(|| indexed(&tags::AUD).map(Self::Aud))
            .or_else(|| indexed(&tags::SPR).map(Self::Spr))
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Cpu => 0,
            Self::Chip => 1,
            Self::Agac => 2,
            Self::CiaA => 3,
            Self::CiaB => 4,
            Self::Dsk(n) => 5 + n as usize,
            Self::Aud(n) => 9 + n as usize,
            Self::Spr(n) => 13 + n as usize,
        }
    }
}

/// A register chunk payload copied into scratch memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staged {
    pub addr: u32,
    pub len: u32,
}

/// Everything the loader knows between program start and the hand-off.
#[derive(Debug, Default)]
pub struct RestoreState {
    pub banks: [MemoryBank; 3],
    /// Live region claimed by each bank, excluded from scratch selection.
    pub claimed: [Option<PoolId>; 3],
    pub slots: [Option<Staged>; SLOT_COUNT],
    pub scratch: Option<Scratch>,
    pub allocations: Allocations,
    pub errors: u32,
}

impl RestoreState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bank(&self, kind: BankKind) -> &MemoryBank {
        &self.banks[kind.index()]
    }

    pub fn bank_mut(&mut self, kind: BankKind) -> &mut MemoryBank {
        &mut self.banks[kind.index()]
    }

    #[must_use]
    pub fn slot(&self, slot: Slot) -> Option<Staged> {
        self.slots[slot.index()]
    }

    pub fn set_slot(&mut self, slot: Slot, staged: Staged) {
        self.slots[slot.index()] = Some(staged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_indices_are_dense() {
        let mut seen = [false; SLOT_COUNT];
        let all = [Slot::Cpu, Slot::Chip, Slot::Agac, Slot::CiaA, Slot::CiaB]
            .into_iter()
            .chain((0..4).map(Slot::Dsk))
            .chain((0..4).map(Slot::Aud))
            .chain((0..8).map(Slot::Spr));
        for s in all {
            assert!(!seen[s.index()], "{s:?} shares an index");
            seen[s.index()] = true;
        }
        assert!(seen.iter().all(|&b| b));
    }

    #[test]
    fn slots_from_tags() {
        assert_eq!(Slot::from_tag(tags::CIAB), Some(Slot::CiaB));
        assert_eq!(Slot::from_tag(tags::DSK[2]), Some(Slot::Dsk(2)));
        assert_eq!(Slot::from_tag(tags::SPR[7]), Some(Slot::Spr(7)));
        assert_eq!(Slot::from_tag(tags::ROM), None);
        assert_eq!(Slot::from_tag(tags::CRAM), None);
    }

    #[test]
    fn banks_from_memory_tags() {
        assert_eq!(BankKind::from_tag(tags::BRAM), Some(BankKind::Slow));
        assert_eq!(BankKind::from_tag(tags::CPU), None);
        assert_eq!(BankKind::Fast.base(), 0x20_0000);
    }

    #[test]
    fn leftover_never_underflows() {
        let bank = MemoryBank {
            required: 0x10_0000,
            capacity: 0x8_0000,
            ..MemoryBank::default()
        };
        assert_eq!(bank.leftover(), 0);
    }
}
