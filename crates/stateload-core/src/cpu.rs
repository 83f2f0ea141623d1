//! 680x0 model identification and the resumable execution context.

use crate::map::attn;

/// A 680x0 family member, by its nominal part number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CpuModel {
    M68000,
    M68010,
    M68020,
    M68030,
    M68040,
    M68060,
}

impl CpuModel {
    /// Newest model a state file may declare and still be restored.
    pub const NEWEST_RESTORABLE: Self = Self::M68030;

    /// Derive the nominal model from `ExecBase->AttnFlags`.
    ///
    /// Each of the 68010/20/30/40 bits adds ten to the part number; the
    /// 68060 bit overrides everything.
    #[must_use]
    pub fn from_attn_flags(flags: u16) -> Self {
        if flags & attn::AFF_68060 != 0 {
            return Self::M68060;
        }
        let steps = [attn::AFF_68010, attn::AFF_68020, attn::AFF_68030, attn::AFF_68040]
            .iter()
            .filter(|&&bit| flags & bit != 0)
            .count();
        match steps {
            0 => Self::M68000,
            1 => Self::M68010,
            2 => Self::M68020,
            3 => Self::M68030,
            _ => Self::M68040,
        }
    }

    /// Parse a part number as stored in the state file (`68020` etc.).
    #[must_use]
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            68000 => Some(Self::M68000),
            68010 => Some(Self::M68010),
            68020 => Some(Self::M68020),
            68030 => Some(Self::M68030),
            68040 => Some(Self::M68040),
            68060 => Some(Self::M68060),
            _ => None,
        }
    }

    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            Self::M68000 => 68000,
            Self::M68010 => 68010,
            Self::M68020 => 68020,
            Self::M68030 => 68030,
            Self::M68040 => 68040,
            Self::M68060 => 68060,
        }
    }
}

/// CPU state captured by the emulator, resumed after register replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuContext {
    /// Declared part number (68000, 68010, ...).
    pub model: u32,
    pub d: [u32; 8],
    /// A0-A7; A7 is the active stack pointer at save time.
    pub a: [u32; 8],
    pub pc: u32,
    pub usp: u32,
    pub isp: u32,
    pub sr: u16,
    /// Vector base, zero on a plain 68000.
    pub vbr: u32,
}

impl CpuContext {
    /// True when the saved status register has the supervisor bit set.
    #[must_use]
    pub fn supervisor(&self) -> bool {
        self.sr & 0x2000 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attn_flags_count_steps() {
        assert_eq!(CpuModel::from_attn_flags(0), CpuModel::M68000);
        assert_eq!(CpuModel::from_attn_flags(attn::AFF_68010), CpuModel::M68010);
        let a1200 = attn::AFF_68010 | attn::AFF_68020;
        assert_eq!(CpuModel::from_attn_flags(a1200), CpuModel::M68020);
        let a3000 = a1200 | attn::AFF_68030;
        assert_eq!(CpuModel::from_attn_flags(a3000), CpuModel::M68030);
        assert_eq!(
            CpuModel::from_attn_flags(a3000 | attn::AFF_68040),
            CpuModel::M68040
        );
    }

    #[test]
    fn attn_68060_bit_overrides() {
        assert_eq!(CpuModel::from_attn_flags(attn::AFF_68060), CpuModel::M68060);
    }

    #[test]
    fn part_numbers_round_trip() {
        for m in [CpuModel::M68000, CpuModel::M68030, CpuModel::M68060] {
            assert_eq!(CpuModel::from_number(m.number()), Some(m));
        }
        assert_eq!(CpuModel::from_number(68050), None);
    }

    #[test]
    fn models_order_by_capability() {
        assert!(CpuModel::M68020 > CpuModel::M68010);
        assert!(CpuModel::M68060 > CpuModel::M68040);
    }
}
