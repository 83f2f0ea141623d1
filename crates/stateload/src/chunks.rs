//! Field decoders for the register chunks the validation pass inspects.

use std::fmt;

use format_uss::{be_u16, be_u32};
use stateload_core::map::ROM_BASE;

/// Chipset generation and video standard, as encoded in VPOSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipsetId {
    pub aga: bool,
    pub ecs: bool,
    pub ntsc: bool,
}

impl ChipsetId {
    #[must_use]
    pub fn from_vposr(vposr: u16) -> Self {
        Self {
            aga: vposr & 0x0F00 == 0x0300,
            ecs: vposr & 0x2000 != 0,
            ntsc: vposr & 0x1000 != 0,
        }
    }

    #[must_use]
    pub fn generation(self) -> &'static str {
        if self.aga {
            "AGA"
        } else if self.ecs {
            "ECS"
        } else {
            "OCS"
        }
    }

    #[must_use]
    pub fn standard(self) -> &'static str {
        if self.ntsc { "NTSC" } else { "PAL" }
    }
}

impl fmt::Display for ChipsetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.generation(), self.standard())
    }
}

/// VPOSR as imaged in a CHIP chunk.
#[must_use]
pub fn chip_vposr(chip: &[u8]) -> Option<u16> {
    be_u16(chip, 4 + 4)
}

/// Part number declared by a CPU chunk.
#[must_use]
pub fn cpu_model(cpu: &[u8]) -> Option<u32> {
    be_u32(cpu, 0)
}

/// The Kickstart image the state was saved with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomInfo {
    pub start: u32,
    pub len: u32,
    pub version: u16,
    pub revision: u16,
    pub crc: u32,
    /// Host path of the image file.
    pub path: String,
}

impl RomInfo {
    #[must_use]
    pub fn parse(rom: &[u8]) -> Option<Self> {
        let mut start = be_u32(rom, 0)?;
        let len = be_u32(rom, 4)?;
        // A 256K image at $F80000 is mirrored; it runs from $FC0000.
        if start == ROM_BASE && len == 256 * 1024 {
            start = 0xFC_0000;
        }
        let id = rom.get(20..).unwrap_or_default();
        let path = id
            .iter()
            .position(|&b| b == 0)
            .map_or(&[][..], |nul| &id[nul + 1..]);
        Some(Self {
            start,
            len,
            version: be_u16(rom, 12)?,
            revision: be_u16(rom, 14)?,
            crc: be_u32(rom, 16)?,
            path: c_string(path),
        })
    }

    /// Last byte of the image.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.start.wrapping_add(self.len).wrapping_sub(1)
    }
}

/// One floppy drive's mechanical state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloppyInfo {
    pub state: u8,
    pub track: u8,
    pub image: String,
}

impl FloppyInfo {
    pub const MOTOR: u8 = 0x01;
    pub const DISABLED: u8 = 0x02;

    #[must_use]
    pub fn parse(dsk: &[u8]) -> Option<Self> {
        Some(Self {
            state: *dsk.get(4)?,
            track: *dsk.get(5)?,
            image: c_string(dsk.get(16..).unwrap_or_default()),
        })
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.state & Self::DISABLED != 0
    }
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vposr_decoding() {
        let a1200 = ChipsetId::from_vposr(0x2300);
        assert!(a1200.aga && a1200.ecs && !a1200.ntsc);
        assert_eq!(a1200.to_string(), "AGA PAL");
        let ntsc_ocs = ChipsetId::from_vposr(0x1000);
        assert_eq!(ntsc_ocs.to_string(), "OCS NTSC");
        assert_eq!(ChipsetId::from_vposr(0x2000).generation(), "ECS");
    }

    #[test]
    fn rom_chunk_with_path() {
        let mut rom = Vec::new();
        rom.extend_from_slice(&0xF8_0000u32.to_be_bytes());
        rom.extend_from_slice(&0x4_0000u32.to_be_bytes());
        rom.extend_from_slice(&0u32.to_be_bytes());
        rom.extend_from_slice(&34u16.to_be_bytes());
        rom.extend_from_slice(&5u16.to_be_bytes());
        rom.extend_from_slice(&0x9FF5_B83Eu32.to_be_bytes());
        rom.extend_from_slice(b"KS1.3\0/roms/kick13.rom\0");
        let info = RomInfo::parse(&rom).expect("rom");
        assert_eq!(info.start, 0xFC_0000);
        assert_eq!(info.end(), 0xFF_FFFF);
        assert_eq!((info.version, info.revision), (34, 5));
        assert_eq!(info.path, "/roms/kick13.rom");
    }

    #[test]
    fn short_rom_chunk_is_rejected() {
        assert_eq!(RomInfo::parse(&[0; 10]), None);
    }

    #[test]
    fn floppy_chunk() {
        let mut dsk = vec![0u8; 16];
        dsk[4] = FloppyInfo::MOTOR;
        dsk[5] = 40;
        dsk.extend_from_slice(b"game.adf\0");
        let info = FloppyInfo::parse(&dsk).expect("dsk");
        assert_eq!(info.track, 40);
        assert_eq!(info.image, "game.adf");
        assert!(!info.disabled());
    }

    #[test]
    fn cpu_and_chip_fields() {
        let mut chip = vec![0u8; 16];
        chip[8] = 0x20;
        assert_eq!(chip_vposr(&chip), Some(0x2000));
        assert_eq!(cpu_model(&68020u32.to_be_bytes()), Some(68020));
        assert_eq!(cpu_model(&[0, 1]), None);
    }
}
