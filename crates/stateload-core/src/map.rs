//! Fixed Amiga memory map, register offsets and port bits.
//!
//! None of these are negotiated at runtime: the chipset decodes them in
//! hardware and the state file assumes the same layout.

/// Chip RAM target base (`CRAM` chunk).
pub const CHIP_RAM_BASE: u32 = 0x00_0000;
/// Slow ("ranger") RAM target base (`BRAM` chunk).
pub const SLOW_RAM_BASE: u32 = 0xC0_0000;
/// 24-bit Zorro II fast RAM target base (`FRAM` chunk).
pub const FAST_RAM_BASE: u32 = 0x20_0000;

/// Scratch memory at or above this address is preferred when two
/// candidates are the same size: it is not chip RAM and never DMA-visible.
pub const PREFERRED_SCRATCH_BASE: u32 = 0x20_0000;
/// Smallest scratch region the loader will work with.
pub const MIN_SCRATCH_SIZE: u32 = 512 * 1024;

/// Custom chip register block.
pub const CUSTOM_BASE: u32 = 0xDF_F000;
/// CIA-A (odd bytes).
pub const CIA_A_BASE: u32 = 0xBF_E001;
/// CIA-B (even bytes).
pub const CIA_B_BASE: u32 = 0xBF_D000;
/// Distance between consecutive CIA registers.
pub const CIA_REG_STRIDE: u32 = 0x100;
/// Kickstart ROM base.
pub const ROM_BASE: u32 = 0xF8_0000;
/// Offset of the Kickstart version word in the ROM image.
pub const ROM_VERSION_OFFSET: u32 = 12;
/// Offset of the Kickstart revision word in the ROM image.
pub const ROM_REVISION_OFFSET: u32 = 14;

/// Highest floppy cylinder the mechanism can reach, plus one.
pub const FLOPPY_CYLINDERS: u8 = 80;

/// Custom chip register offsets from [`CUSTOM_BASE`].
pub mod custom {
    pub const VPOSR: u16 = 0x004;
    pub const VHPOSR: u16 = 0x006;
    pub const BLTSIZE: u16 = 0x058;
    pub const BLTSIZH: u16 = 0x05E;
    pub const DMACON: u16 = 0x096;
    pub const INTENA: u16 = 0x09A;
    pub const INTREQ: u16 = 0x09C;
    pub const ADKCON: u16 = 0x09E;
    /// AUD0LCH; channel `n` starts at `AUD_BASE + n * AUD_STRIDE`.
    pub const AUD_BASE: u16 = 0x0A0;
    pub const AUD_STRIDE: u16 = 0x10;
    pub const AUD_END: u16 = 0x0E0;
    pub const AUD_LCH: u16 = 0x0;
    pub const AUD_LCL: u16 = 0x2;
    pub const AUD_LEN: u16 = 0x4;
    pub const AUD_PER: u16 = 0x6;
    pub const AUD_VOL: u16 = 0x8;
    pub const BPLCON3: u16 = 0x106;
    /// SPR0PTH; sprite `n` pointer pair at `SPR_PT_BASE + n * 4`.
    pub const SPR_PT_BASE: u16 = 0x120;
    /// SPR0POS; sprite `n` POS/CTL pair at `SPR_POS_BASE + n * 8`.
    pub const SPR_POS_BASE: u16 = 0x140;
    pub const SPR_END: u16 = 0x180;
    pub const COLOR00: u16 = 0x180;
    /// First programmed-synchronisation register (HTOTAL).
    pub const SYNC_BASE: u16 = 0x1C0;
    pub const BEAMCON0: u16 = 0x1DC;
    pub const FMODE: u16 = 0x1FC;
    /// One past the last register the state file images.
    pub const END: u16 = 0x1FE;

    /// SET/CLR bit for DMACON, INTENA, INTREQ and ADKCON.
    pub const SETCLR: u16 = 0x8000;
    /// Clears every bit of a SET/CLR register.
    pub const CLEAR_ALL: u16 = 0x7FFF;
    /// BEAMCON0 PAL bit, the only one carried over from the state file.
    pub const BEAMCON0_PAL: u16 = 0x0020;
    /// BPLCON3 value Kickstart leaves behind on AGA.
    pub const BPLCON3_DEFAULT: u16 = 0x0C00;
}

/// CIA register numbers, multiplied by [`CIA_REG_STRIDE`] on the bus.
pub mod cia {
    pub const PRA: u8 = 0x0;
    pub const PRB: u8 = 0x1;
    pub const DDRA: u8 = 0x2;
    pub const DDRB: u8 = 0x3;
    pub const TALO: u8 = 0x4;
    pub const TAHI: u8 = 0x5;
    pub const TBLO: u8 = 0x6;
    pub const TBHI: u8 = 0x7;
    pub const TODLOW: u8 = 0x8;
    pub const TODMID: u8 = 0x9;
    pub const TODHI: u8 = 0xA;
    pub const SDR: u8 = 0xC;
    pub const ICR: u8 = 0xD;
    pub const CRA: u8 = 0xE;
    pub const CRB: u8 = 0xF;

    pub const CR_START: u8 = 0x01;
    pub const CR_RUNMODE: u8 = 0x08;
    pub const CR_LOAD: u8 = 0x10;
    /// CRB bit 7: TOD writes go to the alarm.
    pub const CRB_ALARM: u8 = 0x80;
    pub const ICR_SETCLR: u8 = 0x80;
    pub const ICR_ALL: u8 = 0x7F;

    /// CIA-A PRA bit 4, active low: head at cylinder 0.
    pub const PRA_DSKTRACK0: u8 = 0x10;
    /// CIA-B PRB bit 0, active low step pulse.
    pub const PRB_DSKSTEP: u8 = 0x01;
    /// CIA-B PRB bit 1: high steps outward (towards cylinder 0).
    pub const PRB_DSKDIREC: u8 = 0x02;
    pub const PRB_DSKSIDE: u8 = 0x04;
    /// CIA-B PRB bit 3; drive `n` is selected by bit `3 + n`, active low.
    pub const PRB_DSKSEL0: u8 = 0x08;
    pub const PRB_DSKMOTOR: u8 = 0x80;
}

/// `ExecBase->AttnFlags` CPU bits.
pub mod attn {
    pub const AFF_68010: u16 = 1 << 0;
    pub const AFF_68020: u16 = 1 << 1;
    pub const AFF_68030: u16 = 1 << 2;
    pub const AFF_68040: u16 = 1 << 3;
    pub const AFF_68060: u16 = 1 << 7;
}
