//! Register bus interface.

use crate::map::{CIA_A_BASE, CIA_B_BASE, CIA_REG_STRIDE, CUSTOM_BASE};

/// Byte/word access to the live machine's address space.
///
/// The loader reaches every chip register, the ROM and RAM through this
/// trait. Addresses are absolute 24-bit Amiga addresses. Word accesses are
/// big-endian and must be word-aligned.
pub trait ChipBus {
    /// Read a byte from the given address.
    fn read_byte(&mut self, addr: u32) -> u8;

    /// Write a byte to the given address.
    fn write_byte(&mut self, addr: u32, value: u8);

    /// Read a big-endian word.
    ///
    /// Custom chip registers only respond to word cycles, so implementations
    /// backed by real hardware must override this with a single access.
    fn read_word(&mut self, addr: u32) -> u16 {
        u16::from(self.read_byte(addr)) << 8 | u16::from(self.read_byte(addr + 1))
    }

    /// Write a big-endian word.
    fn write_word(&mut self, addr: u32, value: u16) {
        self.write_byte(addr, (value >> 8) as u8);
        self.write_byte(addr + 1, value as u8);
    }

    /// Copy `data` into memory starting at `addr`.
    fn write_block(&mut self, addr: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.write_byte(addr + i as u32, b);
        }
    }

    /// Fill `buf` from memory starting at `addr`.
    fn read_block(&mut self, addr: u32, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_byte(addr + i as u32);
        }
    }
}

impl<B: ChipBus + ?Sized> ChipBus for &mut B {
    fn read_byte(&mut self, addr: u32) -> u8 {
        (**self).read_byte(addr)
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        (**self).write_byte(addr, value);
    }

    fn read_word(&mut self, addr: u32) -> u16 {
        (**self).read_word(addr)
    }

    fn write_word(&mut self, addr: u32, value: u16) {
        (**self).write_word(addr, value);
    }

    fn write_block(&mut self, addr: u32, data: &[u8]) {
        (**self).write_block(addr, data);
    }

    fn read_block(&mut self, addr: u32, buf: &mut [u8]) {
        (**self).read_block(addr, buf);
    }
}

/// Custom chip register block at `$DFF000`.
pub struct Custom<'a, B: ChipBus + ?Sized> {
    bus: &'a mut B,
}

impl<'a, B: ChipBus + ?Sized> Custom<'a, B> {
    pub fn new(bus: &'a mut B) -> Self {
        Self { bus }
    }

    /// Read the register at `reg` (offset from `$DFF000`).
    pub fn read(&mut self, reg: u16) -> u16 {
        self.bus.read_word(CUSTOM_BASE + u32::from(reg))
    }

    /// Write the register at `reg` (offset from `$DFF000`).
    pub fn write(&mut self, reg: u16, value: u16) {
        self.bus.write_word(CUSTOM_BASE + u32::from(reg), value);
    }
}

/// Which of the two 8520s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiaId {
    /// `$BFE001`: overlay, keyboard, parallel port, disk status.
    A,
    /// `$BFD000`: serial control, disk control.
    B,
}

impl CiaId {
    #[must_use]
    pub const fn base(self) -> u32 {
        match self {
            Self::A => CIA_A_BASE,
            Self::B => CIA_B_BASE,
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// Decode an absolute address into a CIA and register number.
    ///
    /// CIA-A answers on odd bytes, CIA-B on even bytes, both with the
    /// register number in address bits 8-11.
    #[must_use]
    pub fn decode(addr: u32) -> Option<(Self, u8)> {
        if !(0xBF_D000..0xBF_F000).contains(&addr) {
            return None;
        }
        let reg = ((addr >> 8) & 0x0F) as u8;
        match (addr & 0xF000, addr & 1) {
            (0xE000, 1) => Some((Self::A, reg)),
            (0xD000, 0) => Some((Self::B, reg)),
            _ => None,
        }
    }
}

/// One CIA's register file.
pub struct Cia<'a, B: ChipBus + ?Sized> {
    bus: &'a mut B,
    base: u32,
}

impl<'a, B: ChipBus + ?Sized> Cia<'a, B> {
    pub fn new(bus: &'a mut B, id: CiaId) -> Self {
        Self { bus, base: id.base() }
    }

    fn addr(&self, reg: u8) -> u32 {
        self.base + u32::from(reg & 0x0F) * CIA_REG_STRIDE
    }

    pub fn read(&mut self, reg: u8) -> u8 {
        let addr = self.addr(reg);
        self.bus.read_byte(addr)
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        let addr = self.addr(reg);
        self.bus.write_byte(addr, value);
    }

    /// Read-modify-write: clear `bits`.
    pub fn clear_bits(&mut self, reg: u8, bits: u8) {
        let v = self.read(reg);
        self.write(reg, v & !bits);
    }

    /// Read-modify-write: set `bits`.
    pub fn set_bits(&mut self, reg: u8, bits: u8) {
        let v = self.read(reg);
        self.write(reg, v | bits);
    }
}
