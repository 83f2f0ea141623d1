//! Custom chip register file with the beam counter and palette.

use stateload_core::map::custom as reg;

use crate::config::{Chipset, Region};

const DMACONR: u16 = 0x002;
const ADKCONR: u16 = 0x010;
const INTENAR: u16 = 0x01C;
const INTREQR: u16 = 0x01E;
/// BPLCON3 LOCT: colour writes go to the low nibbles.
const BPLCON3_LOCT: u16 = 0x0200;

pub struct CustomChips {
    chipset: Chipset,
    region: Region,
    vposr_id: u16,
    /// Last value written to every register, write-only ones included.
    shadow: [u16; 0x100],
    pub dmacon: u16,
    pub intena: u16,
    pub intreq: u16,
    pub adkcon: u16,
    pub vpos: u16,
    pub frame: u64,
    /// 24-bit palette (`$RRGGBB`); OCS/ECS use the first 32 entries.
    palette: [u32; 256],
    /// Genlock transparency bits.
    genlock: [bool; 256],
}

/// What one beam step crossed, for the CIA TOD inputs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BeamEdges {
    pub hsync: bool,
    pub vsync: bool,
}

impl CustomChips {
    pub fn new(chipset: Chipset, region: Region, vposr_id: u16) -> Self {
        Self {
            chipset,
            region,
            vposr_id,
            shadow: [0; 0x100],
            dmacon: 0,
            intena: 0,
            intreq: 0,
            adkcon: 0,
            vpos: 0,
            frame: 0,
            palette: [0; 256],
            genlock: [false; 256],
        }
    }

    pub fn read(&mut self, offset: u16) -> (u16, BeamEdges) {
        let mut edges = BeamEdges::default();
        let value = match offset & 0x1FE {
            DMACONR => self.dmacon,
            ADKCONR => self.adkcon,
            INTENAR => self.intena,
            INTREQR => self.intreq,
            reg::VPOSR => self.vposr_id | ((self.vpos >> 8) & 1),
            reg::VHPOSR => {
                // Polling the beam lets it move on.
                edges = self.advance_line();
                (self.vpos & 0xFF) << 8
            }
            _ => 0,
        };
        (value, edges)
    }

    pub fn write(&mut self, offset: u16, value: u16) {
        let offset = offset & 0x1FE;
        self.shadow[usize::from(offset >> 1)] = value;
        match offset {
            reg::DMACON => set_clr(&mut self.dmacon, value),
            reg::INTENA => set_clr(&mut self.intena, value),
            reg::INTREQ => set_clr(&mut self.intreq, value),
            reg::ADKCON => set_clr(&mut self.adkcon, value),
            o if (reg::COLOR00..reg::COLOR00 + 64).contains(&o) => {
                self.write_color(usize::from((o - reg::COLOR00) >> 1), value);
            }
            _ => {}
        }
    }

    fn write_color(&mut self, index: usize, value: u16) {
        if self.chipset != Chipset::Aga {
            let c = u32::from(value & 0x0FFF);
            let r = (c >> 8) & 0xF;
            let g = (c >> 4) & 0xF;
            let b = c & 0xF;
            self.palette[index] = (r * 0x11) << 16 | (g * 0x11) << 8 | (b * 0x11);
            return;
        }
        let bplcon3 = self.shadow[usize::from(reg::BPLCON3 >> 1)];
        let bank = usize::from(bplcon3 >> 13) * 32;
        let slot = &mut self.palette[bank + index];
        let r = u32::from((value >> 8) & 0xF);
        let g = u32::from((value >> 4) & 0xF);
        let b = u32::from(value & 0xF);
        if bplcon3 & BPLCON3_LOCT != 0 {
            *slot = (*slot & 0xF0F0F0) | r << 16 | g << 8 | b;
        } else {
            // High-nibble writes copy into the low nibbles as well.
            *slot = (r * 0x11) << 16 | (g * 0x11) << 8 | (b * 0x11);
            self.genlock[bank + index] = value & 0x8000 != 0;
        }
    }

    /// Move the beam to the start of the next line.
    pub fn advance_line(&mut self) -> BeamEdges {
        self.vpos += 1;
        let mut edges = BeamEdges {
            hsync: true,
            vsync: false,
        };
        if self.vpos >= self.region.lines_per_frame() {
            self.vpos = 0;
            self.frame += 1;
            edges.vsync = true;
        }
        edges
    }

    /// Lines left before the next vertical blank.
    pub fn lines_to_vblank(&self) -> u16 {
        self.region.lines_per_frame() - self.vpos
    }

    /// Last value written to `offset`.
    pub fn shadow(&self, offset: u16) -> u16 {
        self.shadow[usize::from((offset & 0x1FE) >> 1)]
    }

    pub fn color(&self, index: usize) -> u32 {
        self.palette[index]
    }

    pub fn genlock(&self, index: usize) -> bool {
        self.genlock[index]
    }
}

fn set_clr(target: &mut u16, value: u16) {
    if value & reg::SETCLR != 0 {
        *target |= value & 0x7FFF;
    } else {
        *target &= !(value & 0x7FFF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aga() -> CustomChips {
        CustomChips::new(Chipset::Aga, Region::Pal, 0x2300)
    }

    #[test]
    fn set_clr_registers() {
        let mut c = aga();
        c.write(reg::DMACON, 0x8000 | 0x0380);
        c.write(reg::DMACON, 0x0100);
        assert_eq!(c.read(DMACONR).0, 0x0280);
        c.write(reg::INTENA, 0x7FFF);
        assert_eq!(c.intena, 0);
    }

    #[test]
    fn vposr_carries_chip_id() {
        let mut c = aga();
        assert_eq!(c.read(reg::VPOSR).0 & 0x7F00, 0x2300);
    }

    #[test]
    fn vhposr_reads_step_lines_and_wrap_frames() {
        let mut c = aga();
        let first = c.read(reg::VHPOSR).0;
        let second = c.read(reg::VHPOSR).0;
        assert_ne!(first & 0xFF00, second & 0xFF00);
        let mut vsyncs = 0;
        for _ in 0..312 {
            if c.read(reg::VHPOSR).1.vsync {
                vsyncs += 1;
            }
        }
        assert_eq!(vsyncs, 1);
        assert_eq!(c.frame, 1);
    }

    #[test]
    fn aga_color_high_then_low_nibbles() {
        let mut c = aga();
        c.write(reg::BPLCON3, 0x2000);
        c.write(reg::COLOR00 + 2, 0x8ACE);
        assert_eq!(c.color(33), 0xAACCEE);
        assert!(c.genlock(33));
        c.write(reg::BPLCON3, 0x2000 | BPLCON3_LOCT);
        c.write(reg::COLOR00 + 2, 0x0135);
        assert_eq!(c.color(33), 0xA1C3E5);
        assert!(c.genlock(33), "low-nibble write leaves genlock alone");
    }

    #[test]
    fn ocs_color_ignores_banks() {
        let mut c = CustomChips::new(Chipset::Ocs, Region::Pal, 0);
        c.write(reg::BPLCON3, 0xE000);
        c.write(reg::COLOR00, 0x0F80);
        assert_eq!(c.color(0), 0xFF8800);
    }
}
