//! MOS 8520 Complex Interface Adapter (CIA), register level.
//!
//! Models what a program writing the register file can observe: the two
//! I/O ports with their data direction registers, the timer counters and
//! latches with the force-load strobe, the 24-bit TOD counter and alarm,
//! and the interrupt control register. Timers do not count; the state
//! loader only ever programs them.

/// CRA/CRB bit 0: timer running.
const CR_START: u8 = 0x01;
/// CRA/CRB bit 4: force-load strobe, never stored.
const CR_LOAD: u8 = 0x10;
/// CRB bit 7: TOD writes go to the alarm.
const CRB_ALARM: u8 = 0x80;

/// MOS 8520 register file.
pub struct Cia8520 {
    label: &'static str,
    port_a: u8,
    port_b: u8,
    ddr_a: u8,
    ddr_b: u8,
    /// Levels driven onto port A pins from outside (active-low drive status).
    pub external_a: u8,
    pub external_b: u8,

    timer_a: u16,
    timer_a_latch: u16,
    timer_b: u16,
    timer_b_latch: u16,

    icr_status: u8,
    icr_mask: u8,

    cra: u8,
    crb: u8,

    sdr: u8,
    tod_counter: u32,
    tod_alarm: u32,

    // TOD read latch: reading the MSB freezes a copy until the LSB is read.
    tod_latch: u32,
    tod_latched: bool,

    // TOD write halt: writing the MSB stops the counter, writing the LSB
    // restarts it, so a high-to-low write sequence is never torn.
    tod_halted: bool,
}

impl Cia8520 {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            port_a: 0xFF,
            port_b: 0xFF,
            ddr_a: 0,
            ddr_b: 0,
            external_a: 0xFF,
            external_b: 0xFF,
            timer_a: 0xFFFF,
            timer_a_latch: 0xFFFF,
            timer_b: 0xFFFF,
            timer_b_latch: 0xFFFF,
            icr_status: 0,
            icr_mask: 0,
            cra: 0,
            crb: 0,
            sdr: 0,
            tod_counter: 0,
            tod_alarm: 0,
            tod_latch: 0,
            tod_latched: false,
            tod_halted: false,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn irq_active(&self) -> bool {
        (self.icr_status & self.icr_mask & 0x1F) != 0
    }

    pub fn read(&mut self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => self.port_a_output(),
            0x01 => (self.port_b & self.ddr_b) | (self.external_b & !self.ddr_b),
            0x02 => self.ddr_a,
            0x03 => self.ddr_b,
            0x04 => self.timer_a as u8,
            0x05 => (self.timer_a >> 8) as u8,
            0x06 => self.timer_b as u8,
            0x07 => (self.timer_b >> 8) as u8,
            0x08 => {
                let val = if self.tod_latched { self.tod_latch } else { self.tod_counter };
                self.tod_latched = false;
                val as u8
            }
            0x09 => {
                let val = if self.tod_latched { self.tod_latch } else { self.tod_counter };
                (val >> 8) as u8
            }
            0x0A => {
                if !self.tod_latched {
                    self.tod_latch = self.tod_counter;
                    self.tod_latched = true;
                }
                (self.tod_latch >> 16) as u8
            }
            0x0C => self.sdr,
            0x0D => self.read_icr_and_clear(),
            0x0E => self.cra,
            0x0F => self.crb,
            _ => 0xFF,
        }
    }

    pub fn read_icr_and_clear(&mut self) -> u8 {
        let any = if self.irq_active() { 0x80 } else { 0x00 };
        let result = self.icr_status | any;
        self.icr_status = 0;
        result
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => self.port_a = value,
            0x01 => self.port_b = value,
            0x02 => self.ddr_a = value,
            0x03 => self.ddr_b = value,
            0x04 => self.timer_a_latch = (self.timer_a_latch & 0xFF00) | u16::from(value),
            0x05 => {
                self.timer_a_latch = (self.timer_a_latch & 0x00FF) | (u16::from(value) << 8);
                if self.cra & CR_START == 0 {
                    self.timer_a = self.timer_a_latch;
                }
            }
            0x06 => self.timer_b_latch = (self.timer_b_latch & 0xFF00) | u16::from(value),
            0x07 => {
                self.timer_b_latch = (self.timer_b_latch & 0x00FF) | (u16::from(value) << 8);
                if self.crb & CR_START == 0 {
                    self.timer_b = self.timer_b_latch;
                }
            }
            0x08 => {
                self.write_tod_register(0, value);
                self.tod_halted = false;
            }
            0x09 => self.write_tod_register(1, value),
            0x0A => {
                self.write_tod_register(2, value);
                self.tod_halted = true;
            }
            0x0C => self.sdr = value,
            0x0D => {
                if value & 0x80 != 0 {
                    self.icr_mask |= value & 0x1F;
                } else {
                    self.icr_mask &= !(value & 0x1F);
                }
            }
            0x0E => {
                if value & CR_LOAD != 0 {
                    self.timer_a = self.timer_a_latch;
                }
                self.cra = value & !CR_LOAD;
            }
            0x0F => {
                if value & CR_LOAD != 0 {
                    self.timer_b = self.timer_b_latch;
                }
                self.crb = value & !CR_LOAD;
            }
            _ => {}
        }
    }

    /// Pulse the TOD input (VSYNC on CIA-A, HSYNC on CIA-B).
    pub fn tod_pulse(&mut self) {
        if self.tod_halted {
            return;
        }
        self.tod_counter = (self.tod_counter.wrapping_add(1)) & 0xFF_FFFF;
        if self.tod_counter == self.tod_alarm {
            self.icr_status |= 0x04;
        }
    }

    fn write_tod_register(&mut self, byte_index: u8, value: u8) {
        let shift = u32::from(byte_index) * 8;
        let mask = !(0xFFu32 << shift);
        if self.crb & CRB_ALARM != 0 {
            self.tod_alarm = ((self.tod_alarm & mask) | (u32::from(value) << shift)) & 0xFF_FFFF;
        } else {
            self.tod_counter = ((self.tod_counter & mask) | (u32::from(value) << shift)) & 0xFF_FFFF;
        }
    }

    pub fn port_a_output(&self) -> u8 {
        (self.port_a & self.ddr_a) | (self.external_a & !self.ddr_a)
    }

    /// Port B pin levels as seen by devices: undriven pins float high.
    pub fn port_b_pins(&self) -> u8 {
        (self.port_b & self.ddr_b) | !self.ddr_b
    }

    pub fn tod_counter(&self) -> u32 { self.tod_counter }
    pub fn tod_alarm(&self) -> u32 { self.tod_alarm }
    pub fn tod_halted(&self) -> bool { self.tod_halted }

    pub fn timer_a(&self) -> u16 { self.timer_a }
    pub fn timer_b(&self) -> u16 { self.timer_b }
    pub fn timer_a_latch(&self) -> u16 { self.timer_a_latch }
    pub fn timer_b_latch(&self) -> u16 { self.timer_b_latch }
    pub fn cra(&self) -> u8 { self.cra }
    pub fn crb(&self) -> u8 { self.crb }
    pub fn icr_status(&self) -> u8 { self.icr_status }
    pub fn icr_mask(&self) -> u8 { self.icr_mask }
    pub fn ddr_a(&self) -> u8 { self.ddr_a }
    pub fn ddr_b(&self) -> u8 { self.ddr_b }
    pub fn sdr(&self) -> u8 { self.sdr }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_high_write_loads_stopped_counter() {
        let mut cia = Cia8520::new("A");
        cia.write(0x04, 0x34);
        cia.write(0x05, 0x12);
        assert_eq!(cia.timer_a(), 0x1234);
        assert_eq!(cia.timer_a_latch(), 0x1234);
    }

    #[test]
    fn force_load_copies_latch_and_is_not_stored() {
        let mut cia = Cia8520::new("A");
        cia.write(0x0E, 0x01); // running: latch writes don't reach the counter
        cia.write(0x04, 0x00);
        cia.write(0x05, 0x40);
        assert_eq!(cia.timer_a(), 0xFFFF);
        cia.write(0x0E, 0x01 | CR_LOAD);
        assert_eq!(cia.timer_a(), 0x4000);
        assert_eq!(cia.cra() & CR_LOAD, 0);
    }

    #[test]
    fn alarm_bit_routes_tod_writes() {
        let mut cia = Cia8520::new("B");
        cia.write(0x0F, CRB_ALARM);
        cia.write(0x0A, 0x01);
        cia.write(0x09, 0x02);
        cia.write(0x08, 0x03);
        cia.write(0x0F, 0);
        assert_eq!(cia.tod_alarm(), 0x01_0203);
        assert_eq!(cia.tod_counter(), 0);
    }

    #[test]
    fn msb_write_halts_until_lsb() {
        let mut cia = Cia8520::new("A");
        cia.write(0x0A, 0x00);
        assert!(cia.tod_halted());
        cia.tod_pulse();
        assert_eq!(cia.tod_counter(), 0);
        cia.write(0x09, 0x00);
        cia.write(0x08, 0x10);
        assert!(!cia.tod_halted());
        cia.tod_pulse();
        assert_eq!(cia.tod_counter(), 0x11);
    }

    #[test]
    fn icr_mask_set_and_clear() {
        let mut cia = Cia8520::new("A");
        cia.write(0x0D, 0x80 | 0x09);
        assert_eq!(cia.icr_mask(), 0x09);
        cia.write(0x0D, 0x01);
        assert_eq!(cia.icr_mask(), 0x08);
        cia.write(0x0D, 0x7F);
        assert_eq!(cia.icr_mask(), 0);
    }

    #[test]
    fn icr_read_clears_status() {
        let mut cia = Cia8520::new("A");
        cia.write(0x0D, 0x84);
        cia.write(0x0F, CRB_ALARM);
        cia.write(0x08, 0x01);
        cia.write(0x0F, 0);
        cia.tod_pulse();
        assert!(cia.irq_active());
        assert_eq!(cia.read(0x0D), 0x84);
        assert_eq!(cia.read(0x0D), 0x00);
    }

    #[test]
    fn port_a_inputs_show_through_undriven_bits() {
        let mut cia = Cia8520::new("A");
        cia.write(0x02, 0x03);
        cia.write(0x00, 0x00);
        cia.external_a = 0xEF;
        assert_eq!(cia.read(0x00), 0xEC);
    }
}
