//! Register replay: puts the staged state back into the hardware.
//!
//! Runs after the hand-off with interrupts masked and nothing but the bus
//! underneath. The order is fixed:
//!
//! 1. RAM banks (inflate or copy to their physical base)
//! 2. floppy heads, through CIA-B port B
//! 3. AGA palette
//! 4. custom registers, minus DMA/interrupt control and the sprite and
//!    audio blocks
//! 5. audio channels
//! 6. sprites
//! 7. both CIAs, timers and TOD stopped
//! 8. DMA, interrupts and CIA timer start, last
//!
//! Staged payloads are read field by field from scratch memory; reads past
//! the end of a short chunk yield zero.

use format_uss::{FLAG_COMPRESSED, HEADER_LEN};
use stateload_core::map::{FLOPPY_CYLINDERS, cia, custom};
use stateload_core::{ChipBus, Cia, CiaId, CpuContext, Custom};

use crate::image::{BankImage, StateImage};
use crate::inflate;
use crate::state::{BankKind, Slot, Staged};

/// Step pulses before a drive that never reports track 0 is given up on.
pub const MAX_SEEK_PULSES: u32 = 80;
/// Scanlines to let a selected drive settle.
const SETTLE_LINES: u32 = 100;
/// Scanlines between step pulses.
const STEP_LINES: u32 = 200;

/// COLOR00 once every bank is in place.
const RAM_DONE_COLOR: u16 = 0x0440;
/// COLOR00 once the floppy heads are positioned.
const FLOPPY_DONE_COLOR: u16 = 0x0444;

/// Replay entry carried through the hand-off: decode the state image at
/// `state_addr` and replay it.
pub fn replay_entry(state_addr: &u32, bus: &mut dyn ChipBus) -> CpuContext {
    let image = StateImage::read_from(bus, *state_addr);
    replay(&image, bus)
}

/// Restore everything `image` describes and return the CPU context to
/// resume.
pub fn replay(image: &StateImage, bus: &mut dyn ChipBus) -> CpuContext {
    for kind in BankKind::ALL {
        poke(bus, custom::COLOR00, kind.progress_color());
        if let Some(bank) = image.bank(kind) {
            // Nothing is left to report a bad stream to; the bank keeps
            // whatever was inflated before the error.
            let _ = materialize(bus, bank);
        }
    }
    poke(bus, custom::COLOR00, RAM_DONE_COLOR);

    for n in 0..4u8 {
        if let Some(dsk) = image.slot(Slot::Dsk(n)) {
            restore_floppy(bus, dsk, n);
        }
    }
    poke(bus, custom::COLOR00, FLOPPY_DONE_COLOR);

    if let Some(agac) = image.slot(Slot::Agac) {
        restore_aga_palette(bus, agac);
    }
    if let Some(chip) = image.slot(Slot::Chip) {
        restore_custom(bus, chip);
    }
    for n in 0..4u8 {
        if let Some(aud) = image.slot(Slot::Aud(n)) {
            restore_audio(bus, aud, n);
        }
    }
    for n in 0..8u8 {
        if let Some(spr) = image.slot(Slot::Spr(n)) {
            restore_sprite(bus, spr, n);
        }
    }
    let cias = [(Slot::CiaA, CiaId::A), (Slot::CiaB, CiaId::B)];
    for (slot, id) in cias {
        if let Some(p) = image.slot(slot) {
            restore_cia(bus, p, id);
        }
    }

    if let Some(chip) = image.slot(Slot::Chip) {
        start_custom(bus, chip);
    }
    for (slot, id) in cias {
        if let Some(p) = image.slot(slot) {
            start_cia(bus, p, id);
        }
    }

    image
        .slot(Slot::Cpu)
        .map(|cpu| cpu_context(bus, cpu))
        .unwrap_or_default()
}

/// Inflate or copy one bank image to its physical base.
pub fn materialize(bus: &mut dyn ChipBus, bank: &BankImage) -> Result<u32, inflate::InflateError> {
    // Staged chunk: header, RAM size, then the image or zlib stream.
    let data = bank.staged + HEADER_LEN + 4;
    let data_len = bank.payload_len.saturating_sub(4);
    if bank.flags & FLAG_COMPRESSED != 0 {
        inflate::inflate(bus, data, data_len, bank.target, bank.required)
    } else {
        let len = bank.required.min(data_len);
        inflate::copy(bus, data, bank.target, len);
        Ok(len)
    }
}

fn poke(bus: &mut dyn ChipBus, reg: u16, value: u16) {
    Custom::new(bus).write(reg, value);
}

fn peek(bus: &mut dyn ChipBus, reg: u16) -> u16 {
    Custom::new(bus).read(reg)
}

fn byte(bus: &mut dyn ChipBus, p: Staged, offset: u32) -> u8 {
    if offset < p.len {
        bus.read_byte(p.addr + offset)
    } else {
        0
    }
}

fn word(bus: &mut dyn ChipBus, p: Staged, offset: u32) -> u16 {
    u16::from(byte(bus, p, offset)) << 8 | u16::from(byte(bus, p, offset + 1))
}

fn long(bus: &mut dyn ChipBus, p: Staged, offset: u32) -> u32 {
    u32::from(word(bus, p, offset)) << 16 | u32::from(word(bus, p, offset + 2))
}

/// Busy-wait for `lines` scanlines by watching the beam.
fn wait_lines(bus: &mut dyn ChipBus, lines: u32) {
    let mut line = peek(bus, custom::VHPOSR) & 0xFF00;
    for _ in 0..lines {
        loop {
            let now = peek(bus, custom::VHPOSR) & 0xFF00;
            if now != line {
                line = now;
                break;
            }
        }
    }
}

fn step_head(bus: &mut dyn ChipBus) {
    let mut ciab = Cia::new(bus, CiaId::B);
    ciab.clear_bits(cia::PRB, cia::PRB_DSKSTEP);
    // Held low for two accesses.
    ciab.clear_bits(cia::PRB, cia::PRB_DSKSTEP);
    ciab.set_bits(cia::PRB, cia::PRB_DSKSTEP);
    wait_lines(bus, STEP_LINES);
}

fn track0(bus: &mut dyn ChipBus) -> bool {
    Cia::new(bus, CiaId::A).read(cia::PRA) & cia::PRA_DSKTRACK0 == 0
}

/// Seek drive `n` to track 0, then out to the saved cylinder.
///
/// A drive that never reports track 0 within [`MAX_SEEK_PULSES`] is taken
/// to be absent and deselected again.
fn restore_floppy(bus: &mut dyn ChipBus, dsk: Staged, n: u8) {
    let state = byte(bus, dsk, 4);
    let track = byte(bus, dsk, 5);
    if state & 0x02 != 0 || track >= FLOPPY_CYLINDERS {
        return;
    }
    let select = cia::PRB_DSKSEL0 << n;
    {
        let mut ciab = Cia::new(bus, CiaId::B);
        ciab.write(cia::PRB, 0xFF);
        if state & 0x01 != 0 {
            ciab.clear_bits(cia::PRB, cia::PRB_DSKMOTOR);
        }
        ciab.clear_bits(cia::PRB, select);
    }
    wait_lines(bus, SETTLE_LINES);

    let mut pulses = 0;
    let found = loop {
        if track0(bus) {
            break true;
        }
        if pulses == MAX_SEEK_PULSES {
            break false;
        }
        step_head(bus);
        pulses += 1;
    };
    wait_lines(bus, SETTLE_LINES);
    if !found {
        Cia::new(bus, CiaId::B).set_bits(cia::PRB, cia::PRB_DSKMOTOR | select);
        return;
    }

    Cia::new(bus, CiaId::B).clear_bits(cia::PRB, cia::PRB_DSKDIREC);
    wait_lines(bus, SETTLE_LINES);
    for _ in 0..track {
        step_head(bus);
    }
    Cia::new(bus, CiaId::B).set_bits(cia::PRB, select);
}

/// Write all 256 AGA colours, high nibbles then low nibbles, bank by
/// bank. Does nothing on OCS/ECS.
fn restore_aga_palette(bus: &mut dyn ChipBus, agac: Staged) {
    if peek(bus, custom::VPOSR) & 0x0F00 != 0x0300 {
        return;
    }
    for bank in 0..8u16 {
        for low in [false, true] {
            let loct = if low { 0x0200 } else { 0 };
            poke(bus, custom::BPLCON3, bank << 13 | loct);
            for j in 0..32u16 {
                let mut c = long(bus, agac, u32::from(j + bank * 32) * 4);
                if !low {
                    c >>= 4;
                }
                let mut color = (c & 0x00F) | ((c & 0xF00) >> 4) | ((c & 0xF_0000) >> 8);
                if !low && c & 0x0800_0000 != 0 {
                    color |= 0x8000;
                }
                poke(bus, custom::COLOR00 + j * 2, color as u16);
            }
        }
    }
    poke(bus, custom::BPLCON3, custom::BPLCON3_DEFAULT);
}

/// True for registers written by a later step, or not at all.
fn deferred(reg: u16) -> bool {
    (custom::SPR_PT_BASE..custom::SPR_END).contains(&reg)
        || (custom::AUD_BASE..custom::AUD_END).contains(&reg)
        || matches!(
            reg,
            custom::BLTSIZE | custom::BLTSIZH | custom::DMACON | custom::INTENA | custom::INTREQ
        )
        || (reg >= custom::SYNC_BASE && reg != custom::BEAMCON0 && reg != custom::FMODE)
}

fn restore_custom(bus: &mut dyn ChipBus, chip: Staged) {
    for reg in (0..custom::END).step_by(2) {
        if deferred(reg) {
            continue;
        }
        let mut v = word(bus, chip, 4 + u32::from(reg));
        match reg {
            custom::BEAMCON0 => v &= custom::BEAMCON0_PAL,
            custom::ADKCON => v |= custom::SETCLR,
            _ => {}
        }
        poke(bus, reg, v);
    }
}

fn restore_audio(bus: &mut dyn ChipBus, aud: Staged, n: u8) {
    let base = custom::AUD_BASE + u16::from(n) * custom::AUD_STRIDE;
    let fields = [
        (custom::AUD_VOL, u16::from(byte(bus, aud, 1))),
        (custom::AUD_LEN, word(bus, aud, 6)),
        (custom::AUD_PER, word(bus, aud, 10)),
        (custom::AUD_LCH, word(bus, aud, 12)),
        (custom::AUD_LCL, word(bus, aud, 14)),
    ];
    for (reg, v) in fields {
        poke(bus, base + reg, v);
    }
}

fn restore_sprite(bus: &mut dyn ChipBus, spr: Staged, n: u8) {
    let pt = custom::SPR_PT_BASE + u16::from(n) * 4;
    let pos = custom::SPR_POS_BASE + u16::from(n) * 8;
    let fields = [
        (pt, word(bus, spr, 0)),
        (pt + 2, word(bus, spr, 2)),
        (pos, word(bus, spr, 4)),
        (pos + 2, word(bus, spr, 6)),
    ];
    for (reg, v) in fields {
        poke(bus, reg, v);
    }
}

/// Write a TOD or alarm triple. Latched state files are written low byte
/// first; otherwise the high byte goes first so the counter halts until
/// the low byte restarts it.
fn write_tod(bus: &mut dyn ChipBus, id: CiaId, p: Staged, at: u32, latched: bool) {
    let [lo, mid, hi] = [at, at + 1, at + 2].map(|o| byte(bus, p, o));
    let mut c = Cia::new(bus, id);
    if latched {
        c.write(cia::TODLOW, lo);
        c.write(cia::TODMID, mid);
        c.write(cia::TODHI, hi);
    } else {
        c.write(cia::TODHI, hi);
        c.write(cia::TODMID, mid);
        c.write(cia::TODLOW, lo);
    }
}

fn restore_cia(bus: &mut dyn ChipBus, p: Staged, id: CiaId) {
    let f: [u8; 28] = std::array::from_fn(|i| byte(bus, p, i as u32));
    let flags = f[27];
    {
        let mut c = Cia::new(bus, id);
        c.clear_bits(cia::CRA, cia::CR_START | cia::CR_RUNMODE);
        c.clear_bits(cia::CRB, cia::CR_START | cia::CR_RUNMODE);
        let _ = c.read(cia::ICR);
        c.write(cia::ICR, cia::ICR_ALL);
    }
    poke(bus, custom::INTREQ, custom::CLEAR_ALL);

    {
        let mut c = Cia::new(bus, id);
        c.write(cia::PRA, f[0]);
        c.write(cia::PRB, f[1]);
        c.write(cia::DDRA, f[2]);
        c.write(cia::DDRB, f[3]);

        // Counter values first, through the latch and a forced load.
        c.write(cia::TALO, f[4]);
        c.write(cia::TAHI, f[5]);
        c.write(cia::TBLO, f[6]);
        c.write(cia::TBHI, f[7]);
        c.set_bits(cia::CRA, cia::CR_LOAD);
        c.set_bits(cia::CRB, cia::CR_LOAD);

        // Then the latches the timers reload from.
        c.write(cia::TALO, f[17]);
        c.write(cia::TAHI, f[18]);
        c.write(cia::TBLO, f[19]);
        c.write(cia::TBHI, f[20]);

        c.set_bits(cia::CRB, cia::CRB_ALARM);
    }
    write_tod(bus, id, p, 24, flags & 0x02 != 0);
    Cia::new(bus, id).clear_bits(cia::CRB, cia::CRB_ALARM);
    write_tod(bus, id, p, 8, flags & 0x01 != 0);
}

/// DMA and interrupts, each as one masked write.
fn start_custom(bus: &mut dyn ChipBus, chip: Staged) {
    poke(bus, custom::INTENA, custom::CLEAR_ALL);
    poke(bus, custom::INTREQ, custom::CLEAR_ALL);
    poke(bus, custom::DMACON, custom::CLEAR_ALL);
    for reg in [custom::DMACON, custom::INTENA, custom::INTREQ] {
        let v = word(bus, chip, 4 + u32::from(reg));
        poke(bus, reg, v | custom::SETCLR);
    }
}

fn start_cia(bus: &mut dyn ChipBus, p: Staged, id: CiaId) {
    let cra = byte(bus, p, 14);
    let crb = byte(bus, p, 15);
    let mask = byte(bus, p, 16);
    let mut c = Cia::new(bus, id);
    let _ = c.read(cia::ICR);
    c.write(cia::CRA, cra & !cia::CR_LOAD);
    c.write(cia::CRB, crb & !cia::CR_LOAD);
    c.write(cia::ICR, mask | cia::ICR_SETCLR);
}

/// The CPU context saved in a CPU chunk.
fn cpu_context(bus: &mut dyn ChipBus, p: Staged) -> CpuContext {
    let model = long(bus, p, 0);
    let d = std::array::from_fn(|i| long(bus, p, 8 + 4 * i as u32));
    let a = std::array::from_fn(|i| long(bus, p, 40 + 4 * i as u32));
    CpuContext {
        model,
        d,
        a,
        pc: long(bus, p, 72),
        usp: long(bus, p, 80),
        isp: long(bus, p, 84),
        sr: word(bus, p, 88),
        vbr: if model >= 68010 { long(bus, p, 98) } else { 0 },
    }
}
