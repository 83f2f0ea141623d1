//! Simulated live Amiga for the state loader.
//!
//! Stands in for the real machine behind the loader's three hardware
//! seams: the memory list and allocator ([`Exec`]), the chip register and
//! RAM address space ([`ChipBus`]) and the process services used during
//! takeover ([`Supervisor`]). Every bus write is recorded so tests can
//! check what the loader did and in which order.

pub mod config;
pub mod custom;
pub mod memory;

use std::cell::Cell;
use std::collections::VecDeque;
use std::io::Read;

use drive_amiga_floppy::{AmigaFloppyDrive, DriveControl};
use mos_cia_8520::Cia8520;
use stateload_core::map::{self, cia};
use stateload_core::{
    ChipBus, CiaId, CodeSegment, Exec, Handoff, MemHeader, PoolId, Resumed, Supervisor,
};

pub use crate::config::{
    AmigaModel, Chipset, ConfigError, LOADER_ENTRIES, MachineConfig, RamSpec, Region,
};
use crate::custom::{BeamEdges, CustomChips};
use crate::memory::RamRegion;
pub use drive_amiga_floppy;
pub use mos_cia_8520;

/// Chip RAM below this is taken by exec vectors and the chip memory header.
const CHIP_HEADER: u32 = 0x400;
/// Header at the start of every other region.
const REGION_HEADER: u32 = 0x20;
/// Chip RAM the running system holds (screen, copper lists, buffers).
const SYSTEM_CHIP_USE: u32 = 0xC000;
/// CIA-A PRA bit 5, active low: motor at speed.
const PRA_DSKRDY: u8 = 0x20;

/// One recorded bus write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Ram { addr: u32, len: u32 },
    Custom { reg: u16, value: u16 },
    Cia { cia: CiaId, reg: u8, value: u8 },
}

/// One recorded allocator call that changed the memory list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOp {
    Allocate { pool: PoolId, addr: u32, size: u32 },
    AllocAbs { addr: u32, size: u32 },
    Deallocate { pool: PoolId, addr: u32, size: u32 },
    FreeMem { addr: u32, size: u32 },
}

/// Where the operator's key press comes from.
pub enum KeySource {
    /// Pre-answered; `None` once exhausted.
    Scripted(VecDeque<u8>),
    /// The process's standard input.
    Stdin,
}

pub struct SimMachine {
    config: MachineConfig,
    /// Memory list, highest priority first.
    regions: Vec<RamRegion>,
    rom: Vec<u8>,
    custom: CustomChips,
    cias: [Cia8520; 2],
    drives: [AmigaFloppyDrive; 4],
    code: Option<CodeSegment>,
    keys: KeySource,
    forbid_depth: u32,
    unguarded_scans: Cell<u32>,
    failed_abs: u32,
    exec_log: Vec<ExecOp>,
    trace: Vec<BusEvent>,
    display_on: bool,
    delayed_ticks: u32,
    os_alive: bool,
    handoff_at: Option<usize>,
}

impl SimMachine {
    pub fn new(config: MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    #[must_use]
    pub fn preset(model: AmigaModel) -> Self {
        Self::build(MachineConfig::preset(model))
    }

    fn build(config: MachineConfig) -> Self {
        let mut specs: Vec<(u32, u32, u32)> = config
            .extra_ram
            .iter()
            .map(|r| (r.base, r.size, REGION_HEADER))
            .collect();
        if config.fast_ram > 0 {
            specs.push((map::FAST_RAM_BASE, config.fast_ram, REGION_HEADER));
        }
        if config.slow_ram > 0 {
            specs.push((map::SLOW_RAM_BASE, config.slow_ram, REGION_HEADER));
        }
        specs.push((map::CHIP_RAM_BASE, config.chip_ram, CHIP_HEADER));
        let mut regions: Vec<RamRegion> = specs
            .into_iter()
            .enumerate()
            .map(|(i, (base, size, header))| RamRegion::new(PoolId(i as u32), base, size, header))
            .collect();

        // The system's own chip buffers, then the loader's code segment from
        // the first region with room, as AllocMem would place it.
        if let Some(chip) = regions.last_mut() {
            let _ = chip.allocate(SYSTEM_CHIP_USE);
        }
        let code = regions.iter_mut().find_map(|r| {
            let base = r.allocate(config.code_size)?;
            for i in 0..config.code_size {
                r.write_byte(base + i, (i as u8) ^ 0xA5);
            }
            Some(CodeSegment {
                base,
                size: config.code_size,
                entries: config.entries,
            })
        });

        let mut rom = vec![0xFFu8; config.rom_size as usize];
        let magic: u32 = if config.rom_size > 256 * 1024 { 0x1114_4EF9 } else { 0x1111_4EF9 };
        rom[0..4].copy_from_slice(&magic.to_be_bytes());
        let v = map::ROM_VERSION_OFFSET as usize;
        rom[v..v + 2].copy_from_slice(&config.kickstart_version.to_be_bytes());
        let r = map::ROM_REVISION_OFFSET as usize;
        rom[r..r + 2].copy_from_slice(&config.kickstart_revision.to_be_bytes());

        let mut drives: [AmigaFloppyDrive; 4] = std::array::from_fn(|_| AmigaFloppyDrive::absent());
        for (slot, &cyl) in drives.iter_mut().zip(&config.drives) {
            *slot = AmigaFloppyDrive::new(cyl);
        }

        let custom = CustomChips::new(config.chipset, config.region, config.vposr_id());
        let mut machine = Self {
            config,
            regions,
            rom,
            custom,
            cias: [Cia8520::new("A"), Cia8520::new("B")],
            drives,
            code,
            keys: KeySource::Scripted(VecDeque::new()),
            forbid_depth: 0,
            unguarded_scans: Cell::new(0),
            failed_abs: 0,
            exec_log: Vec::new(),
            trace: Vec::new(),
            display_on: true,
            delayed_ticks: 0,
            os_alive: true,
            handoff_at: None,
        };
        machine.power_on_state();
        machine
    }

    /// Register state as Kickstart leaves it at the shell prompt.
    fn power_on_state(&mut self) {
        self.custom.write(map::custom::DMACON, 0x83F0);
        self.custom.write(map::custom::INTENA, 0xC02C);
        let [a, b] = &mut self.cias;
        a.write(cia::DDRA, 0x03);
        a.write(cia::PRA, 0xFC);
        a.write(cia::CRA, 0x01);
        b.write(cia::DDRB, 0xFF);
        b.write(cia::PRB, 0xFF);
        self.update_drives();
    }

    /// Answer the operator prompt from a fixed sequence.
    #[must_use]
    pub fn with_keys(mut self, keys: impl IntoIterator<Item = u8>) -> Self {
        self.keys = KeySource::Scripted(keys.into_iter().collect());
        self
    }

    /// Read the operator's key from standard input.
    #[must_use]
    pub fn with_stdin_keys(mut self) -> Self {
        self.keys = KeySource::Stdin;
        self
    }

    /// Model a loader started from Workbench: no CLI, no code segment.
    pub fn detach_from_shell(&mut self) {
        self.code = None;
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn custom(&self) -> &CustomChips {
        &self.custom
    }

    pub fn cia(&self, id: CiaId) -> &Cia8520 {
        &self.cias[id.index()]
    }

    pub fn drive(&self, n: usize) -> &AmigaFloppyDrive {
        &self.drives[n]
    }

    /// Every bus write since power-on.
    pub fn trace(&self) -> &[BusEvent] {
        &self.trace
    }

    /// Bus writes made by the replay routine after the hand-off.
    pub fn replay_trace(&self) -> &[BusEvent] {
        self.handoff_at.map_or(&[], |at| &self.trace[at..])
    }

    pub fn exec_log(&self) -> &[ExecOp] {
        &self.exec_log
    }

    pub fn forbid_depth(&self) -> u32 {
        self.forbid_depth
    }

    /// Memory list walks made without Forbid.
    pub fn unguarded_scans(&self) -> u32 {
        self.unguarded_scans.get()
    }

    /// AllocAbs requests that could not be satisfied.
    pub fn failed_abs(&self) -> u32 {
        self.failed_abs
    }

    pub fn display_on(&self) -> bool {
        self.display_on
    }

    pub fn delayed_ticks(&self) -> u32 {
        self.delayed_ticks
    }

    pub fn os_alive(&self) -> bool {
        self.os_alive
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.custom.intena & 0x4000 != 0
    }

    pub fn regions(&self) -> &[RamRegion] {
        &self.regions
    }

    /// Free bytes in the region that starts at `base`.
    pub fn free_bytes(&self, base: u32) -> Option<u32> {
        self.regions.iter().find(|r| r.base == base).map(RamRegion::free_bytes)
    }

    /// RAM contents without going through the bus.
    pub fn ram(&self, addr: u32, len: usize) -> Option<&[u8]> {
        let region = self.regions.iter().find(|r| r.contains(addr))?;
        let span = region.span(addr, len);
        (span.len() == len).then(|| &region.data[span])
    }

    fn region_at(&mut self, addr: u32) -> Option<&mut RamRegion> {
        self.regions.iter_mut().find(|r| r.contains(addr))
    }

    fn step_line(&mut self) {
        let edges = self.custom.advance_line();
        self.beam_edges(edges);
    }

    fn beam_edges(&mut self, edges: BeamEdges) {
        if edges.hsync {
            self.cias[1].tod_pulse();
        }
        if edges.vsync {
            self.cias[0].tod_pulse();
        }
    }

    /// Drive CIA-B PRB onto the four mechanisms and feed their status back
    /// to CIA-A PRA.
    fn update_drives(&mut self) {
        let pins = self.cias[1].port_b_pins();
        let control = DriveControl::from_prb(pins);
        let mut status = 0xFF;
        for (n, drive) in self.drives.iter_mut().enumerate() {
            drive.update_control(control, pins & (cia::PRB_DSKSEL0 << n) == 0);
            let s = drive.status();
            if s.track0 {
                status &= !cia::PRA_DSKTRACK0;
            }
            if s.ready {
                status &= !PRA_DSKRDY;
            }
        }
        self.cias[0].external_a = status;
    }

    fn is_custom(addr: u32) -> bool {
        (map::CUSTOM_BASE..map::CUSTOM_BASE + 0x200).contains(&addr)
    }

    fn rom_byte(&self, addr: u32) -> u8 {
        let offset = (addr - map::ROM_BASE) as usize % self.rom.len();
        self.rom[offset]
    }
}

impl ChipBus for SimMachine {
    fn read_byte(&mut self, addr: u32) -> u8 {
        if let Some((id, reg)) = CiaId::decode(addr) {
            return self.cias[id.index()].read(reg);
        }
        if Self::is_custom(addr) {
            let word = self.read_word(addr & !1);
            return if addr & 1 == 0 { (word >> 8) as u8 } else { word as u8 };
        }
        if (map::ROM_BASE..0x0100_0000).contains(&addr) {
            return self.rom_byte(addr);
        }
        self.regions
            .iter()
            .find(|r| r.contains(addr))
            .map_or(0xFF, |r| r.read_byte(addr))
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        if let Some((id, reg)) = CiaId::decode(addr) {
            self.cias[id.index()].write(reg, value);
            self.trace.push(BusEvent::Cia { cia: id, reg, value });
            if id == CiaId::B && (reg == cia::PRB || reg == cia::DDRB) {
                self.update_drives();
            }
            return;
        }
        // Custom registers only decode word cycles; ROM is read-only.
        if let Some(region) = self.region_at(addr) {
            region.write_byte(addr, value);
            self.trace.push(BusEvent::Ram { addr, len: 1 });
        }
    }

    fn read_word(&mut self, addr: u32) -> u16 {
        if Self::is_custom(addr) {
            let (value, edges) = self.custom.read((addr - map::CUSTOM_BASE) as u16);
            self.beam_edges(edges);
            return value;
        }
        u16::from(self.read_byte(addr)) << 8 | u16::from(self.read_byte(addr + 1))
    }

    fn write_word(&mut self, addr: u32, value: u16) {
        if Self::is_custom(addr) {
            let reg = (addr - map::CUSTOM_BASE) as u16;
            self.custom.write(reg, value);
            self.trace.push(BusEvent::Custom { reg, value });
            return;
        }
        self.write_block(addr, &value.to_be_bytes());
    }

    fn write_block(&mut self, addr: u32, data: &[u8]) {
        if let Some(region) = self.region_at(addr) {
            let span = region.span(addr, data.len());
            if span.len() == data.len() {
                region.data[span].copy_from_slice(data);
                self.trace.push(BusEvent::Ram {
                    addr,
                    len: data.len() as u32,
                });
                return;
            }
        }
        for (i, &b) in data.iter().enumerate() {
            self.write_byte(addr + i as u32, b);
        }
    }

    fn read_block(&mut self, addr: u32, buf: &mut [u8]) {
        if let Some(bytes) = self.ram(addr, buf.len()) {
            buf.copy_from_slice(bytes);
            return;
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_byte(addr + i as u32);
        }
    }
}

impl Exec for SimMachine {
    fn forbid(&mut self) {
        self.forbid_depth += 1;
    }

    fn permit(&mut self) {
        self.forbid_depth = self.forbid_depth.saturating_sub(1);
    }

    fn mem_headers(&self) -> Vec<MemHeader> {
        if self.forbid_depth == 0 {
            self.unguarded_scans.set(self.unguarded_scans.get() + 1);
        }
        self.regions.iter().map(RamRegion::header).collect()
    }

    fn allocate(&mut self, pool: PoolId, size: u32) -> Option<u32> {
        if !self.os_alive {
            return None;
        }
        let region = self.regions.iter_mut().find(|r| r.id == pool)?;
        let addr = region.allocate(size)?;
        self.exec_log.push(ExecOp::Allocate { pool, addr, size });
        Some(addr)
    }

    fn deallocate(&mut self, pool: PoolId, addr: u32, size: u32) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.id == pool) {
            region.release(addr, size);
            self.exec_log.push(ExecOp::Deallocate { pool, addr, size });
        }
    }

    fn alloc_abs(&mut self, size: u32, addr: u32) -> Option<u32> {
        let got = if self.os_alive {
            self.region_at(addr).and_then(|r| r.allocate_at(addr, size))
        } else {
            None
        };
        match got {
            Some(a) => self.exec_log.push(ExecOp::AllocAbs { addr: a, size }),
            None => self.failed_abs += 1,
        }
        got
    }

    fn free_mem(&mut self, addr: u32, size: u32) {
        if let Some(region) = self.region_at(addr) {
            region.release(addr, size);
            self.exec_log.push(ExecOp::FreeMem { addr, size });
        }
    }

    fn attn_flags(&self) -> u16 {
        self.config.attn_flags()
    }
}

impl Supervisor for SimMachine {
    fn code_segment(&self) -> Option<CodeSegment> {
        self.code
    }

    fn delay(&mut self, ticks: u32) {
        self.delayed_ticks += ticks;
        for _ in 0..ticks {
            self.wait_tof();
        }
    }

    fn wait_key(&mut self) -> Option<u8> {
        match &mut self.keys {
            KeySource::Scripted(keys) => keys.pop_front(),
            KeySource::Stdin => {
                let mut b = [0u8; 1];
                match std::io::stdin().read(&mut b) {
                    Ok(1) => Some(b[0]),
                    _ => None,
                }
            }
        }
    }

    fn graphics_version(&self) -> u16 {
        self.config.kickstart_version
    }

    fn load_view_null(&mut self) {
        self.display_on = false;
    }

    fn wait_tof(&mut self) {
        for _ in 0..self.custom.lines_to_vblank() {
            self.step_line();
        }
    }

    fn kill_system<S>(&mut self, handoff: Handoff<S>) -> Resumed {
        // The trampoline masks everything before it touches the stack.
        self.os_alive = false;
        self.custom.write(map::custom::INTENA, map::custom::CLEAR_ALL);
        self.custom.write(map::custom::DMACON, map::custom::CLEAR_ALL);
        self.handoff_at = Some(self.trace.len());
        let context = (handoff.replay)(&handoff.state, self);
        Resumed {
            context,
            stack_top: handoff.stack_top,
            inflate_addr: handoff.inflate_addr,
            replay_addr: handoff.replay_addr,
        }
    }
}
