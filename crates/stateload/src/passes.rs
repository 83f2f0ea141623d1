//! The two passes over the state file, and the state machine around them.
//!
//! Pass 1 validates: every chunk is checked against the live machine and
//! problems are counted rather than returned, so one run reports all of
//! them. Pass 2 stages RAM images and register chunks in scratch memory.
//! Neither pass touches a hardware register.

use std::io::{Read, Seek};

use format_uss::{Body, ChunkError, ChunkHeader, ChunkReader, tags};
use stateload_core::map::custom::VPOSR;
use stateload_core::map::{MIN_SCRATCH_SIZE, ROM_BASE, ROM_REVISION_OFFSET, ROM_VERSION_OFFSET};
use stateload_core::{ChipBus, CpuModel, Custom, Exec, Resumed, Supervisor};
use tracing::{debug, error, info, warn};

use crate::banks::{allocate, allocate_within_bank, find_scratch_region, probe_bank};
use crate::chunks::{ChipsetId, FloppyInfo, RomInfo, chip_vposr, cpu_model};
use crate::error::{LoadError, TakeoverError};
use crate::state::{BankKind, RestoreState, Slot, Staged};
use crate::takeover;

/// Bank images are read from the file in pieces of this size.
const STAGE_BLOCK: u32 = 0x1_0000;

/// Where the loader stands. Each step only runs from the phase before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    Loading,
    TakingOver,
    /// The machine belongs to the replay. On real hardware the loader never
    /// observes this phase.
    Restoring,
}

pub struct Loader<R> {
    reader: ChunkReader<R>,
    state: RestoreState,
    phase: Phase,
}

impl<R: Read + Seek> Loader<R> {
    pub fn new(snapshot: R) -> Self {
        Self {
            reader: ChunkReader::new(snapshot),
            state: RestoreState::new(),
            phase: Phase::Validating,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &RestoreState {
        &self.state
    }

    /// Errors counted so far.
    pub fn errors(&self) -> u32 {
        self.state.errors
    }

    fn expect(&self, expected: Phase) -> Result<(), LoadError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(LoadError::OutOfOrder {
                expected,
                actual: self.phase,
            })
        }
    }

    /// Pass 1: check the state file against the live machine and choose
    /// the scratch region.
    pub fn validate<H>(&mut self, host: &mut H) -> Result<(), LoadError>
    where
        H: Exec + ChipBus + ?Sized,
    {
        self.expect(Phase::Validating)?;
        if let Err(e) = self.scan_validate(host) {
            self.state.errors += 1;
            return Err(e);
        }

        if self.state.errors == 0 {
            match find_scratch_region(host, &self.state) {
                Some(scratch) => {
                    info!("{}k extra RAM at {:08x}.", scratch.size >> 10, scratch.base);
                    self.state.scratch = Some(scratch);
                }
                None => {
                    error!("At least {}k unused RAM required.", MIN_SCRATCH_SIZE >> 10);
                    self.state.errors += 1;
                }
            }
        } else {
            error!("Incompatible hardware configuration.");
        }

        if self.state.errors > 0 {
            return Err(LoadError::PassFailed {
                pass: 1,
                errors: self.state.errors,
            });
        }
        self.phase = Phase::Loading;
        Ok(())
    }

    fn scan_validate<H>(&mut self, host: &mut H) -> Result<(), LoadError>
    where
        H: Exec + ChipBus + ?Sized,
    {
        self.reader.rewind()?;
        let mut first = true;
        loop {
            let offset = self.reader.position()?;
            let chunk = self
                .reader
                .read_chunk()?
                .ok_or(LoadError::TruncatedHeader(offset))?;
            let ChunkHeader { tag, len, flags } = chunk.header;
            if tag == tags::END {
                return Ok(());
            }
            let data = match &chunk.body {
                Body::Unsupported => {
                    error!("Unsupported chunk '{tag}', {len} bytes, flags {flags:08x}.");
                    self.state.errors += 1;
                    continue;
                }
                Body::Skipped => continue,
                Body::Full(data) => {
                    info!("Reading chunk '{tag}', {len} bytes, flags {flags:08x}.");
                    data
                }
                Body::Prefix(data) => {
                    info!("Checking memory chunk '{tag}', {len} bytes, flags {flags:08x}.");
                    data
                }
            };

            if first {
                if tag != tags::ASF {
                    error!("Not UAE statefile.");
                    return Err(LoadError::BadMagic(tag));
                }
                first = false;
                continue;
            }

            if let Some(kind) = BankKind::from_tag(tag) {
                probe_bank(host, &mut self.state, kind, &chunk);
                continue;
            }
            match tag {
                tags::CPU => self.check_cpu(host, data),
                tags::CHIP => check_chipset(host, data),
                tags::ROM => check_rom(host, data),
                _ => {}
            }
        }
    }

    fn check_cpu<H: Exec + ?Sized>(&mut self, host: &H, cpu: &[u8]) {
        let Some(model) = cpu_model(cpu) else {
            error!("CPU chunk is too short.");
            self.state.errors += 1;
            return;
        };
        let live = CpuModel::from_attn_flags(host.attn_flags());
        if model != live.number() {
            warn!("{model} CPU statefile.");
        }
        if model > CpuModel::NEWEST_RESTORABLE.number() {
            error!("Only 68000/68010/68020/68030 statefiles are supported.");
            self.state.errors += 1;
        } else if CpuModel::from_number(model).is_none() {
            warn!("Unknown CPU model {model} in statefile.");
        }
    }

    /// Pass 2: stage bank images and register chunks in scratch memory.
    pub fn load<H>(&mut self, host: &mut H) -> Result<(), LoadError>
    where
        H: Exec + ChipBus + ?Sized,
    {
        self.expect(Phase::Loading)?;
        if let Err(e) = self.scan_load(host) {
            self.state.errors += 1;
            return Err(e);
        }
        for (slot, tag) in [(Slot::Cpu, tags::CPU), (Slot::Chip, tags::CHIP)] {
            if self.state.slot(slot).is_none() {
                error!("No '{tag}' chunk in statefile.");
                self.state.errors += 1;
            }
        }
        if self.state.errors > 0 {
            return Err(LoadError::PassFailed {
                pass: 2,
                errors: self.state.errors,
            });
        }
        self.phase = Phase::TakingOver;
        Ok(())
    }

    fn scan_load<H>(&mut self, host: &mut H) -> Result<(), LoadError>
    where
        H: Exec + ChipBus + ?Sized,
    {
        for kind in BankKind::ALL {
            if self.state.bank(kind).is_required() {
                self.stage_bank(host, kind)?;
            }
        }

        self.reader.rewind()?;
        loop {
            let offset = self.reader.position()?;
            let header = self
                .reader
                .read_chunk_head()?
                .ok_or(LoadError::TruncatedHeader(offset))?;
            if header.tag == tags::END {
                return Ok(());
            }
            match Slot::from_tag(header.tag) {
                Some(slot) if header.len > 0 => self.stage_chunk(host, slot, &header)?,
                _ => self.reader.skip_payload(&header)?,
            }
        }
    }

    /// Copy a whole bank chunk, header included, into staging memory.
    ///
    /// Chip RAM is staged inside the slow or fast bank when they have
    /// room, slow RAM inside the fast bank; those banks are restored later
    /// so the staging copy is consumed before it is overwritten.
    fn stage_bank<H>(&mut self, host: &mut H, kind: BankKind) -> Result<(), LoadError>
    where
        H: Exec + ChipBus + ?Sized,
    {
        let bank = *self.state.bank(kind);
        info!(
            "Memory '{}', size {}k, offset {}. Target {:08x}.",
            kind.tag(),
            bank.required >> 10,
            bank.offset,
            kind.base()
        );
        let len = bank.staged_len();
        let within: &[BankKind] = match kind {
            BankKind::Chip => &[BankKind::Slow, BankKind::Fast],
            BankKind::Slow => &[BankKind::Fast],
            BankKind::Fast => &[],
        };
        let addr = within
            .iter()
            .find_map(|&other| allocate_within_bank(host, &mut self.state, len, other))
            .or_else(|| allocate(host, &mut self.state, len));
        let Some(addr) = addr else {
            error!("Out of memory.");
            self.state.errors += 1;
            return Ok(());
        };
        info!(" - Address {:08x} - {:08x}.", addr, last_byte(addr, len));

        self.reader.seek_to(bank.offset)?;
        let mut done = 0u32;
        while done < len {
            let want = (len - done).min(STAGE_BLOCK);
            let data = self.reader.read_raw(want)?;
            host.write_block(addr + done, &data);
            done += data.len() as u32;
            if data.len() < want as usize {
                break;
            }
        }
        if done != len {
            error!("Read error ({done} != {len}).");
            self.state.errors += 1;
            return Ok(());
        }
        self.state.bank_mut(kind).staged = Some(addr);
        Ok(())
    }

    fn stage_chunk<H>(
        &mut self,
        host: &mut H,
        slot: Slot,
        header: &ChunkHeader,
    ) -> Result<(), LoadError>
    where
        H: Exec + ChipBus + ?Sized,
    {
        let Some(addr) = allocate(host, &mut self.state, header.len) else {
            error!("Not enough memory ({} bytes required).", header.len);
            self.state.errors += 1;
            self.reader.skip_payload(header)?;
            return Ok(());
        };
        let data = match self.reader.read_payload(header) {
            Ok(data) => data,
            Err(ChunkError::ShortPayload { .. }) => {
                error!("Read error.");
                self.state.errors += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        host.write_block(addr, &data);
        self.state.set_slot(
            slot,
            Staged {
                addr,
                len: header.len,
            },
        );
        debug!("chunk '{}' staged at {addr:08x}", header.tag);

        if let Slot::Dsk(n) = slot {
            if let Some(info) = FloppyInfo::parse(&data).filter(|i| !i.disabled()) {
                info!("DF{n}: Track {}, '{}'.", info.track, info.image);
            }
        }
        Ok(())
    }

    /// Hand the machine over to the replay.
    ///
    /// On failure nothing has been torn down; call [`Loader::release`].
    pub fn take_over<H>(&mut self, host: &mut H) -> Result<Resumed, TakeoverError>
    where
        H: Exec + ChipBus + Supervisor,
    {
        if self.phase != Phase::TakingOver {
            return Err(TakeoverError::NotLoaded(self.phase));
        }
        let resumed = takeover::take_over(host, &mut self.state)?;
        self.phase = Phase::Restoring;
        Ok(resumed)
    }

    /// Free every allocation, newest first. Returns how many there were.
    pub fn release<E: Exec + ?Sized>(&mut self, exec: &mut E) -> usize {
        self.state.allocations.release_all(exec)
    }
}

/// Inclusive end of `len` bytes at `addr`.
const fn last_byte(addr: u32, len: u32) -> u32 {
    addr + len.saturating_sub(1)
}

fn check_chipset<H: ChipBus + ?Sized>(host: &mut H, chip: &[u8]) {
    let Some(vposr) = chip_vposr(chip) else {
        warn!("CHIP chunk is too short to identify the chipset.");
        return;
    };
    let saved = ChipsetId::from_vposr(vposr);
    let live = ChipsetId::from_vposr(Custom::new(host).read(VPOSR));
    info!("Chipset: {saved} (0x{vposr:04X}).");
    if saved.generation() != live.generation() {
        warn!("{} statefile.", saved.generation());
    }
    if saved.ntsc != live.ntsc {
        warn!("{} statefile.", saved.standard());
    }
}

fn check_rom<H: ChipBus + ?Sized>(host: &mut H, rom: &[u8]) {
    let Some(saved) = RomInfo::parse(rom) else {
        warn!("ROM chunk is too short.");
        return;
    };
    let version = host.read_word(ROM_BASE + ROM_VERSION_OFFSET);
    let revision = host.read_word(ROM_BASE + ROM_REVISION_OFFSET);
    info!(
        "ROM {:08x}-{:08x} {}.{} (CRC={:08x}).",
        saved.start,
        saved.end(),
        saved.version,
        saved.revision,
        saved.crc
    );
    if (saved.version, saved.revision) != (version, revision) {
        info!("- '{}'", saved.path);
        warn!("KS ROM version mismatch.");
    }
}
