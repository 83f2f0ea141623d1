//! Live memory discovery, scratch placement and allocation bookkeeping.
//!
//! Every block the loader obtains from the operating system is recorded in
//! [`Allocations`] so a failed run can hand all of it back, newest first.

use format_uss::{Chunk, be_u32};
use stateload_core::map::{MIN_SCRATCH_SIZE, PREFERRED_SCRATCH_BASE};
use stateload_core::{Exec, PoolId, forbid};
use tracing::{debug, error, info};

use crate::state::{BankKind, MemoryBank, RestoreState};

/// Step between absolute placement attempts inside the scratch region.
pub const SCRATCH_STEP: u32 = 8;
/// Step between placement attempts inside another bank's leftover.
pub const BANK_STEP: u32 = 0x1_0000;

const fn round_up(n: u64) -> u64 {
    (n + 7) & !7
}

/// Where an allocation came from, which decides how it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// `Allocate` on a specific memory header.
    Pool(PoolId),
    /// `AllocAbs` at a fixed address.
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub source: Source,
    pub addr: u32,
    pub size: u32,
}

/// Every live allocation, oldest first.
#[derive(Debug, Default)]
pub struct Allocations(Vec<Allocation>);

impl Allocations {
    pub fn push(&mut self, allocation: Allocation) {
        self.0.push(allocation);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.0.iter()
    }

    /// Give everything back, most recent first. Returns the number of
    /// blocks released.
    pub fn release_all<E: Exec + ?Sized>(&mut self, exec: &mut E) -> usize {
        let mut released = 0;
        while let Some(a) = self.0.pop() {
            match a.source {
                Source::Pool(pool) => exec.deallocate(pool, a.addr, a.size),
                Source::Absolute => exec.free_mem(a.addr, a.size),
            }
            debug!("released {} bytes at {:08x}", a.size, a.addr);
            released += 1;
        }
        released
    }
}

/// The region staging buffers, the stack and the code copy come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratch {
    pub base: u32,
    pub size: u32,
    /// Set when the region is a whole unclaimed memory header that can be
    /// allocated from directly.
    pub pool: Option<PoolId>,
    /// Next address for an absolute placement attempt.
    pub cursor: u32,
}

impl Scratch {
    #[must_use]
    pub fn new(base: u32, size: u32, pool: Option<PoolId>) -> Self {
        let aligned = round_up(u64::from(base)) as u32;
        Self {
            base: aligned,
            size: size.saturating_sub(aligned - base),
            pool,
            cursor: aligned,
        }
    }

    fn end(&self) -> u64 {
        u64::from(self.base) + u64::from(self.size)
    }

    /// Walk the cursor forward until an absolute placement of `size`
    /// succeeds or the region runs out.
    fn place<E: Exec + ?Sized>(&mut self, exec: &mut E, size: u32) -> Option<u32> {
        while u64::from(self.cursor) + u64::from(size) <= self.end() {
            if let Some(addr) = exec.alloc_abs(size, self.cursor) {
                self.cursor = (u64::from(addr) + round_up(u64::from(size))) as u32;
                return Some(addr);
            }
            self.cursor += SCRATCH_STEP;
        }
        None
    }

    /// Prefer `candidate` over `self`: bigger wins, ties go to the
    /// preferred address range.
    fn beaten_by(&self, candidate: &Self) -> bool {
        candidate.size > self.size
            || (candidate.size == self.size
                && candidate.base >= PREFERRED_SCRATCH_BASE
                && self.base < PREFERRED_SCRATCH_BASE)
    }
}

/// Match the bank image described by `chunk` against the live memory list.
///
/// Returns true when a region starts exactly at the bank's base and is big
/// enough; otherwise the error counter is bumped. The bank is recorded
/// either way once a region is found, so its region is never picked as
/// scratch.
pub fn probe_bank<E: Exec + ?Sized>(
    exec: &mut E,
    state: &mut RestoreState,
    kind: BankKind,
    chunk: &Chunk,
) -> bool {
    let prefix = chunk.data().unwrap_or_default();
    let required = if chunk.header.compressed() {
        be_u32(prefix, 0)
    } else {
        chunk.header.len.checked_sub(4)
    };
    let Some(required) = required else {
        error!("Memory chunk '{}' is too short.", kind.tag());
        state.errors += 1;
        return false;
    };
    let base = kind.base();
    info!("Statefile RAM: Address {base:08x}, size {}k.", required >> 10);

    let found = {
        let guard = forbid(exec);
        guard
            .mem_headers()
            .into_iter()
            .find(|h| h.start() == base)
    };
    let Some(header) = found else {
        error!("Not found in this system.");
        state.errors += 1;
        return false;
    };

    let capacity = header.size();
    state.claimed[kind.index()] = Some(header.id);
    *state.bank_mut(kind) = MemoryBank {
        offset: chunk.offset,
        payload_len: chunk.header.len,
        flags: chunk.header.flags,
        required,
        capacity,
        staged: None,
    };
    info!("- Detected memory at {base:08x}, total size {}k.", capacity >> 10);
    if capacity < required {
        error!("Not enough memory available ({}k required).", required >> 10);
        state.errors += 1;
        return false;
    }
    info!(
        "- Is usable ({}k required, {}k unused, offset {}).",
        required >> 10,
        (capacity - required) >> 10,
        chunk.offset
    );
    true
}

/// Pick the scratch region: the largest unclaimed memory header, or the
/// largest leftover above a bank image, whichever is bigger.
///
/// Returns `None` when nothing reaches [`MIN_SCRATCH_SIZE`].
pub fn find_scratch_region<E: Exec + ?Sized>(exec: &mut E, state: &RestoreState) -> Option<Scratch> {
    let headers = {
        let guard = forbid(exec);
        guard.mem_headers()
    };
    let unclaimed = headers
        .iter()
        .filter(|h| !state.claimed.contains(&Some(h.id)))
        .map(|h| Scratch::new(h.start(), h.size(), Some(h.id)));
    let leftovers = BankKind::ALL.into_iter().filter_map(|kind| {
        let bank = state.bank(kind);
        state.claimed[kind.index()]?;
        (bank.leftover() > 0)
            .then(|| Scratch::new(kind.base() + bank.required, bank.leftover(), None))
    });

    let mut best: Option<Scratch> = None;
    for candidate in unclaimed.chain(leftovers) {
        debug!(
            "scratch candidate {:08x}, {}k",
            candidate.base,
            candidate.size >> 10
        );
        if best.is_none_or(|b| b.beaten_by(&candidate)) {
            best = Some(candidate);
        }
    }
    best.filter(|s| s.size >= MIN_SCRATCH_SIZE)
}

/// Allocate `size` bytes of scratch memory.
///
/// Tries the scratch pool first, then absolute placement from the scratch
/// cursor. `None` once both are exhausted, or before a scratch region was
/// chosen.
pub fn allocate<E: Exec + ?Sized>(exec: &mut E, state: &mut RestoreState, size: u32) -> Option<u32> {
    let scratch = state.scratch.as_mut()?;
    if let Some(pool) = scratch.pool {
        if let Some(addr) = exec.allocate(pool, size) {
            state.allocations.push(Allocation {
                source: Source::Pool(pool),
                addr,
                size,
            });
            debug!("allocated {size} bytes at {addr:08x} from pool");
            return Some(addr);
        }
    }
    let addr = scratch.place(exec, size)?;
    state.allocations.push(Allocation {
        source: Source::Absolute,
        addr,
        size,
    });
    debug!("allocated {size} bytes at {addr:08x} (absolute)");
    Some(addr)
}

/// Allocate `size` bytes inside `kind`'s live region, above its base in
/// [`BANK_STEP`] increments.
///
/// Used to stage one bank's image where another bank's image will be
/// restored later. Fails when `kind` was never matched against a live
/// region or the region is exhausted.
pub fn allocate_within_bank<E: Exec + ?Sized>(
    exec: &mut E,
    state: &mut RestoreState,
    size: u32,
    kind: BankKind,
) -> Option<u32> {
    let capacity = u64::from(state.bank(kind).capacity);
    if capacity == 0 {
        return None;
    }
    let base = kind.base();
    let mut offset = u64::from(BANK_STEP);
    while offset + u64::from(size) < capacity {
        if let Some(addr) = exec.alloc_abs(size, base + offset as u32) {
            state.allocations.push(Allocation {
                source: Source::Absolute,
                addr,
                size,
            });
            debug!("allocated {size} bytes at {addr:08x} in {} bank", kind.tag());
            return Some(addr);
        }
        offset += u64::from(BANK_STEP);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        ops: Vec<String>,
    }

    impl Exec for Log {
        fn forbid(&mut self) {}
        fn permit(&mut self) {}
        fn mem_headers(&self) -> Vec<stateload_core::MemHeader> {
            Vec::new()
        }
        fn allocate(&mut self, _: PoolId, _: u32) -> Option<u32> {
            None
        }
        fn deallocate(&mut self, pool: PoolId, addr: u32, _: u32) {
            self.ops.push(format!("dealloc {} {addr:x}", pool.0));
        }
        fn alloc_abs(&mut self, _: u32, addr: u32) -> Option<u32> {
            (addr % 0x40 == 0x20).then_some(addr)
        }
        fn free_mem(&mut self, addr: u32, _: u32) {
            self.ops.push(format!("free {addr:x}"));
        }
        fn attn_flags(&self) -> u16 {
            0
        }
    }

    #[test]
    fn release_runs_newest_first() {
        let mut list = Allocations::default();
        list.push(Allocation {
            source: Source::Pool(PoolId(1)),
            addr: 0x100,
            size: 8,
        });
        list.push(Allocation {
            source: Source::Absolute,
            addr: 0x200,
            size: 8,
        });
        let mut exec = Log::default();
        assert_eq!(list.release_all(&mut exec), 2);
        assert_eq!(exec.ops, vec!["free 200", "dealloc 1 100"]);
        assert!(list.is_empty());
        assert_eq!(list.release_all(&mut exec), 0);
    }

    #[test]
    fn absolute_scan_steps_past_refusals() {
        let mut state = RestoreState::new();
        state.scratch = Some(Scratch::new(0x1000, 0x100, None));
        let mut exec = Log::default();
        assert_eq!(allocate(&mut exec, &mut state, 16), Some(0x1020));
        assert_eq!(allocate(&mut exec, &mut state, 16), Some(0x1060));
        assert_eq!(state.allocations.len(), 2);
    }

    #[test]
    fn absolute_scan_gives_up_at_region_end() {
        let mut state = RestoreState::new();
        state.scratch = Some(Scratch::new(0x1000, 0x40, None));
        let mut exec = Log::default();
        assert_eq!(allocate(&mut exec, &mut state, 0x30), None);
        assert!(state.allocations.is_empty());
    }

    #[test]
    fn nothing_to_allocate_from_without_scratch() {
        let mut state = RestoreState::new();
        assert_eq!(allocate(&mut Log::default(), &mut state, 8), None);
    }

    #[test]
    fn unaligned_scratch_base_rounds_up() {
        let s = Scratch::new(0x1003, 0x100, None);
        assert_eq!(s.base, 0x1008);
        assert_eq!(s.size, 0xFB);
    }

    #[test]
    fn ties_prefer_the_high_region() {
        let low = Scratch::new(0x0008_0000, 0x8_0000, None);
        let high = Scratch::new(0x0020_0000, 0x8_0000, None);
        assert!(low.beaten_by(&high));
        assert!(!high.beaten_by(&low));
        let bigger = Scratch::new(0x0001_0000, 0x10_0000, None);
        assert!(high.beaten_by(&bigger));
    }

    #[test]
    fn bank_staging_needs_a_probed_bank() {
        let mut state = RestoreState::new();
        assert_eq!(
            allocate_within_bank(&mut Log::default(), &mut state, 8, BankKind::Slow),
            None
        );
    }
}
