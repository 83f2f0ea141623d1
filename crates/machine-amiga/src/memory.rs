//! RAM regions and the per-region allocator.
//!
//! Each region stands for one entry in the Exec memory list: a physical
//! block with a header at its start and a free list of 8-byte aligned
//! chunks between `lower` and `upper`.

use stateload_core::{MemHeader, PoolId};

/// Allocation granule (`MEM_BLOCKSIZE`).
pub const BLOCK_SIZE: u32 = 8;

const fn round_up(n: u32) -> u32 {
    (n + BLOCK_SIZE - 1) & !(BLOCK_SIZE - 1)
}

#[derive(Clone)]
pub struct RamRegion {
    pub id: PoolId,
    pub base: u32,
    pub data: Vec<u8>,
    lower: u32,
    /// Free chunks as (address, size), sorted by address, never adjacent.
    free: Vec<(u32, u32)>,
}

impl RamRegion {
    /// A region of `size` bytes at `base`; the first `header` bytes hold
    /// the memory header and are never handed out.
    pub fn new(id: PoolId, base: u32, size: u32, header: u32) -> Self {
        let lower = base + round_up(header);
        let end = base + size;
        Self {
            id,
            base,
            data: vec![0; size as usize],
            lower,
            free: vec![(lower, end - lower)],
        }
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn end(&self) -> u32 {
        self.base + self.size()
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }

    pub fn header(&self) -> MemHeader {
        MemHeader {
            id: self.id,
            lower: self.lower,
            upper: self.end(),
        }
    }

    /// Total bytes on the free list.
    pub fn free_bytes(&self) -> u32 {
        self.free.iter().map(|&(_, s)| s).sum()
    }

    pub fn largest_free(&self) -> u32 {
        self.free.iter().map(|&(_, s)| s).max().unwrap_or(0)
    }

    /// First-fit allocation (`Allocate`).
    pub fn allocate(&mut self, size: u32) -> Option<u32> {
        if size == 0 {
            return None;
        }
        let size = round_up(size);
        let idx = self.free.iter().position(|&(_, s)| s >= size)?;
        let (addr, avail) = self.free[idx];
        if avail == size {
            self.free.remove(idx);
        } else {
            self.free[idx] = (addr + size, avail - size);
        }
        Some(addr)
    }

    /// Carve out `[addr, addr + size)` if it lies in one free chunk
    /// (`AllocAbs`). The start is rounded down to the block size.
    pub fn allocate_at(&mut self, addr: u32, size: u32) -> Option<u32> {
        if size == 0 {
            return None;
        }
        let start = addr & !(BLOCK_SIZE - 1);
        let span = u64::from(size) + u64::from(addr - start);
        let end = u64::from(start) + ((span + 7) & !7);
        let idx = self.free.iter().position(|&(a, s)| {
            start >= a && end <= u64::from(a) + u64::from(s)
        })?;
        let (chunk, avail) = self.free[idx];
        let chunk_end = chunk + avail;
        let end = end as u32;
        self.free.remove(idx);
        if end < chunk_end {
            self.free.insert(idx, (end, chunk_end - end));
        }
        if start > chunk {
            self.free.insert(idx, (chunk, start - chunk));
        }
        Some(start)
    }

    /// Return a block to the free list, merging with its neighbours.
    pub fn release(&mut self, addr: u32, size: u32) {
        let start = addr & !(BLOCK_SIZE - 1);
        let size = round_up(size + (addr - start));
        let idx = self.free.partition_point(|&(a, _)| a < start);
        self.free.insert(idx, (start, size));
        if idx + 1 < self.free.len() {
            let (a, s) = self.free[idx];
            let (next, next_size) = self.free[idx + 1];
            if a + s == next {
                self.free[idx].1 += next_size;
                self.free.remove(idx + 1);
            }
        }
        if idx > 0 {
            let (prev, prev_size) = self.free[idx - 1];
            let (a, s) = self.free[idx];
            if prev + prev_size == a {
                self.free[idx - 1].1 += s;
                self.free.remove(idx);
            }
        }
    }

    pub fn read_byte(&self, addr: u32) -> u8 {
        self.data[(addr - self.base) as usize]
    }

    pub fn write_byte(&mut self, addr: u32, val: u8) {
        self.data[(addr - self.base) as usize] = val;
    }

    /// Bytes of `len` starting at `addr` that fall inside this region.
    pub fn span(&self, addr: u32, len: usize) -> std::ops::Range<usize> {
        let start = (addr - self.base) as usize;
        let end = (start + len).min(self.data.len());
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> RamRegion {
        RamRegion::new(PoolId(0), 0x20_0000, 0x1_0000, 0x20)
    }

    #[test]
    fn header_excludes_reserved_start() {
        let r = region();
        let mh = r.header();
        assert_eq!(mh.lower, 0x20_0020);
        assert_eq!(mh.upper, 0x21_0000);
        assert_eq!(r.free_bytes(), 0x1_0000 - 0x20);
    }

    #[test]
    fn first_fit_rounds_to_block_size() {
        let mut r = region();
        assert_eq!(r.allocate(3), Some(0x20_0020));
        assert_eq!(r.allocate(8), Some(0x20_0028));
        assert_eq!(r.free_bytes(), 0x1_0000 - 0x20 - 16);
    }

    #[test]
    fn absolute_inside_free_chunk_splits_it() {
        let mut r = region();
        assert_eq!(r.allocate_at(0x20_8000, 0x100), Some(0x20_8000));
        assert_eq!(r.allocate_at(0x20_8080, 8), None);
        assert_eq!(r.allocate(0x8000), None, "no chunk that big before the hole");
        assert!(r.allocate(0x7000).is_some());
    }

    #[test]
    fn absolute_past_end_fails() {
        let mut r = region();
        assert_eq!(r.allocate_at(0x20_F000, 0x2000), None);
        assert_eq!(r.allocate_at(0x20_0000, 8), None, "header is not free");
    }

    #[test]
    fn release_coalesces() {
        let mut r = region();
        let a = r.allocate(0x100).expect("a");
        let b = r.allocate(0x100).expect("b");
        let c = r.allocate(0x100).expect("c");
        r.release(b, 0x100);
        r.release(a, 0x100);
        r.release(c, 0x100);
        assert_eq!(r.largest_free(), 0x1_0000 - 0x20);
    }

    #[test]
    fn zero_sized_requests_fail() {
        let mut r = region();
        assert_eq!(r.allocate(0), None);
        assert_eq!(r.allocate_at(0x20_1000, 0), None);
    }
}
