//! Operating system memory services.

use std::ops::Deref;

/// Identity of one entry in the system memory list (a `MemHeader`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub u32);

/// Snapshot of one memory list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemHeader {
    pub id: PoolId,
    /// First byte managed by the header.
    pub lower: u32,
    /// One past the last byte managed by the header.
    pub upper: u32,
}

impl MemHeader {
    /// Start of the region, rounded down to 64K.
    ///
    /// Headers sit at the start of the memory they manage, so `lower` is a
    /// few bytes above the physical base.
    #[must_use]
    pub fn start(&self) -> u32 {
        self.lower & 0xFFFF_0000
    }

    /// Physical size, with `upper` rounded up to 64K.
    #[must_use]
    pub fn size(&self) -> u32 {
        let end = (u64::from(self.upper) + 0xFFFF) & !0xFFFF_u64;
        (end - u64::from(self.start())) as u32
    }
}

/// Memory list and allocator of the running operating system.
///
/// Mirrors the `exec.library` calls the loader needs: the memory list,
/// `Forbid`/`Permit`, `Allocate`/`Deallocate` on a specific header and
/// `AllocAbs`/`FreeMem` for absolute placement.
pub trait Exec {
    /// Stop task switching until [`Exec::permit`].
    fn forbid(&mut self);

    /// Re-enable task switching.
    fn permit(&mut self);

    /// Walk the memory list. Only stable while task switching is forbidden;
    /// use [`forbid`] rather than calling this directly.
    fn mem_headers(&self) -> Vec<MemHeader>;

    /// Allocate from one header's free list (`Allocate`).
    fn allocate(&mut self, pool: PoolId, size: u32) -> Option<u32>;

    /// Return memory obtained from [`Exec::allocate`] (`Deallocate`).
    fn deallocate(&mut self, pool: PoolId, addr: u32, size: u32);

    /// Allocate exactly at `addr` (`AllocAbs`).
    fn alloc_abs(&mut self, size: u32, addr: u32) -> Option<u32>;

    /// Return memory obtained from [`Exec::alloc_abs`] (`FreeMem`).
    fn free_mem(&mut self, addr: u32, size: u32);

    /// `ExecBase->AttnFlags`.
    fn attn_flags(&self) -> u16;
}

/// Task switching is forbidden while this is alive.
///
/// The memory list may only be walked through the guard; dropping it
/// permits again, so the critical section ends at the closing brace of the
/// scan even on early return.
pub struct Forbidden<'a, E: Exec + ?Sized> {
    exec: &'a mut E,
}

/// Forbid task switching for the lifetime of the returned guard.
pub fn forbid<E: Exec + ?Sized>(exec: &mut E) -> Forbidden<'_, E> {
    exec.forbid();
    Forbidden { exec }
}

impl<E: Exec + ?Sized> Forbidden<'_, E> {
    /// The memory list as it stands inside the critical section.
    #[must_use]
    pub fn mem_headers(&self) -> Vec<MemHeader> {
        self.exec.mem_headers()
    }
}

impl<E: Exec + ?Sized> Deref for Forbidden<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.exec
    }
}

impl<E: Exec + ?Sized> Drop for Forbidden<'_, E> {
    fn drop(&mut self) {
        self.exec.permit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bounds_round_to_64k() {
        let mh = MemHeader {
            id: PoolId(0),
            lower: 0x0020_0020,
            upper: 0x0027_FFF8,
        };
        assert_eq!(mh.start(), 0x0020_0000);
        assert_eq!(mh.size(), 0x8_0000);
    }

    #[test]
    fn header_at_top_of_address_space() {
        let mh = MemHeader {
            id: PoolId(0),
            lower: 0x0800_0020,
            upper: 0xFFFF_FFF0,
        };
        assert_eq!(mh.size(), 0xF800_0000);
    }

    struct Counting {
        depth: i32,
        max_depth: i32,
    }

    impl Exec for Counting {
        fn forbid(&mut self) {
            self.depth += 1;
            self.max_depth = self.max_depth.max(self.depth);
        }
        fn permit(&mut self) {
            self.depth -= 1;
        }
        fn mem_headers(&self) -> Vec<MemHeader> {
            assert!(self.depth > 0, "memory list walked without Forbid");
            Vec::new()
        }
        fn allocate(&mut self, _: PoolId, _: u32) -> Option<u32> {
            None
        }
        fn deallocate(&mut self, _: PoolId, _: u32, _: u32) {}
        fn alloc_abs(&mut self, _: u32, _: u32) -> Option<u32> {
            None
        }
        fn free_mem(&mut self, _: u32, _: u32) {}
        fn attn_flags(&self) -> u16 {
            0
        }
    }

    #[test]
    fn guard_permits_on_drop() {
        let mut exec = Counting {
            depth: 0,
            max_depth: 0,
        };
        {
            let guard = forbid(&mut exec);
            assert!(guard.mem_headers().is_empty());
        }
        assert_eq!(exec.depth, 0);
        assert_eq!(exec.max_depth, 1);
    }
}
