//! Platform constants and hardware seams for restoring a UAE state file on
//! a real Amiga.
//!
//! Everything the loader touches on the live machine goes through one of
//! three narrow interfaces:
//! - [`ChipBus`]: byte/word access to custom chip registers, the two CIAs,
//!   the Kickstart ROM and RAM, all at their fixed absolute addresses.
//! - [`Exec`]: the operating system's memory list and allocator.
//! - [`Supervisor`]: the process-level services used during takeover,
//!   ending in the non-returning hand-off.
//!
//! Tests and dry runs implement all three on a simulated machine.

mod bus;
mod cpu;
mod exec;
pub mod map;
mod supervisor;

pub use bus::{ChipBus, Cia, CiaId, Custom};
pub use cpu::{CpuContext, CpuModel};
pub use exec::{Exec, Forbidden, MemHeader, PoolId, forbid};
pub use supervisor::{CodeSegment, EntryOffsets, Handoff, ReplayFn, Resumed, Supervisor};
