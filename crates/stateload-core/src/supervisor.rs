//! Process-level services for the takeover sequence.

use crate::{ChipBus, CpuContext};

/// Entry points inside the loader's own code, as offsets from the start of
/// its code segment.
///
/// The offsets are fixed when the loader is linked, so relocating the code
/// to a new base is plain addition; nothing in the copied image needs
/// patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOffsets {
    /// Low-level trampoline that masks interrupts and switches stacks.
    pub trampoline: u32,
    /// Inflate routine used to materialise compressed RAM banks.
    pub inflate: u32,
    /// Register replay entry.
    pub replay: u32,
}

/// The running loader's code segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSegment {
    pub base: u32,
    pub size: u32,
    pub entries: EntryOffsets,
}

/// Register replay routine carried across the hand-off.
pub type ReplayFn<S> = fn(&S, &mut dyn ChipBus) -> CpuContext;

/// Everything the trampoline needs once the system is gone.
pub struct Handoff<S> {
    /// Top of the relocated supervisor stack.
    pub stack_top: u32,
    /// Handle on the relocated state, passed to `replay`.
    pub state: S,
    /// Relocated trampoline address.
    pub trampoline: u32,
    /// Relocated inflate routine, called by the replay for compressed
    /// banks.
    pub inflate_addr: u32,
    /// Relocated address of the replay routine.
    pub replay_addr: u32,
    pub replay: ReplayFn<S>,
}

/// What a simulated host reports after running the hand-off.
///
/// Real hardware never produces one: control continues inside the
/// restored machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resumed {
    pub context: CpuContext,
    pub stack_top: u32,
    pub inflate_addr: u32,
    pub replay_addr: u32,
}

/// Process and display services of the host operating system.
pub trait Supervisor {
    /// The loader's own code segment, or `None` when it cannot be found
    /// (not started from a shell).
    fn code_segment(&self) -> Option<CodeSegment>;

    /// Sleep for `ticks` fiftieths of a second.
    fn delay(&mut self, ticks: u32);

    /// Block until the operator sends one byte on standard input.
    fn wait_key(&mut self) -> Option<u8>;

    /// `graphics.library` version; display shutdown needs V37 or later.
    fn graphics_version(&self) -> u16;

    /// `LoadView(NULL)`: stop displaying the current view.
    fn load_view_null(&mut self);

    /// `WaitTOF()`: block until the next vertical blank.
    fn wait_tof(&mut self);

    /// Tear down the operating system and jump to the relocated
    /// trampoline with interrupts disabled.
    ///
    /// On real hardware this never returns. Simulated hosts run the replay
    /// routine against their own bus and report the resumed context.
    fn kill_system<S>(&mut self, handoff: Handoff<S>) -> Resumed;
}
