//! The point of no return.
//!
//! Moves everything the replay needs out of process memory into scratch
//! allocations (a stack, the state image, a copy of the loader's code),
//! waits for the operator, blanks the display and hands the machine over.

use stateload_core::{ChipBus, Exec, Handoff, Resumed, Supervisor};
use tracing::{debug, info};

use crate::banks::allocate;
use crate::error::TakeoverError;
use crate::image::{IMAGE_LEN, StateImage};
use crate::replay::replay_entry;
use crate::state::RestoreState;

/// Supervisor stack used by the trampoline and the replay.
pub const TEMP_STACK_SIZE: u32 = 0x2000;
/// Ticks to wait before reading the key, so its release is seen by the
/// system and not by the restored program.
pub const KEY_RELEASE_TICKS: u32 = 100;
/// `LoadView`/`WaitTOF` need graphics.library V37.
const GFX_LOADVIEW_VERSION: u16 = 37;

/// Relocated addresses inside the code copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocated {
    pub code: u32,
    pub trampoline: u32,
    pub inflate: u32,
    pub replay: u32,
}

/// Set up the relocated stack, state and code, then hand over.
///
/// Every allocation lands in `state.allocations`; on error the caller
/// releases them. On real hardware a successful call never returns.
pub fn take_over<H>(host: &mut H, state: &mut RestoreState) -> Result<Resumed, TakeoverError>
where
    H: Exec + ChipBus + Supervisor,
{
    let stack =
        allocate(host, state, TEMP_STACK_SIZE).ok_or(TakeoverError::Stack(TEMP_STACK_SIZE))?;
    let state_addr = allocate(host, state, IMAGE_LEN).ok_or(TakeoverError::State(IMAGE_LEN))?;

    let code = host.code_segment().ok_or(TakeoverError::NoCodeSegment)?;
    let entries = code.entries;
    for offset in [entries.trampoline, entries.inflate, entries.replay] {
        if offset >= code.size {
            return Err(TakeoverError::EntryOutOfRange {
                offset,
                size: code.size,
            });
        }
    }
    let copy = allocate(host, state, code.size).ok_or(TakeoverError::Code(code.size))?;
    let mut text = vec![0u8; code.size as usize];
    host.read_block(code.base, &mut text);
    host.write_block(copy, &text);
    let relocated = Relocated {
        code: copy,
        trampoline: copy + entries.trampoline,
        inflate: copy + entries.inflate,
        replay: copy + entries.replay,
    };
    debug!(
        "code {:08x} -> {:08x}: trampoline {:08x}, inflate {:08x}, replay {:08x}",
        code.base, copy, relocated.trampoline, relocated.inflate, relocated.replay
    );

    // The image is written last so it records every staged address.
    let image = StateImage::capture(state);
    host.write_block(state_addr, &image.encode());

    info!("Code={copy:08x} Stack={stack:08x} Data={state_addr:08x}. Press RETURN!");
    host.delay(KEY_RELEASE_TICKS);
    let _ = host.wait_key();

    if host.graphics_version() >= GFX_LOADVIEW_VERSION {
        host.load_view_null();
        host.wait_tof();
        host.wait_tof();
    }

    Ok(host.kill_system(Handoff {
        stack_top: stack + TEMP_STACK_SIZE,
        state: state_addr,
        trampoline: relocated.trampoline,
        inflate_addr: relocated.inflate,
        replay_addr: relocated.replay,
        replay: replay_entry,
    }))
}
