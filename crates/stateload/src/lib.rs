//! Restore a UAE state file onto a live Amiga.
//!
//! The loader works in four phases:
//!
//! 1. **Validate** ([`Loader::validate`]): read every chunk, match RAM
//!    images against the live memory list, compare CPU, chipset and ROM,
//!    and choose a scratch region. Problems are counted, not returned, so
//!    one run reports all of them.
//! 2. **Load** ([`Loader::load`]): stage RAM images and register chunks in
//!    scratch memory.
//! 3. **Take over** ([`Loader::take_over`]): copy the loader's code, a
//!    stack and the state image into scratch memory, blank the display and
//!    hand the machine to the relocated trampoline.
//! 4. **Replay** ([`replay`]): with the system gone, write RAM and every
//!    chip register back in a fixed order, then resume the saved CPU
//!    context.
//!
//! The live machine is reached only through the seams in
//! [`stateload_core`], so the whole sequence runs unchanged against the
//! simulated machine in `machine-amiga`.

mod banks;
mod chunks;
mod error;
mod image;
mod inflate;
mod passes;
mod replay;
mod state;
mod takeover;

use std::io::{Read, Seek};

use stateload_core::{ChipBus, Exec, Resumed, Supervisor};
use tracing::{error, info};

pub use banks::{
    Allocation, Allocations, BANK_STEP, SCRATCH_STEP, Scratch, Source, allocate,
    allocate_within_bank, find_scratch_region, probe_bank,
};
pub use chunks::{ChipsetId, FloppyInfo, RomInfo};
pub use error::{LoadError, TakeoverError};
pub use image::{BankImage, IMAGE_LEN, StateImage};
pub use inflate::InflateError;
pub use passes::{Loader, Phase};
pub use replay::{MAX_SEEK_PULSES, materialize, replay, replay_entry};
pub use state::{BankKind, MemoryBank, RestoreState, SLOT_COUNT, Slot, Staged};
pub use takeover::{KEY_RELEASE_TICKS, Relocated, TEMP_STACK_SIZE, take_over};

/// Run both passes and the takeover over `snapshot`.
///
/// Diagnostics go out as tracing events. On any failure every allocation
/// is released again and `None` is returned; the machine is as it was.
/// `Some` only comes back from a simulated host, after the replay ran.
pub fn run<R, H>(snapshot: R, host: &mut H) -> Option<Resumed>
where
    R: Read + Seek,
    H: Exec + ChipBus + Supervisor,
{
    let mut loader = Loader::new(snapshot);
    for pass in [1u8, 2] {
        let result = if pass == 1 {
            loader.validate(host)
        } else {
            loader.load(host)
        };
        if let Err(e) = result {
            if !matches!(e, LoadError::PassFailed { .. }) {
                error!("{e}");
            }
            info!("Pass #{pass} failed ({} errors).", loader.errors());
            loader.release(host);
            return None;
        }
    }
    match loader.take_over(host) {
        Ok(resumed) => Some(resumed),
        Err(e) => {
            error!("{e}");
            loader.release(host);
            None
        }
    }
}
