use format_uss::{ChunkError, Tag};
use thiserror::Error;

use crate::Phase;

/// A condition that stops a pass outright.
///
/// Compatibility and resource problems are not errors in this sense: they
/// are counted in [`crate::RestoreState::errors`] and surface as
/// [`LoadError::PassFailed`] once the pass has finished scanning.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("not a UAE state file (first chunk '{0}')")]
    BadMagic(Tag),

    #[error("truncated chunk header at offset {0}")]
    TruncatedHeader(u64),

    #[error("pass #{pass} failed with {errors} errors")]
    PassFailed { pass: u8, errors: u32 },

    #[error("pass requested out of order (loader is {actual:?}, needs {expected:?})")]
    OutOfOrder { expected: Phase, actual: Phase },
}

/// The takeover could not be set up. Nothing has been torn down yet.
#[derive(Debug, Error)]
pub enum TakeoverError {
    #[error("both passes must succeed before takeover (loader is {0:?})")]
    NotLoaded(Phase),

    #[error("out of memory for temp stack ({0} bytes)")]
    Stack(u32),

    #[error("out of memory for temp state variables ({0} bytes)")]
    State(u32),

    #[error("out of memory for temp code ({0} bytes)")]
    Code(u32),

    #[error("no code segment: not started from a shell")]
    NoCodeSegment,

    #[error("entry offset {offset:#x} lies outside the {size}-byte code segment")]
    EntryOutOfRange { offset: u32, size: u32 },
}
