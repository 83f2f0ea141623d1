use std::io;

use thiserror::Error;

use crate::Tag;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("chunk '{tag}': payload truncated ({got} of {expected} bytes)")]
    ShortPayload { tag: Tag, expected: u32, got: u32 },
}
