//! Chunk writer, used to build state files for tests and tooling.

use std::io::{self, Write};

use crate::{HEADER_LEN, Tag, pad_len, tags};

pub struct ChunkWriter<W> {
    inner: W,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Write a raw header with an arbitrary declared total length.
    pub fn header(&mut self, tag: Tag, total_len: u32, flags: u32) -> io::Result<()> {
        self.inner.write_all(tag.as_bytes())?;
        self.inner.write_all(&total_len.to_be_bytes())?;
        self.inner.write_all(&flags.to_be_bytes())
    }

    /// Write a complete chunk: header, payload and pad.
    pub fn chunk(&mut self, tag: Tag, flags: u32, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .ok()
            .and_then(|l| l.checked_add(HEADER_LEN))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "chunk too large"))?;
        self.header(tag, len, flags)?;
        self.inner.write_all(payload)?;
        let pad = [0u8; 4];
        self.inner
            .write_all(&pad[..pad_len(payload.len() as u32) as usize])
    }

    /// Write the terminating `END ` chunk.
    pub fn end(&mut self) -> io::Result<()> {
        self.header(tags::END, HEADER_LEN, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_payload_gets_four_pad_bytes() {
        let mut w = ChunkWriter::new(Vec::new());
        w.chunk(tags::CPU, 0, &[0xAA; 8]).expect("write");
        let out = w.into_inner();
        assert_eq!(out.len(), 12 + 8 + 4);
        assert_eq!(&out[4..8], &20u32.to_be_bytes());
    }

    #[test]
    fn end_chunk_has_no_payload() {
        let mut w = ChunkWriter::new(Vec::new());
        w.end().expect("write");
        assert_eq!(w.into_inner(), b"END \0\0\0\x0c\0\0\0\0".to_vec());
    }
}
