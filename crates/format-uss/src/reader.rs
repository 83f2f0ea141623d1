//! Streaming chunk reader.

use std::io::{self, Read, Seek, SeekFrom};

use crate::{ChunkClass, ChunkError, ChunkHeader, HEADER_LEN, MEMORY_PEEK_LEN};

/// What [`ChunkReader::read_chunk`] kept of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Register chunk: the whole payload.
    Full(Vec<u8>),
    /// Memory chunk: the first [`MEMORY_PEEK_LEN`] bytes at most.
    Prefix(Vec<u8>),
    /// Unsupported chunk, payload skipped.
    Unsupported,
    /// Unknown tag or empty payload, payload skipped.
    Skipped,
}

/// One chunk as seen by the validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// File offset of the chunk header.
    pub offset: u64,
    pub header: ChunkHeader,
    pub body: Body,
}

impl Chunk {
    /// Buffered bytes, if any were kept.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Full(d) | Body::Prefix(d) => Some(d),
            Body::Unsupported | Body::Skipped => None,
        }
    }
}

/// Chunk reader over any seekable byte stream.
///
/// Every method that consumes a payload leaves the stream at the next
/// chunk header, whether it buffered all, part or none of the payload.
pub struct ChunkReader<R> {
    inner: R,
}

impl<R: Read + Seek> ChunkReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn position(&mut self) -> Result<u64, ChunkError> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<(), ChunkError> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<(), ChunkError> {
        self.seek_to(0)
    }

    /// Consume a 12-byte header.
    ///
    /// Returns `Ok(None)` when fewer than 12 bytes remain: end of stream or
    /// a truncated file.
    pub fn read_chunk_head(&mut self) -> Result<Option<ChunkHeader>, ChunkError> {
        let mut raw = [0u8; HEADER_LEN as usize];
        if read_up_to(&mut self.inner, &mut raw)? < raw.len() {
            return Ok(None);
        }
        Ok(Some(ChunkHeader::from_bytes(raw)))
    }

    /// Seek past the payload and its pad.
    pub fn skip_payload(&mut self, header: &ChunkHeader) -> Result<(), ChunkError> {
        self.inner
            .seek(SeekFrom::Current(header.padded_len() as i64))?;
        Ok(())
    }

    /// Read the whole payload, then skip the pad.
    pub fn read_payload(&mut self, header: &ChunkHeader) -> Result<Vec<u8>, ChunkError> {
        self.read_prefix(header, header.len)
    }

    /// Read at most `cap` payload bytes, then skip the rest and the pad.
    pub fn read_prefix(&mut self, header: &ChunkHeader, cap: u32) -> Result<Vec<u8>, ChunkError> {
        let want = header.len.min(cap);
        let mut buf = vec![0u8; want as usize];
        let got = read_up_to(&mut self.inner, &mut buf)?;
        if got < buf.len() {
            return Err(ChunkError::ShortPayload {
                tag: header.tag,
                expected: want,
                got: got as u32,
            });
        }
        let rest = header.padded_len() - u64::from(want);
        self.inner.seek(SeekFrom::Current(rest as i64))?;
        Ok(buf)
    }

    /// Read up to `len` raw bytes from the current position.
    ///
    /// The returned buffer is shorter than `len` when the stream ends first;
    /// callers compare lengths to detect a short read.
    pub fn read_raw(&mut self, len: u32) -> Result<Vec<u8>, ChunkError> {
        let mut buf = vec![0u8; len as usize];
        let got = read_up_to(&mut self.inner, &mut buf)?;
        buf.truncate(got);
        Ok(buf)
    }

    /// Read the next header and classify its tag.
    ///
    /// Register chunks are buffered in full, memory chunks up to
    /// [`MEMORY_PEEK_LEN`] bytes; unsupported and unknown chunks, and any
    /// chunk with an empty payload, are skipped.
    pub fn read_chunk(&mut self) -> Result<Option<Chunk>, ChunkError> {
        let offset = self.position()?;
        let Some(header) = self.read_chunk_head()? else {
            return Ok(None);
        };
        let class = header.tag.class();
        let body = match class {
            ChunkClass::Unsupported => {
                self.skip_payload(&header)?;
                Body::Unsupported
            }
            _ if header.len == 0 => Body::Skipped,
            ChunkClass::Register => Body::Full(self.read_payload(&header)?),
            ChunkClass::Memory => Body::Prefix(self.read_prefix(&header, MEMORY_PEEK_LEN)?),
            ChunkClass::Unknown => {
                self.skip_payload(&header)?;
                Body::Skipped
            }
        };
        Ok(Some(Chunk {
            offset,
            header,
            body,
        }))
    }
}

fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
