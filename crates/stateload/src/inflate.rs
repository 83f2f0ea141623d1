//! Bank materialisation over the bus: streaming inflate and block copy.
//!
//! Runs after the hand-off, so everything lives on the stack: a 32K
//! wrapping window for the decompressor and small transfer buffers.

use miniz_oxide::inflate::TINFLStatus;
use miniz_oxide::inflate::core::inflate_flags::{
    TINFL_FLAG_HAS_MORE_INPUT, TINFL_FLAG_PARSE_ZLIB_HEADER,
};
use miniz_oxide::inflate::core::{DecompressorOxide, decompress};
use stateload_core::ChipBus;
use thiserror::Error;

/// Decompressor window; must be a power of two of at least 32K.
const WINDOW: usize = 32 * 1024;
const BLOCK: usize = 4096;

#[derive(Debug, Error)]
pub enum InflateError {
    #[error("compressed stream ends early")]
    Truncated,

    #[error("corrupt compressed stream ({0:?})")]
    Corrupt(TINFLStatus),
}

/// Inflate the zlib stream of `src_len` bytes at `src` into memory at
/// `dst`, writing at most `limit` bytes. Returns the bytes written.
pub fn inflate(
    bus: &mut dyn ChipBus,
    src: u32,
    src_len: u32,
    dst: u32,
    limit: u32,
) -> Result<u32, InflateError> {
    let mut state = DecompressorOxide::new();
    let mut window = [0u8; WINDOW];
    let mut input = [0u8; BLOCK];
    let (mut in_pos, mut in_len) = (0usize, 0usize);
    let mut fetched = 0u32;
    let mut out_pos = 0usize;
    let mut written = 0u32;

    loop {
        if in_pos == in_len && fetched < src_len {
            let n = (src_len - fetched).min(BLOCK as u32) as usize;
            bus.read_block(src + fetched, &mut input[..n]);
            fetched += n as u32;
            in_pos = 0;
            in_len = n;
        }
        let mut flags = TINFL_FLAG_PARSE_ZLIB_HEADER;
        if fetched < src_len {
            flags |= TINFL_FLAG_HAS_MORE_INPUT;
        }
        let (status, consumed, produced) =
            decompress(&mut state, &input[in_pos..in_len], &mut window, out_pos, flags);
        in_pos += consumed;

        let keep = produced.min((limit - written) as usize);
        if keep > 0 {
            bus.write_block(dst + written, &window[out_pos..out_pos + keep]);
            written += keep as u32;
        }
        out_pos = (out_pos + produced) & (WINDOW - 1);

        match status {
            TINFLStatus::Done => return Ok(written),
            TINFLStatus::HasMoreOutput => {}
            TINFLStatus::NeedsMoreInput if fetched < src_len => {}
            TINFLStatus::NeedsMoreInput | TINFLStatus::FailedCannotMakeProgress => {
                return Err(InflateError::Truncated);
            }
            other => return Err(InflateError::Corrupt(other)),
        }
    }
}

/// Copy `len` bytes from `src` to `dst` in blocks.
pub fn copy(bus: &mut dyn ChipBus, src: u32, dst: u32, len: u32) {
    let mut buf = [0u8; BLOCK];
    let mut done = 0u32;
    while done < len {
        let n = (len - done).min(BLOCK as u32) as usize;
        bus.read_block(src + done, &mut buf[..n]);
        bus.write_block(dst + done, &buf[..n]);
        done += n as u32;
    }
}

#[cfg(test)]
mod tests {
    use miniz_oxide::deflate::compress_to_vec_zlib;

    use super::*;

    struct Ram(Vec<u8>);

    impl ChipBus for Ram {
        fn read_byte(&mut self, addr: u32) -> u8 {
            self.0[addr as usize]
        }
        fn write_byte(&mut self, addr: u32, value: u8) {
            self.0[addr as usize] = value;
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 7) ^ (i >> 9)) as u8).collect()
    }

    #[test]
    fn inflates_across_window_wraps() {
        let image = pattern(100_000);
        let packed = compress_to_vec_zlib(&image, 6);
        let mut ram = Ram(vec![0; 0x4_0000]);
        ram.write_block(0x3_0000, &packed);
        let n = inflate(&mut ram, 0x3_0000, packed.len() as u32, 0, 100_000).expect("inflate");
        assert_eq!(n, 100_000);
        assert_eq!(&ram.0[..100_000], &image[..]);
    }

    #[test]
    fn output_is_capped_at_limit() {
        let image = vec![0x55u8; 5000];
        let packed = compress_to_vec_zlib(&image, 6);
        let mut ram = Ram(vec![0; 0x8000]);
        ram.write_block(0x6000, &packed);
        let n = inflate(&mut ram, 0x6000, packed.len() as u32, 0, 1000).expect("inflate");
        assert_eq!(n, 1000);
        assert_eq!(ram.0[999], 0x55);
        assert_eq!(ram.0[1000], 0);
    }

    #[test]
    fn truncated_stream_is_reported() {
        let packed = compress_to_vec_zlib(&pattern(50_000), 6);
        let mut ram = Ram(vec![0; 0x2_0000]);
        ram.write_block(0x1_0000, &packed);
        let half = packed.len() as u32 / 2;
        assert!(inflate(&mut ram, 0x1_0000, half, 0, 50_000).is_err());
    }

    #[test]
    fn block_copy() {
        let mut ram = Ram(vec![0; 0x4000]);
        let data = pattern(0x1800);
        ram.write_block(0x2000, &data);
        copy(&mut ram, 0x2000, 0x100, 0x1800);
        assert_eq!(&ram.0[0x100..0x1900], &data[..]);
    }
}
