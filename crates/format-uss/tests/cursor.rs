//! Stream cursor properties: every way of consuming a chunk lands on the
//! next header.

use std::io::Cursor;

use format_uss::{ChunkReader, ChunkWriter, MEMORY_TAGS, REGISTER_TAGS, Tag, tags};
use proptest::prelude::*;

fn tag_strategy() -> impl Strategy<Value = Tag> {
    prop_oneof![
        prop::sample::select(REGISTER_TAGS.to_vec()).prop_filter("not END", |t| *t != tags::END),
        prop::sample::select(MEMORY_TAGS.to_vec()),
        Just(Tag::new(b"FSYS")),
        Just(Tag::new(b"XYZW")),
    ]
}

fn build(chunks: &[(Tag, Vec<u8>)]) -> (Vec<u8>, Vec<u64>) {
    let mut w = ChunkWriter::new(Vec::new());
    let mut offsets = Vec::new();
    let mut pos = 0u64;
    for (tag, payload) in chunks {
        offsets.push(pos);
        w.chunk(*tag, 0, payload).expect("write");
        pos += 12 + format_uss::padded_len(payload.len() as u32);
    }
    offsets.push(pos);
    w.end().expect("write");
    (w.into_inner(), offsets)
}

proptest! {
    #[test]
    fn head_then_skip_reaches_next_header(
        chunks in prop::collection::vec((tag_strategy(), prop::collection::vec(any::<u8>(), 0..40)), 0..12)
    ) {
        let (bytes, offsets) = build(&chunks);
        let mut r = ChunkReader::new(Cursor::new(bytes));
        for (i, (tag, payload)) in chunks.iter().enumerate() {
            prop_assert_eq!(r.position().expect("pos"), offsets[i]);
            let h = r.read_chunk_head().expect("read").expect("header");
            prop_assert_eq!(h.tag, *tag);
            prop_assert_eq!(h.len as usize, payload.len());
            r.skip_payload(&h).expect("skip");
        }
        prop_assert_eq!(r.position().expect("pos"), offsets[chunks.len()]);
        let end = r.read_chunk_head().expect("read").expect("header");
        prop_assert_eq!(end.tag, tags::END);
    }

    #[test]
    fn read_chunk_and_skip_agree(
        chunks in prop::collection::vec((tag_strategy(), prop::collection::vec(any::<u8>(), 0..40)), 1..12)
    ) {
        let (bytes, offsets) = build(&chunks);
        let mut r = ChunkReader::new(Cursor::new(bytes));
        for (i, _) in chunks.iter().enumerate() {
            let c = r.read_chunk().expect("read").expect("chunk");
            prop_assert_eq!(c.offset, offsets[i]);
            prop_assert_eq!(r.position().expect("pos"), offsets[i + 1]);
        }
    }
}

#[test]
fn every_small_length_realigns() {
    for len in 0..=33u32 {
        let payload = vec![0x5Au8; len as usize];
        let mut w = ChunkWriter::new(Vec::new());
        w.chunk(Tag::new(b"XYZW"), 0, &payload).expect("write");
        w.end().expect("write");
        let mut r = ChunkReader::new(Cursor::new(w.into_inner()));
        let h = r.read_chunk_head().expect("read").expect("header");
        r.skip_payload(&h).expect("skip");
        let next = r.read_chunk_head().expect("read").expect("header");
        assert_eq!(next.tag, tags::END, "payload length {len}");
    }
}

#[test]
fn marker_chunk_has_no_payload_and_no_pad() {
    let mut w = ChunkWriter::new(Vec::new());
    w.header(Tag::new(b"MARK"), 4, 0xFFFF_FFFF).expect("write");
    w.end().expect("write");
    let mut r = ChunkReader::new(Cursor::new(w.into_inner()));
    let h = r.read_chunk_head().expect("read").expect("header");
    assert_eq!(h.len, 0);
    assert_eq!(h.flags, 0);
    r.skip_payload(&h).expect("skip");
    assert_eq!(r.read_chunk_head().expect("read").expect("header").tag, tags::END);
}
