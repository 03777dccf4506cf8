//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.

use std::io::{Cursor, Read, Write};

use proptest::prelude::*;
use zishard::codec::{compress, decompress, ZiCodecOptions, ZiCompression, ZiSeekableReader};

const ALL: [ZiCompression; 4] = [
    ZiCompression::None,
    ZiCompression::Gzip,
    ZiCompression::Zstd,
    ZiCompression::ZstdSeekable,
];

fn small_frames() -> ZiCodecOptions {
    ZiCodecOptions {
        frame_size: 64,
        ..Default::default()
    }
}

#[test]
fn test_codec_names_and_extensions() {
    for codec in ALL {
        assert_eq!(ZiCompression::from_name(codec.name()).unwrap(), codec);
    }
    assert_eq!(ZiCompression::None.extension(), "");
    assert_eq!(ZiCompression::Gzip.extension(), ".gz");
    assert_eq!(ZiCompression::Zstd.extension(), ".zst");
    assert_eq!(ZiCompression::ZstdSeekable.extension(), ".zst");
    assert!(ZiCompression::from_name("lz4").is_err());
}

#[test]
fn test_empty_input_roundtrips() {
    for codec in ALL {
        let packed = compress(codec, b"", &small_frames()).unwrap();
        assert_eq!(decompress(codec, &packed).unwrap(), b"", "codec {codec}");
    }
}

#[test]
fn test_seekable_output_spans_frames() {
    let data: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
    let packed = compress(ZiCompression::ZstdSeekable, &data, &small_frames()).unwrap();
    let mut reader = ZiSeekableReader::new(Cursor::new(packed)).unwrap();
    assert_eq!(reader.frame_count(), data.len().div_ceil(64));
    assert_eq!(reader.table().decompressed_len(), data.len() as u64);

    let mut all = Vec::new();
    reader.read_to_end(&mut all).unwrap();
    assert_eq!(all, data);
}

#[test]
fn test_seekable_frames_decode_independently() {
    let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let packed = compress(ZiCompression::ZstdSeekable, &data, &small_frames()).unwrap();

    // Flip a byte inside the first frame; later frames must still decode.
    let mut damaged = packed.clone();
    damaged[6] ^= 0xFF;
    let mut reader = ZiSeekableReader::new(Cursor::new(damaged)).unwrap();
    let last = reader.frame_count() - 1;
    let frame = reader.read_frame(last).unwrap();
    let entry = *reader.table().entry(last).unwrap();
    let start = entry.decompressed_offset as usize;
    assert_eq!(start, last * 64);
    assert_eq!(frame,&data[start..start + entry.decompressed_size as usize]);
}

#[test]
fn test_seekable_range_read_crosses_frames() {
    let data: Vec<u8> = (0..2000u32).map(|i| (i % 97) as u8).collect();
    let packed = compress(ZiCompression::ZstdSeekable, &data, &small_frames()).unwrap();
    let mut reader = ZiSeekableReader::new(Cursor::new(packed)).unwrap();
    assert_eq!(reader.read_range(60, 200).unwrap(), &data[60..260]);
    assert_eq!(reader.read_range(1990, 10).unwrap(), &data[1990..]);
}

#[test]
fn test_streaming_encoder_matches_bulk_decoder() {
    for codec in ALL {
        let mut encoder = codec.encoder(Vec::new(), &small_frames()).unwrap();
        for chunk in [&b"{\"key\":\"a\"}\n"[..], b"{\"key\":\"b\"}\n", b"{\"key\":\"c\"}\n"] {
            encoder.write_all(chunk).unwrap();
        }
        let output = encoder.finish().unwrap();
        assert_eq!(output.frames.is_some(), codec == ZiCompression::ZstdSeekable);

        let text = decompress(codec, &output.sink).unwrap();
        assert_eq!(text.iter().filter(|b| **b == b'\n').count(), 3, "codec {codec}");
    }
}

proptest! {
    #[test]
    fn prop_every_codec_roundtrips(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        for codec in ALL {
            let packed = compress(codec, &data, &small_frames()).unwrap();
            prop_assert_eq!(decompress(codec, &packed).unwrap(), data.clone());
        }
    }

    #[test]
    fn prop_seekable_ranges_match_source(
        data in proptest::collection::vec(any::<u8>(), 1..3000),
        start in 0usize..3000,
        len in 0usize..500,
    ) {
        let start = start % data.len();
        let len = len.min(data.len() - start);
        let packed = compress(ZiCompression::ZstdSeekable, &data, &small_frames()).unwrap();
        let mut reader = ZiSeekableReader::new(Cursor::new(packed)).unwrap();
        prop_assert_eq!(reader.read_range(start as u64, len as u64).unwrap(), data[start..start + len].to_vec());
    }
}
