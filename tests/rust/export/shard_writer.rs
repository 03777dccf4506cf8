//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.

use std::fs;

use serde_json::json;
use zishard::codec::{ZiCompression, ZiSeekableReader};
use zishard::config::ZiShardThresholds;
use zishard::export::reader::verify_checksum;
use zishard::export::{ZiKeyLocation, ZiShardReader, ZiShardWriter, ZiShardWriterConfig};
use zishard::record::ZiRecord;

fn records(n: usize) -> Vec<ZiRecord> {
    (0..n)
        .map(|i| ZiRecord::new(format!("key-{i:06}"), json!({"n": i, "text": "x".repeat(i % 7)})))
        .collect()
}

fn config(compression: ZiCompression, max_records: u64) -> ZiShardWriterConfig {
    ZiShardWriterConfig {
        compression,
        thresholds: ZiShardThresholds::new(max_records, 1 << 30),
        build_index: true,
        ..Default::default()
    }
}

#[test]
fn test_rotation_produces_ceil_n_over_m_shards() {
    for (n, m) in [(1usize, 1u64), (10, 3), (9, 3), (100, 100), (101, 100)] {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ZiShardWriter::new("t", dir.path(), config(ZiCompression::None, m)).unwrap();
        writer.write_records(&records(n)).unwrap();
        let outcome = writer.finish().unwrap();

        let expected = n.div_ceil(m as usize);
        assert_eq!(outcome.shards.len(), expected, "n={n} m={m}");
        assert!(outcome.shards.iter().all(|s| s.record_count <= m));
        assert_eq!(outcome.record_count(), n as u64);
    }
}

#[test]
fn test_byte_threshold_rotates() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ZiShardWriterConfig {
        thresholds: ZiShardThresholds::new(1_000_000, 200),
        ..Default::default()
    };
    let mut writer = ZiShardWriter::new("t", dir.path(), cfg).unwrap();
    writer.write_records(&records(50)).unwrap();
    let outcome = writer.finish().unwrap();
    assert!(outcome.shards.len() > 1);
    for shard in &outcome.shards {
        let on_disk = fs::metadata(dir.path().join(&shard.path)).unwrap().len();
        assert_eq!(on_disk, shard.uncompressed_bytes);
        assert_eq!(on_disk, shard.compressed_bytes);
    }
}

#[test]
fn test_key_ranges_are_ordered_across_shards() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = ZiShardWriter::new("t", dir.path(), config(ZiCompression::Gzip, 7)).unwrap();
    writer.write_records(&records(40)).unwrap();
    let outcome = writer.finish().unwrap();

    for pair in outcome.shards.windows(2) {
        assert!(pair[0].last_key <= pair[1].first_key);
    }
    for shard in &outcome.shards {
        assert!(shard.first_key <= shard.last_key);
        assert!(shard.path.ends_with(".ndjson.gz"));
    }
}

#[test]
fn test_every_codec_reads_back_and_verifies() {
    for codec in [
        ZiCompression::None,
        ZiCompression::Gzip,
        ZiCompression::Zstd,
        ZiCompression::ZstdSeekable,
    ] {
        let dir = tempfile::tempdir().unwrap();
        let source = records(25);
        let mut writer = ZiShardWriter::new("facts/t", dir.path(), config(codec, 10)).unwrap();
        writer.write_records(&source).unwrap();
        let outcome = writer.finish().unwrap();

        let mut back = Vec::new();
        for shard in &outcome.shards {
            assert!(verify_checksum(dir.path(), shard).unwrap(), "codec {codec}");
            back.extend(ZiShardReader::open(dir.path(), shard).unwrap().read_all().unwrap());
        }
        assert_eq!(back, source, "codec {codec}");
    }
}

#[test]
fn test_seekable_shards_record_frames() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(ZiCompression::ZstdSeekable, 1000);
    cfg.codec.frame_size = 256;
    let mut writer = ZiShardWriter::new("t", dir.path(), cfg).unwrap();
    writer.write_records(&records(200)).unwrap();
    let outcome = writer.finish().unwrap();
    let shard = &outcome.shards[0];

    assert_eq!(shard.frame_size, Some(256));
    let reader = ZiSeekableReader::open(&dir.path().join(&shard.path)).unwrap();
    assert_eq!(Some(reader.frame_count()), shard.frame_count);
    assert_eq!(reader.table().decompressed_len(), shard.uncompressed_bytes);
}

#[test]
fn test_index_candidates_follow_compression() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = ZiShardWriter::new("t", dir.path(), config(ZiCompression::Zstd, 4)).unwrap();
    writer.write_records(&records(6)).unwrap();
    let outcome = writer.finish().unwrap();

    let lines: Vec<u64> = outcome
        .index_entries
        .iter()
        .map(|e| match e.location {
            ZiKeyLocation::LineNumber { line } => line,
            ZiKeyLocation::ByteOffset { .. } => panic!("compressed shards are line-indexed"),
        })
        .collect();
    assert_eq!(lines, vec![1, 2, 3, 4, 1, 2]);
    assert_eq!(outcome.index_entries[4].shard, outcome.shards[1].path);
}

#[test]
fn test_no_temporary_files_remain() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = ZiShardWriter::new("t", dir.path(), config(ZiCompression::None, 3)).unwrap();
    writer.write_records(&records(10)).unwrap();
    let outcome = writer.finish().unwrap();

    let names: Vec<String> = fs::read_dir(dir.path().join("data/t"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), outcome.shards.len());
    assert!(names.iter().all(|n| !n.starts_with('.')));
}
