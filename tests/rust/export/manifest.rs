//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.

use std::fs;

use serde_json::{json, Value};
use zishard::codec::ZiCompression;
use zishard::config::{ZiExportConfig, ZiShardThresholds};
use zishard::export::manifest::combine_checksums;
use zishard::export::{compute_file_checksum, ZiExportContext, ZiManifest, ZiProducer, ZiTableSpec};
use zishard::record::ZiRecord;

fn records(prefix: &str, n: usize) -> Vec<ZiRecord> {
    (0..n)
        .map(|i| ZiRecord::new(format!("{prefix}{i:04}"), json!({"i": i})))
        .collect()
}

fn context(dir: &std::path::Path) -> ZiExportContext {
    let config = ZiExportConfig::new(dir)
        .with_compression(ZiCompression::Zstd)
        .with_thresholds(ZiShardThresholds::new(25, 1 << 30))
        .with_indexes(true);
    ZiExportContext::new(config).unwrap()
}

#[test]
fn test_manifest_counts_are_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    ctx.export_records(&ZiTableSpec::new("core/a").with_schema("schemas/a.json"), records("a", 60))
        .unwrap();
    ctx.export_records(&ZiTableSpec::new("core/b"), records("b", 10)).unwrap();
    let summary = ctx.finish().unwrap();
    let manifest = &summary.manifest;

    let mut total = 0;
    for (id, table) in &manifest.tables {
        let shard_sum = table.shard_record_total();
        assert_eq!(table.record_count, Some(shard_sum), "table {id}");
        assert_eq!(manifest.statistics.per_table[id].records, shard_sum);
        assert_eq!(manifest.indexes[id].entry_count, shard_sum);
        total += shard_sum;
    }
    assert_eq!(manifest.statistics.total_records, 70);
    assert_eq!(total, 70);
    assert_eq!(manifest.statistics.table_count, 2);
    assert_eq!(manifest.statistics.total_shards, 3 + 1);
    assert_eq!(manifest.tables["core/a"].schema.as_deref(), Some("schemas/a.json"));
    assert_eq!(manifest.formats["ndjson"].compression, Some(ZiCompression::Zstd));
}

#[test]
fn test_table_checksums_cover_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    ctx.export_records(&ZiTableSpec::new("one"), records("k", 5)).unwrap();
    ctx.export_records(&ZiTableSpec::new("many"), records("k", 60)).unwrap();
    let manifest = ctx.finish().unwrap().manifest;

    let one = &manifest.tables["one"];
    let file_sum = compute_file_checksum(dir.path().join(&one.shards[0].path)).unwrap();
    assert_eq!(one.checksum.as_deref(), Some(file_sum.as_str()));

    let many = &manifest.tables["many"];
    let combined = combine_checksums(many.shards.iter().map(|s| (s.path.as_str(), s.checksum.as_str())));
    assert_eq!(many.checksum.as_deref(), Some(combined.as_str()));
    for shard in &many.shards {
        assert_eq!(compute_file_checksum(dir.path().join(&shard.path)).unwrap(), shard.checksum);
    }
}

#[test]
fn test_manifest_json_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    ctx.set_producer(ZiProducer::new("exporter", "9.9.9"));
    ctx.insert_metadata("sourceRevision", Value::from("r42"));
    ctx.export_records(&ZiTableSpec::new("core/a"), records("a", 3)).unwrap();
    ctx.export_records(&ZiTableSpec::new("core/empty"), Vec::new()).unwrap();
    let summary = ctx.finish().unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&summary.manifest_path).unwrap()).unwrap();
    assert_eq!(raw["producer"]["name"], "exporter");
    assert_eq!(raw["producer"]["version"], "9.9.9");
    assert_eq!(raw["metadata"]["extra"]["sourceRevision"], "r42");
    assert_eq!(raw["metadata"]["exportOptions"]["buildIndexes"], true);
    assert_eq!(raw["tables"]["core/a"]["recordCount"], 3);
    assert_eq!(raw["tables"]["core/a"]["shards"][0]["recordCount"], 3);
    assert!(raw["tables"]["core/empty"].get("recordCount").is_none());
    assert!(raw["tables"]["core/empty"].get("shards").is_none());
    assert_eq!(raw["metadata"]["tableSummary"]["empty"][0], "core/empty");
    assert!(raw["createdAt"].is_string());
}

#[test]
fn test_saved_manifest_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    ctx.export_records(&ZiTableSpec::new("t"), records("x", 30)).unwrap();
    let summary = ctx.finish().unwrap();

    let loaded = ZiManifest::load(&summary.manifest_path).unwrap();
    assert_eq!(loaded, summary.manifest);
    assert!(!dir.path().join(".manifest.json.tmp").exists());
}

#[test]
fn test_failed_tables_are_listed_not_described() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    ctx.register_entry_file(&ZiTableSpec::new("core/missing"), "files/missing.json", "json", 1)
        .unwrap();
    let summary = ctx.finish().unwrap();

    assert!(!summary.manifest.tables.contains_key("core/missing"));
    assert!(summary.manifest.metadata.table_summary.failed.contains_key("core/missing"));
    assert_eq!(summary.exit_code(None), 1);
}

#[test]
fn test_entry_files_are_recorded_as_is() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("files")).unwrap();
    fs::write(dir.path().join("files/lookup.json"), br#"[{"id":1},{"id":2}]"#).unwrap();

    let mut ctx = context(dir.path());
    ctx.register_entry_file(&ZiTableSpec::new("ref/lookup"), "files/lookup.json", "json", 2)
        .unwrap();
    let manifest = ctx.finish().unwrap().manifest;

    let table = &manifest.tables["ref/lookup"];
    assert_eq!(table.file.as_deref(), Some("files/lookup.json"));
    assert_eq!(table.record_count, Some(2));
    assert_eq!(table.byte_count, Some(19));
    assert_eq!(manifest.formats["json"].mime, "application/json");
}
