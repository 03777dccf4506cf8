//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.

use std::fs;

use serde_json::json;
use zishard::codec::ZiCompression;
use zishard::config::{ZiExportConfig, ZiShardThresholds, ZiValidationConfig};
use zishard::export::{
    ZiExportContext, ZiExportStatus, ZiKeyIndexDocument, ZiManifest, ZiShardReader, ZiTableSpec,
};
use zishard::record::ZiRecord;
use zishard::validate::ZiValidationEngine;

#[test]
fn test_large_table_export_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = ZiExportConfig::new(dir.path())
        .with_compression(ZiCompression::None)
        .with_thresholds(ZiShardThresholds::new(100_000, u64::MAX))
        .with_indexes(true);
    let mut ctx = ZiExportContext::new(config).unwrap();

    // Produced in reverse so the exporter has to sort.
    let items: Vec<u32> = (0..250_000).rev().collect();
    ctx.export_table(&ZiTableSpec::new("facts/observations"), &items, |n| {
        Some(ZiRecord::new(format!("obs-{n:07}"), json!({"n": n})))
    })
    .unwrap();
    let summary = ctx.finish().unwrap();

    let table = &summary.manifest.tables["facts/observations"];
    let counts: Vec<u64> = table.shards.iter().map(|s| s.record_count).collect();
    assert_eq!(counts, vec![100_000, 100_000, 50_000]);
    assert_eq!(table.record_count, Some(250_000));
    assert_eq!(summary.manifest.statistics.total_records, 250_000);
    assert_eq!(table.shards[0].first_key.as_deref(), Some("obs-0000000"));
    assert_eq!(table.shards[2].last_key.as_deref(), Some("obs-0249999"));

    let index_path = table.index.as_deref().unwrap();
    assert!(index_path.ends_with(".kindex"));
    let index = ZiKeyIndexDocument::load(dir.path().join(index_path)).unwrap();
    assert_eq!(index.entries.len(), 250_000);
    assert!(index.is_sorted());

    let on_disk = ZiManifest::load(&summary.manifest_path).unwrap();
    assert_eq!(on_disk.tables["facts/observations"].record_count, Some(250_000));

    let report = ZiValidationEngine::new(ZiValidationConfig::default())
        .validate_dataset(dir.path(), &on_disk)
        .unwrap();
    assert_eq!(report.records_validated, 250_000);
    assert_eq!(report.total_errors, 0);
    assert_eq!(summary.exit_code(Some(&report)), 0);
}

#[test]
fn test_failing_table_does_not_stop_others() {
    let dir = tempfile::tempdir().unwrap();
    let config = ZiExportConfig::new(dir.path()).with_required_tables(&["core/good"]);
    let mut ctx = ZiExportContext::new(config).unwrap();

    // Occupy the bad table's shard directory with a file so it cannot be created.
    fs::create_dir_all(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data/core_bad"), b"not a directory").unwrap();

    let bad = ctx
        .export_records(&ZiTableSpec::new("core/bad"), vec![ZiRecord::new("x", json!({}))])
        .unwrap();
    assert!(bad.is_failed());
    let good = ctx
        .export_records(&ZiTableSpec::new("core/good"), vec![ZiRecord::new("y", json!({}))])
        .unwrap();
    assert_eq!(good.status, ZiExportStatus::Exported);

    let summary = ctx.finish().unwrap();
    assert!(summary.manifest.tables.contains_key("core/good"));
    assert!(!summary.manifest.tables.contains_key("core/bad"));
    assert_eq!(summary.exit_code(None), 0);
}

#[test]
fn test_abort_on_table_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ZiExportConfig::new(dir.path());
    config.abort_on_table_failure = true;
    let mut ctx = ZiExportContext::new(config).unwrap();

    fs::create_dir_all(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data/t"), b"blocker").unwrap();
    let err = ctx
        .export_records(&ZiTableSpec::new("t"), vec![ZiRecord::new("k", json!({}))])
        .unwrap_err();
    assert_eq!(err.code(), "export");
}

#[test]
fn test_exit_code_reflects_strict_validation() {
    let dir = tempfile::tempdir().unwrap();
    let strict = ZiValidationConfig::default().strict(true);
    let config = ZiExportConfig::new(dir.path()).with_validation(strict.clone());
    let mut ctx = ZiExportContext::new(config).unwrap();
    ctx.export_records(
        &ZiTableSpec::new("t"),
        vec![ZiRecord::new("a", json!({})), ZiRecord::new("a", json!({}))],
    )
    .unwrap();
    let summary = ctx.finish().unwrap();

    let report = ZiValidationEngine::new(strict)
        .validate_dataset(dir.path(), &summary.manifest)
        .unwrap();
    assert_eq!(report.total_errors, 1);
    assert_eq!(summary.exit_code(Some(&report)), 2);
}

#[test]
fn test_record_timeout_drops_slow_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = ZiExportConfig::new(dir.path()).with_record_timeout_ms(5);
    let mut ctx = ZiExportContext::new(config).unwrap();
    let items: Vec<u32> = (0..4).collect();
    let result = ctx
        .export_table(&ZiTableSpec::new("t"), &items, |n| {
            if *n == 2 {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Some(ZiRecord::new(format!("k{n}"), json!({})))
        })
        .unwrap();
    assert_eq!(result.record_count(), Some(3));
    assert_eq!(result.dropped_records, 1);
}

#[test]
fn test_config_file_drives_export() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "outputDir: {}\ncompression: zstd-seekable\nseekableFrameSize: 1024\ndefaultThresholds:\n  maxRecordsPerShard: 10\n  maxBytesPerShard: 1048576\nbuildIndexes: true\n",
        dir.path().join("out").display()
    );
    let config_path = dir.path().join("export.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = ZiExportConfig::from_path(&config_path).unwrap();
    let mut ctx = ZiExportContext::new(config).unwrap();
    let records = (0..25).map(|i| ZiRecord::new(format!("r{i:02}"), json!({"i": i}))).collect();
    ctx.export_records(&ZiTableSpec::new("t"), records).unwrap();
    let summary = ctx.finish().unwrap();

    let table = &summary.manifest.tables["t"];
    assert_eq!(table.shards.len(), 3);
    assert!(table.shards.iter().all(|s| s.frame_size == Some(1024)));
    assert_eq!(summary.manifest.metadata.export_options.seekable_frame_size, Some(1024));
}

#[test]
fn test_tables_sharing_a_file_name_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = ZiExportConfig::new(dir.path()).with_indexes(true);
    let mut ctx = ZiExportContext::new(config).unwrap();

    ctx.export_records(&ZiTableSpec::new("facts/assets"), vec![ZiRecord::new("a1", json!({}))])
        .unwrap();
    let err = ctx
        .export_records(&ZiTableSpec::new("facts_assets"), vec![ZiRecord::new("b1", json!({}))])
        .unwrap_err();
    assert_eq!(err.code(), "config");
    assert!(err.to_string().contains("facts/assets"));

    let summary = ctx.finish().unwrap();
    assert!(!summary.manifest.tables.contains_key("facts_assets"));
    let shard = &summary.manifest.tables["facts/assets"].shards[0];
    let records = ZiShardReader::open(dir.path(), shard).unwrap().read_all().unwrap();
    let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["a1"]);

    let report = ZiValidationEngine::new(ZiValidationConfig::default())
        .validate_dataset(dir.path(), &summary.manifest)
        .unwrap();
    assert_eq!(report.total_errors, 0);
}

#[test]
fn test_failed_last_shard_rolls_back_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = ZiExportConfig::new(dir.path()).with_thresholds(ZiShardThresholds::new(2, 1 << 20));
    let mut ctx = ZiExportContext::new(config).unwrap();

    // The last shard cannot be renamed onto a directory.
    fs::create_dir_all(dir.path().join("data/t/t-00001.ndjson")).unwrap();
    let records = ["a", "b", "c"].iter().map(|k| ZiRecord::new(*k, json!({}))).collect();
    let result = ctx.export_records(&ZiTableSpec::new("t"), records).unwrap();
    assert!(result.is_failed());
    assert!(result.shards.is_empty());

    assert!(!dir.path().join("data/t/t-00000.ndjson").exists());
    let leftovers: Vec<_> = fs::read_dir(dir.path().join("data/t"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("t-00001.ndjson")]);

    let summary = ctx.finish().unwrap();
    assert_eq!(summary.exit_code(None), 1);
}
