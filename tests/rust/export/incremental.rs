//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.

use std::cell::Cell;
use std::fs;
use std::path::Path;

use serde_json::json;
use zishard::codec::ZiCompression;
use zishard::config::{ZiExportConfig, ZiShardThresholds};
use zishard::errors::ZiError;
use zishard::export::{
    ZiExportContext, ZiExportStatus, ZiExportSummary, ZiGroupOutcome, ZiIncrementalReuseManager,
    ZiReuseDecision, ZiTableSpec,
};
use zishard::record::ZiRecord;

fn specs() -> Vec<ZiTableSpec> {
    vec![
        ZiTableSpec::new("core/assets").with_schema("schemas/assets.json"),
        ZiTableSpec::new("core/events").with_schema("schemas/events.json"),
    ]
}

fn records(table: &ZiTableSpec) -> Vec<ZiRecord> {
    (0..30)
        .map(|i| ZiRecord::new(format!("{}-{i:03}", table.id), json!({"i": i})))
        .collect()
}

fn config(root: &Path) -> ZiExportConfig {
    ZiExportConfig::new(root)
        .with_compression(ZiCompression::Gzip)
        .with_thresholds(ZiShardThresholds::new(10, 1 << 30))
        .with_indexes(true)
        .with_incremental(true)
        .with_recognized_namespaces(&["core"])
}

/// Runs one export of the group and reports how many tables were produced.
fn run(root: &Path) -> (ZiExportSummary, ZiGroupOutcome, usize) {
    let produced = Cell::new(0);
    let mut ctx = ZiExportContext::new(config(root)).unwrap();
    let outcome = ctx
        .export_group(&specs(), |spec| {
            produced.set(produced.get() + 1);
            Ok(records(spec))
        })
        .unwrap();
    (ctx.finish().unwrap(), outcome, produced.get())
}

#[test]
fn test_second_run_reuses_intact_group() {
    let dir = tempfile::tempdir().unwrap();
    let (first, outcome, produced) = run(dir.path());
    assert_eq!(outcome, ZiGroupOutcome::Exported);
    assert_eq!(produced, 2);

    let (second, outcome, produced) = run(dir.path());
    assert_eq!(outcome, ZiGroupOutcome::Reused);
    assert_eq!(produced, 0);

    for (id, table) in &first.manifest.tables {
        let again = &second.manifest.tables[id];
        assert_eq!(again.shards, table.shards);
        assert_eq!(again.checksum, table.checksum);
        assert_eq!(again.record_count, table.record_count);
        assert_eq!(again.index, table.index);
    }
    assert_eq!(second.manifest.metadata.table_summary.reused.len(), 2);
    assert_eq!(second.manifest.statistics.total_records, 60);
    assert!(second.results.iter().all(|r| r.status == ZiExportStatus::Reused));
}

#[test]
fn test_missing_shard_rejects_whole_group() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _, _) = run(dir.path());

    let victim = &first.manifest.tables["core/events"].shards[1].path;
    fs::remove_file(dir.path().join(victim)).unwrap();

    let prior = ZiIncrementalReuseManager::load(dir.path(), "manifest.json", true, &["core".to_string()]);
    match prior.check_group(&["core/assets", "core/events"]) {
        ZiReuseDecision::Rejected { table, reason } => {
            assert_eq!(table, "core/events");
            assert!(reason.contains(victim.as_str()));
        }
        ZiReuseDecision::Reusable => panic!("group with a missing shard was reusable"),
    }
    // The intact table alone would be reusable; the group is not.
    assert!(prior.check_group(&["core/assets"]).is_reusable());

    let (second, outcome, produced) = run(dir.path());
    assert_eq!(outcome, ZiGroupOutcome::Exported);
    assert_eq!(produced, 2);
    assert!(dir.path().join(victim).exists());
    assert_eq!(second.manifest.metadata.table_summary.exported.len(), 2);
}

#[test]
fn test_missing_index_rejects_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _, _) = run(dir.path());
    let index = first.manifest.tables["core/assets"].index.clone().unwrap();
    fs::remove_file(dir.path().join(index)).unwrap();

    let (_, outcome, _) = run(dir.path());
    assert_eq!(outcome, ZiGroupOutcome::Exported);
}

#[test]
fn test_tables_without_schema_are_not_reused() {
    let dir = tempfile::tempdir().unwrap();
    let spec = ZiTableSpec::new("core/loose");
    {
        let mut ctx = ZiExportContext::new(config(dir.path())).unwrap();
        ctx.export_group(std::slice::from_ref(&spec), |s| Ok(records(s))).unwrap();
        ctx.finish().unwrap();
    }
    let mut ctx = ZiExportContext::new(config(dir.path())).unwrap();
    let outcome = ctx.export_group(&[spec], |s| Ok(records(s))).unwrap();
    assert_eq!(outcome, ZiGroupOutcome::Exported);
}

#[test]
fn test_unrecognized_manifest_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path());

    let other = config(dir.path()).with_recognized_namespaces(&["legacy"]);
    let ctx = ZiExportContext::new(other).unwrap();
    assert!(!ctx.reuse_manager().has_prior_manifest());
}

#[test]
fn test_producer_error_fails_only_that_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = ZiExportContext::new(config(dir.path()).with_required_tables(&["core/assets"])).unwrap();
    ctx.export_group(&specs(), |spec| {
        if spec.id == "core/events" {
            Err(ZiError::export(&spec.id, "upstream unavailable"))
        } else {
            Ok(records(spec))
        }
    })
    .unwrap();
    let summary = ctx.finish().unwrap();

    assert!(summary.manifest.tables.contains_key("core/assets"));
    assert!(!summary.manifest.tables.contains_key("core/events"));
    assert_eq!(summary.failed_tables().len(), 1);
    // Only required tables decide the exit status.
    assert_eq!(summary.exit_code(None), 0);

    // A group with a failed member cannot be reused next time.
    let (_, outcome, produced) = run(dir.path());
    assert_eq!(outcome, ZiGroupOutcome::Exported);
    assert_eq!(produced, 2);
}
