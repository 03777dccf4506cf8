//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.

use std::fs;
use std::io::Write;

use serde_json::{json, Value};
use zishard::codec::ZiCompression;
use zishard::config::{ZiExportConfig, ZiShardThresholds, ZiValidationConfig};
use zishard::errors::ZiError;
use zishard::export::{ZiExportContext, ZiManifest, ZiTableSpec};
use zishard::record::ZiRecord;
use zishard::validate::{
    ZiCondition, ZiConditionalRule, ZiDependencyRule, ZiFieldSchema, ZiFieldType, ZiOverallResult,
    ZiReferenceRule, ZiSemanticRule, ZiTableSchema, ZiValidationEngine, ZiValidationKind,
    ZiValidationReport,
};

fn rec(key: &str, payload: Value) -> ZiRecord {
    ZiRecord::new(key, payload)
}

fn asset_schema() -> ZiTableSchema {
    let mut status = ZiFieldSchema::of(ZiFieldType::String);
    status.allowed = vec![json!("active"), json!("retired")];
    let mut code = ZiFieldSchema::of(ZiFieldType::String);
    code.pattern = Some("^[A-Z]{3}-[0-9]+$".to_string());
    let mut weight = ZiFieldSchema::of(ZiFieldType::Number);
    weight.minimum = Some(0.0);
    weight.maximum = Some(1000.0);

    ZiTableSchema::new("assets")
        .require("code")
        .require("status")
        .field("code", code)
        .field("status", status)
        .field("weight", weight)
        .field("tags", ZiFieldSchema::of(ZiFieldType::Array))
        .conditional(ZiConditionalRule {
            name: Some("retired assets carry a date".to_string()),
            when: ZiCondition {
                field: "status".to_string(),
                equals: json!("retired"),
            },
            then_required: vec!["retiredAt".to_string()],
            then_fields: Default::default(),
        })
}

fn run(engine: ZiValidationEngine) -> ZiValidationReport {
    engine.finish().unwrap()
}

#[test]
fn test_schema_findings_by_kind() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.register_schema(&asset_schema()).unwrap();
    engine
        .validate_records(
            "assets",
            &[
                rec("a1", json!({"code": "ABC-1", "status": "active", "weight": 10})),
                rec("a2", json!({"status": "active"})),
                rec("a3", json!({"code": "ABC-3", "status": "active", "tags": "x"})),
                rec("a4", json!({"code": "bad", "status": "lost", "weight": 5000})),
                rec("a5", json!({"code": "ABC-5", "status": "retired"})),
                rec("a6", json!(["not", "an", "object"])),
            ],
        )
        .unwrap();
    let report = run(engine);

    assert_eq!(report.count_of(ZiValidationKind::MissingRequired), 1);
    assert_eq!(report.count_of(ZiValidationKind::DataType), 1);
    assert_eq!(report.count_of(ZiValidationKind::Pattern), 1);
    assert_eq!(report.count_of(ZiValidationKind::Enum), 1);
    assert_eq!(report.count_of(ZiValidationKind::Range), 1);
    assert_eq!(report.count_of(ZiValidationKind::Conditional), 1);
    assert_eq!(report.count_of(ZiValidationKind::Structural), 1);
    assert_eq!(report.total_errors, 7);
    assert_eq!(report.domains["assets"].records, 6);
    assert_eq!(report.domains["assets"].result, ZiOverallResult::Failed);

    let missing = &report.errors_of(ZiValidationKind::MissingRequired)[0];
    assert_eq!(missing.key.as_deref(), Some("a2"));
    assert_eq!(missing.line, Some(2));
}

#[test]
fn test_required_and_optional_references() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.add_reference_rule(ZiReferenceRule::new("events", "asset", "assets").unwrap());
    engine.add_reference_rule(ZiReferenceRule::new("events", "related", "assets").unwrap().optional());

    engine
        .validate_records("assets", &[rec("a1", json!({})), rec("a2", json!({}))])
        .unwrap();
    engine
        .validate_records(
            "events",
            &[
                rec("e1", json!({"asset": "a1", "related": ["a2", "a9"]})),
                rec("e2", json!({"asset": "a7"})),
                rec("e3", json!({})),
            ],
        )
        .unwrap();
    let report = run(engine);

    assert_eq!(report.count_of(ZiValidationKind::Reference), 1);
    assert_eq!(report.errors_of(ZiValidationKind::Reference)[0].key.as_deref(), Some("e2"));
    assert_eq!(report.total_warnings, 1);
    assert!(report.warnings[0].message.contains("a9"));
    assert_eq!(report.domains["events"].warnings, 1);
}

#[test]
fn test_cycle_reported_once_and_diamond_ignored() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.add_dependency_rule(ZiDependencyRule::new("tasks", "dependsOn").unwrap());
    engine
        .validate_records(
            "tasks",
            &[
                rec("A", json!({"dependsOn": ["B"]})),
                rec("B", json!({"dependsOn": ["C"]})),
                rec("C", json!({"dependsOn": ["A"]})),
                rec("D", json!({"dependsOn": ["E", "F"]})),
                rec("E", json!({"dependsOn": ["G"]})),
                rec("F", json!({"dependsOn": ["G"]})),
                rec("G", json!({})),
            ],
        )
        .unwrap();
    let report = run(engine);

    assert_eq!(report.count_of(ZiValidationKind::Cycle), 1);
    assert_eq!(report.cycles, vec![vec!["A".to_string(), "B".to_string(), "C".to_string()]]);
    let issue = &report.errors_of(ZiValidationKind::Cycle)[0];
    assert!(issue.message.contains("A -> B -> C -> A"));
}

#[test]
fn test_dependency_edges_from_payload_field() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.add_dependency_rule(
        ZiDependencyRule::new("modules", "imports")
            .unwrap()
            .with_from("name")
            .unwrap(),
    );
    engine
        .validate_records(
            "modules",
            &[
                rec("1", json!({"name": "core", "imports": ["util"]})),
                rec("2", json!({"name": "util", "imports": ["core"]})),
            ],
        )
        .unwrap();
    let report = run(engine);
    assert_eq!(report.cycles, vec![vec!["core".to_string(), "util".to_string()]]);
}

#[test]
fn test_every_source_in_a_from_array_gets_edges() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.add_dependency_rule(
        ZiDependencyRule::new("modules", "imports")
            .unwrap()
            .with_from("names")
            .unwrap(),
    );
    engine
        .validate_records(
            "modules",
            &[
                rec("1", json!({"names": ["core", "base"], "imports": ["util"]})),
                rec("2", json!({"names": ["util"], "imports": ["base"]})),
            ],
        )
        .unwrap();
    let report = run(engine);
    // Only the second name of the first record closes the loop.
    assert_eq!(report.cycles, vec![vec!["base".to_string(), "util".to_string()]]);
}

#[test]
fn test_semantic_rule_skips_malformed_records() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.register_schema(&ZiTableSchema::new("people").require("kind")).unwrap();
    engine.add_semantic_rule(
        ZiSemanticRule::new("employees need a team", "people", "kind", json!("employee"), &["team"]).unwrap(),
    );
    engine
        .validate_records(
            "people",
            &[
                rec("p1", json!({"kind": "employee", "team": "core"})),
                rec("p2", json!({"kind": "employee", "team": ""})),
                rec("p3", json!({"kind": "contractor"})),
                rec("p4", json!({"kind": "employee"})),
                rec("p5", json!({"team": []})),
            ],
        )
        .unwrap();
    let report = run(engine);

    assert_eq!(report.count_of(ZiValidationKind::Semantic), 2);
    let keys: Vec<&str> = report
        .errors_of(ZiValidationKind::Semantic)
        .iter()
        .filter_map(|i| i.key.as_deref())
        .collect();
    assert_eq!(keys, vec!["p2", "p4"]);
    assert_eq!(report.count_of(ZiValidationKind::MissingRequired), 1);
}

#[test]
fn test_retained_errors_are_capped() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default().max_reported_errors(3));
    let records: Vec<ZiRecord> = (0..10).map(|i| rec(&format!("k{i}"), json!(i))).collect();
    engine.validate_records("t", &records).unwrap();
    let report = run(engine);

    assert_eq!(report.total_errors, 10);
    assert_eq!(report.count_of(ZiValidationKind::Structural), 10);
    assert_eq!(report.errors_of(ZiValidationKind::Structural).len(), 3);
    assert!(report.truncated);
}

#[test]
fn test_fail_fast_stops_with_first_crossing_kind() {
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default().fail_fast(2));
    engine.add_reference_rule(ZiReferenceRule::new("events", "asset", "assets").unwrap());
    engine
        .validate_records(
            "events",
            &[rec("e1", json!({"asset": "x"})), rec("e2", json!({"asset": "y"}))],
        )
        .unwrap();
    engine.validate_records("bad", &[rec("b", json!(null))]).unwrap();

    match engine.finish().unwrap_err() {
        ZiError::ValidationAborted { kind, errors, .. } => {
            assert_eq!(kind, ZiValidationKind::Reference);
            assert_eq!(errors, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

fn export_dataset(root: &std::path::Path) -> ZiManifest {
    fs::create_dir_all(root.join("schemas")).unwrap();
    fs::write(
        root.join("schemas/assets.json"),
        r#"{"table": "core/assets", "required": ["code"], "fields": {"code": {"type": "string"}}}"#,
    )
    .unwrap();

    let config = ZiExportConfig::new(root)
        .with_compression(ZiCompression::Gzip)
        .with_thresholds(ZiShardThresholds::new(4, 1 << 20));
    let mut ctx = ZiExportContext::new(config).unwrap();
    let assets = (0..10)
        .map(|i| {
            let payload = if i == 7 { json!({"code": 7}) } else { json!({"code": format!("A{i}")}) };
            rec(&format!("a{i:02}"), payload)
        })
        .collect();
    ctx.export_records(
        &ZiTableSpec::new("core/assets").with_schema("schemas/assets.json"),
        assets,
    )
    .unwrap();
    ctx.export_records(
        &ZiTableSpec::new("core/links"),
        vec![rec("l1", json!({"asset": "a03"})), rec("l2", json!({"asset": "zz"}))],
    )
    .unwrap();
    ctx.finish().unwrap().manifest
}

#[test]
fn test_validate_exported_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = export_dataset(dir.path());

    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.add_reference_rule(ZiReferenceRule::new("core/links", "asset", "core/assets").unwrap());
    let report = engine.validate_dataset(dir.path(), &manifest).unwrap();

    assert_eq!(report.records_validated, 12);
    assert_eq!(report.count_of(ZiValidationKind::DataType), 1);
    assert_eq!(report.count_of(ZiValidationKind::Reference), 1);
    assert_eq!(report.domains["core/assets"].files.len(), 3);
    let type_issue = &report.errors_of(ZiValidationKind::DataType)[0];
    assert_eq!(type_issue.key.as_deref(), Some("a07"));
    assert_eq!(type_issue.line, Some(4));
    assert!(type_issue.file.as_deref().unwrap().ends_with("core_assets-00001.ndjson.gz"));
}

#[test]
fn test_tampered_and_missing_shards_are_structural() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = export_dataset(dir.path());
    let shards = &manifest.tables["core/assets"].shards;

    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join(&shards[0].path))
        .unwrap();
    file.write_all(b"trailing junk").unwrap();
    drop(file);
    fs::remove_file(dir.path().join(&shards[2].path)).unwrap();

    let report = ZiValidationEngine::new(ZiValidationConfig::default())
        .validate_dataset(dir.path(), &manifest)
        .unwrap();
    let messages: Vec<&str> = report
        .errors_of(ZiValidationKind::Structural)
        .iter()
        .map(|i| i.message.as_str())
        .collect();
    assert!(messages.contains(&"checksum mismatch"));
    assert!(messages.contains(&"shard file is missing"));
    assert!(!report.is_passed());
}

#[test]
fn test_report_is_saved_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
    engine.validate_records("t", &[rec("a", json!({})), rec("a", json!({}))]).unwrap();
    let report = run(engine);

    let path = dir.path().join("reports/validation.json");
    report.save(&path).unwrap();
    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["overallResult"], "failed");
    assert_eq!(raw["totalErrors"], 1);
    assert_eq!(raw["errorCounts"]["structural"], 1);
    assert_eq!(raw["errorsByKind"]["structural"][0]["key"], "a");

    let loaded: ZiValidationReport = serde_json::from_value(raw).unwrap();
    assert_eq!(loaded.total_errors, 1);
}
