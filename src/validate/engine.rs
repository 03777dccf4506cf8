//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Validation Engine
//!
//! Runs record-level checks as records stream in, then cross-table and
//! semantic checks once every table has been seen, and aggregates all
//! findings into a [`ZiValidationReport`].
//!
//! Rules must be registered before records of their tables are validated:
//! the engine only retains payloads of tables some rule needs.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{ZiValidationConfig, ZiValidationMode};
use crate::errors::{Result, ZiError};
use crate::export::manifest::{compute_file_checksum, ZiManifest, ZiManifestTable};
use crate::export::reader::{verify_checksum, ZiShardReader};
use crate::export::writer::ZiShardDescriptor;
use crate::record::ZiRecord;
use crate::validate::graph::ZiDependencyGraph;
use crate::validate::report::{
    ZiDomainValidationSummary, ZiIssueCollector, ZiOverallResult, ZiValidationIssue,
    ZiValidationKind, ZiValidationPhase, ZiValidationReport,
};
use crate::validate::rules::{is_empty_value, key_values, ZiDependencyRule, ZiReferenceRule, ZiSemanticRule};
use crate::validate::schema::{ZiCompiledSchema, ZiSchemaFinding, ZiTableSchema};

struct ZiRetainedRecord {
    key: String,
    payload: Value,
    file: Option<String>,
    line: Option<u64>,
    shape_ok: bool,
}

pub struct ZiValidationEngine {
    config: ZiValidationConfig,
    phase: ZiValidationPhase,
    entered: HashSet<ZiValidationPhase>,
    schemas: BTreeMap<String, ZiCompiledSchema>,
    references: Vec<ZiReferenceRule>,
    dependencies: Vec<ZiDependencyRule>,
    semantics: Vec<ZiSemanticRule>,
    collector: ZiIssueCollector,
    domains: BTreeMap<String, ZiDomainValidationSummary>,
    keys: BTreeMap<String, HashSet<String>>,
    retained: BTreeMap<String, Vec<ZiRetainedRecord>>,
    cycles: Vec<Vec<String>>,
    records_validated: u64,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ZiValidationEngine {
    #[allow(non_snake_case)]
    pub fn new(config: ZiValidationConfig) -> Self {
        let collector = ZiIssueCollector::new(config.max_reported_errors);
        let mut entered = HashSet::new();
        entered.insert(ZiValidationPhase::Idle);
        Self {
            config,
            phase: ZiValidationPhase::Idle,
            entered,
            schemas: BTreeMap::new(),
            references: Vec::new(),
            dependencies: Vec::new(),
            semantics: Vec::new(),
            collector,
            domains: BTreeMap::new(),
            keys: BTreeMap::new(),
            retained: BTreeMap::new(),
            cycles: Vec::new(),
            records_validated: 0,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> ZiValidationPhase {
        self.phase
    }

    pub fn total_errors(&self) -> u64 {
        self.collector.total_errors()
    }

    /// Registers a schema under its own `table` id.
    pub fn register_schema(&mut self, schema: &ZiTableSchema) -> Result<()> {
        let table = schema.table.clone();
        self.register_schema_as(&table, schema)
    }

    fn register_schema_as(&mut self, table: &str, schema: &ZiTableSchema) -> Result<()> {
        self.enter(ZiValidationPhase::SchemaLoading);
        let compiled = schema.compile()?;
        log::debug!("registered schema for table '{}'", table);
        self.schemas.insert(table.to_string(), compiled);
        Ok(())
    }

    /// Loads the schema file referenced by every manifest table that has no
    /// schema registered yet. Paths are relative to `root`.
    pub fn load_schemas(&mut self, root: impl AsRef<Path>, manifest: &ZiManifest) -> Result<()> {
        let root = root.as_ref();
        self.enter(ZiValidationPhase::SchemaLoading);
        for (table, entry) in &manifest.tables {
            let Some(reference) = &entry.schema else {
                continue;
            };
            if self.schemas.contains_key(table) {
                continue;
            }
            let schema = ZiTableSchema::load(root.join(reference))?;
            if schema.table != *table {
                log::warn!(
                    "schema {} declares table '{}' but is referenced by '{}'",
                    reference,
                    schema.table,
                    table
                );
            }
            self.register_schema_as(table, &schema)?;
        }
        Ok(())
    }

    pub fn add_reference_rule(&mut self, rule: ZiReferenceRule) {
        self.references.push(rule);
    }

    pub fn add_dependency_rule(&mut self, rule: ZiDependencyRule) {
        self.dependencies.push(rule);
    }

    pub fn add_semantic_rule(&mut self, rule: ZiSemanticRule) {
        self.semantics.push(rule);
    }

    /// Streams `(line, record)` pairs of one table file through the
    /// record-level checks.
    pub fn validate_table_records<I>(&mut self, table: &str, file: Option<&str>, records: I) -> Result<()>
    where
        I: IntoIterator<Item = (u64, Result<ZiRecord>)>,
    {
        let summary = self.domains.entry(table.to_string()).or_default();
        if let Some(file) = file {
            if !summary.files.iter().any(|f| f == file) {
                summary.files.push(file.to_string());
            }
        }

        for (line, record) in records {
            match record {
                Ok(record) => self.check_record(table, file, Some(line), record)?,
                Err(err) => {
                    let fatal = matches!(err, ZiError::Io(_));
                    self.structural(table, file, Some(line), format!("unreadable line: {err}"))?;
                    if fatal {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// In-memory convenience over [`Self::validate_table_records`].
    pub fn validate_records(&mut self, table: &str, records: &[ZiRecord]) -> Result<()> {
        let numbered = records
            .iter()
            .enumerate()
            .map(|(i, record)| (i as u64 + 1, Ok(record.clone())));
        self.validate_table_records(table, None, numbered)
    }

    /// Loads schemas and streams every file of every manifest table.
    pub fn load_dataset(&mut self, root: impl AsRef<Path>, manifest: &ZiManifest) -> Result<()> {
        let root = root.as_ref();
        self.load_schemas(root, manifest)?;
        self.enter(ZiValidationPhase::DataLoading);

        for (table, entry) in &manifest.tables {
            self.domains.entry(table.clone()).or_default();
            if let Some(file) = &entry.file {
                self.load_entry_file(root, table, entry, file)?;
            }
            for shard in &entry.shards {
                self.load_shard(root, table, shard)?;
            }
            if entry.file.is_none() {
                if let Some(expected) = entry.record_count {
                    let actual = entry.shard_record_total();
                    if actual != expected {
                        self.structural(
                            table,
                            None,
                            None,
                            format!("manifest recordCount {expected} but shards declare {actual}"),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Validates a whole exported dataset and returns the report.
    pub fn validate_dataset(mut self, root: impl AsRef<Path>, manifest: &ZiManifest) -> Result<ZiValidationReport> {
        self.load_dataset(root, manifest)?;
        self.finish()
    }

    /// Runs cross-table and semantic checks and builds the report.
    pub fn finish(mut self) -> Result<ZiValidationReport> {
        self.run_cross_table()?;
        self.run_semantic()?;
        self.enter(ZiValidationPhase::Reported);

        let finished_at = Utc::now();
        let elapsed = self.started.elapsed();
        let seconds = elapsed.as_secs_f64();
        let records_per_second = if seconds > 0.0 {
            self.records_validated as f64 / seconds
        } else {
            self.records_validated as f64
        };

        for summary in self.domains.values_mut() {
            summary.result = ZiOverallResult::from_counts(summary.errors, summary.warnings);
        }

        let total_errors = self.collector.total_errors();
        let total_warnings = self.collector.total_warnings();
        let truncated = self.collector.truncated();
        let error_counts = self.collector.error_counts().clone();
        let (errors, warnings) = self.collector.into_parts();
        let mut errors_by_kind: BTreeMap<ZiValidationKind, Vec<ZiValidationIssue>> = BTreeMap::new();
        for issue in errors {
            errors_by_kind.entry(issue.kind).or_default().push(issue);
        }

        let report = ZiValidationReport {
            overall_result: ZiOverallResult::from_counts(total_errors, total_warnings),
            started_at: self.started_at,
            finished_at,
            duration_ms: elapsed.as_millis() as u64,
            records_validated: self.records_validated,
            records_per_second,
            domains: self.domains,
            total_errors,
            total_warnings,
            error_counts,
            errors_by_kind,
            warnings,
            truncated,
            cycles: self.cycles,
        };
        log::info!(
            "validation finished: {:?}, {} records, {} errors, {} warnings",
            report.overall_result,
            report.records_validated,
            report.total_errors,
            report.total_warnings
        );
        Ok(report)
    }

    fn enter(&mut self, phase: ZiValidationPhase) {
        self.phase = phase;
        if self.entered.insert(phase) {
            log::debug!("validation phase: {}", phase);
        }
    }

    fn needs_payload(&self, table: &str) -> bool {
        self.references.iter().any(|r| r.table == table)
            || self.dependencies.iter().any(|r| r.table == table)
            || self.semantics.iter().any(|r| r.table == table)
    }

    fn check_record(&mut self, table: &str, file: Option<&str>, line: Option<u64>, record: ZiRecord) -> Result<()> {
        self.records_validated += 1;
        self.domains.entry(table.to_string()).or_default().records += 1;

        self.enter(ZiValidationPhase::Structural);
        let mut shape_ok = true;
        if record.key.trim().is_empty() {
            shape_ok = false;
            self.structural(table, file, line, "record key is empty".to_string())?;
        } else if !self
            .keys
            .entry(table.to_string())
            .or_default()
            .insert(record.key.clone())
        {
            self.report_error(
                ZiValidationIssue::new(
                    ZiValidationKind::Structural,
                    table,
                    format!("duplicate key '{}'", record.key),
                )
                .at(file, line)
                .with_key(&record.key),
            )?;
        }

        let findings = match self.schemas.get(table) {
            Some(schema) => schema.check(&record.payload),
            None if !record.payload.is_object() => vec![ZiSchemaFinding::new(
                ZiValidationKind::Structural,
                "payload",
                "payload must be an object",
            )],
            None => Vec::new(),
        };

        for finding in findings {
            self.enter(phase_for(finding.kind));
            if finding.is_shape_error() {
                shape_ok = false;
            }
            self.report_error(
                ZiValidationIssue::new(finding.kind, table, finding.message)
                    .at(file, line)
                    .with_key(&record.key)
                    .with_rule(finding.rule),
            )?;
        }

        if self.needs_payload(table) {
            self.retained
                .entry(table.to_string())
                .or_default()
                .push(ZiRetainedRecord {
                    key: record.key,
                    payload: record.payload,
                    file: file.map(str::to_string),
                    line,
                    shape_ok,
                });
        }
        Ok(())
    }

    fn load_shard(&mut self, root: &Path, table: &str, shard: &ZiShardDescriptor) -> Result<()> {
        let file = shard.path.as_str();
        if !root.join(file).is_file() {
            return self.structural(table, Some(file), None, "shard file is missing".to_string());
        }
        if self.config.verify_checksums {
            match verify_checksum(root, shard) {
                Ok(true) => {}
                Ok(false) => self.structural(table, Some(file), None, "checksum mismatch".to_string())?,
                Err(err) => self.structural(table, Some(file), None, format!("checksum not computable: {err}"))?,
            }
        }
        let reader = match ZiShardReader::open(root, shard) {
            Ok(reader) => reader,
            Err(err) => return self.structural(table, Some(file), None, format!("cannot open shard: {err}")),
        };

        let before = self.domain_records(table);
        let mut unreadable = 0u64;
        let counted = reader.inspect(|(_, record)| {
            if record.is_err() {
                unreadable += 1;
            }
        });
        self.validate_table_records(table, Some(file), counted)?;
        let lines = self.domain_records(table) - before + unreadable;
        if lines != shard.record_count {
            self.structural(
                table,
                Some(file),
                None,
                format!("descriptor declares {} records, file holds {}", shard.record_count, lines),
            )?;
        }
        Ok(())
    }

    fn load_entry_file(&mut self, root: &Path, table: &str, entry: &ZiManifestTable, file: &str) -> Result<()> {
        let path = root.join(file);
        if !path.is_file() {
            return self.structural(table, Some(file), None, "entry file is missing".to_string());
        }
        if self.config.verify_checksums {
            if let Some(expected) = &entry.checksum {
                match compute_file_checksum(&path) {
                    Ok(actual) if actual == *expected => {}
                    Ok(_) => self.structural(table, Some(file), None, "checksum mismatch".to_string())?,
                    Err(err) => {
                        self.structural(table, Some(file), None, format!("checksum not computable: {err}"))?
                    }
                }
            }
        }
        if !matches!(entry.format.as_str(), "ndjson" | "jsonl") {
            log::debug!("table '{}': entry file format '{}' is not record-checked", table, entry.format);
            self.domains
                .entry(table.to_string())
                .or_default()
                .files
                .push(file.to_string());
            return Ok(());
        }
        match ZiShardReader::open_path(&path, entry.compression) {
            Ok(reader) => self.validate_table_records(table, Some(file), reader),
            Err(err) => self.structural(table, Some(file), None, format!("cannot open entry file: {err}")),
        }
    }

    fn domain_records(&self, table: &str) -> u64 {
        self.domains.get(table).map(|d| d.records).unwrap_or(0)
    }

    fn run_cross_table(&mut self) -> Result<()> {
        self.enter(ZiValidationPhase::CrossTable);
        for rule in self.references.clone() {
            self.check_reference(&rule)?;
        }
        for rule in self.dependencies.clone() {
            self.check_dependencies(&rule)?;
        }
        Ok(())
    }

    fn check_reference(&mut self, rule: &ZiReferenceRule) -> Result<()> {
        let targets = self.keys.get(&rule.target_table);
        if targets.is_none() {
            log::warn!(
                "reference '{}': target table '{}' has no validated records",
                rule.name,
                rule.target_table
            );
        }

        let mut unresolved = Vec::new();
        for record in self.retained.get(&rule.table).map(Vec::as_slice).unwrap_or(&[]) {
            let Some(value) = rule.field.resolve(&record.payload) else {
                continue;
            };
            for key in key_values(value) {
                if targets.map(|t| t.contains(&key)).unwrap_or(false) {
                    continue;
                }
                unresolved.push(
                    ZiValidationIssue::new(
                        ZiValidationKind::Reference,
                        &rule.table,
                        format!(
                            "'{}' = '{}' has no matching key in '{}'",
                            rule.field.as_dotted(),
                            key,
                            rule.target_table
                        ),
                    )
                    .at(record.file.as_deref(), record.line)
                    .with_key(&record.key)
                    .with_rule(&rule.name),
                );
            }
        }

        for issue in unresolved {
            if rule.optional {
                self.report_warning(issue);
            } else {
                self.report_error(issue)?;
            }
        }
        Ok(())
    }

    fn check_dependencies(&mut self, rule: &ZiDependencyRule) -> Result<()> {
        let mut graph = ZiDependencyGraph::new();
        for record in self.retained.get(&rule.table).map(Vec::as_slice).unwrap_or(&[]) {
            // Every key under `from` is a source of every key under `to`.
            let sources = match &rule.from {
                Some(path) => path.resolve(&record.payload).map(key_values).unwrap_or_default(),
                None => vec![record.key.clone()],
            };
            let targets = rule.to.resolve(&record.payload).map(key_values).unwrap_or_default();
            for from in &sources {
                for to in &targets {
                    graph.add_edge(from.clone(), to.clone());
                }
            }
        }

        for cycle in graph.find_cycles() {
            let mut rendered = cycle.join(" -> ");
            if let Some(first) = cycle.first() {
                rendered.push_str(" -> ");
                rendered.push_str(first);
            }
            let mut issue = ZiValidationIssue::new(
                ZiValidationKind::Cycle,
                &rule.table,
                format!("dependency cycle: {rendered}"),
            )
            .with_rule(&rule.name);
            if let Some(first) = cycle.first() {
                issue = issue.with_key(first);
            }
            self.cycles.push(cycle);
            self.report_error(issue)?;
        }
        Ok(())
    }

    fn run_semantic(&mut self) -> Result<()> {
        self.enter(ZiValidationPhase::Semantic);
        let mut issues = Vec::new();
        for rule in &self.semantics {
            for record in self.retained.get(&rule.table).map(Vec::as_slice).unwrap_or(&[]) {
                if !record.shape_ok || rule.discriminator.resolve(&record.payload) != Some(&rule.equals) {
                    continue;
                }
                for path in &rule.required {
                    if is_empty_value(path.resolve(&record.payload)) {
                        issues.push(
                            ZiValidationIssue::new(
                                ZiValidationKind::Semantic,
                                &rule.table,
                                format!(
                                    "records with {} = {} need a non-empty '{}'",
                                    rule.discriminator.as_dotted(),
                                    rule.equals,
                                    path.as_dotted()
                                ),
                            )
                            .at(record.file.as_deref(), record.line)
                            .with_key(&record.key)
                            .with_rule(&rule.name),
                        );
                    }
                }
            }
        }
        for issue in issues {
            self.report_error(issue)?;
        }
        Ok(())
    }

    fn structural(&mut self, table: &str, file: Option<&str>, line: Option<u64>, message: String) -> Result<()> {
        self.report_error(ZiValidationIssue::new(ZiValidationKind::Structural, table, message).at(file, line))
    }

    fn report_warning(&mut self, issue: ZiValidationIssue) {
        self.domains.entry(issue.table.clone()).or_default().warnings += 1;
        self.collector.warning(issue);
    }

    fn report_error(&mut self, issue: ZiValidationIssue) -> Result<()> {
        self.domains.entry(issue.table.clone()).or_default().errors += 1;
        let kind = issue.kind;
        let message = issue.message.clone();
        self.collector.error(issue);

        if let ZiValidationMode::FailFast { threshold } = self.config.mode {
            let errors = self.collector.total_errors();
            if errors > threshold {
                log::warn!("validation aborted after {} errors", errors);
                return Err(ZiError::ValidationAborted { kind, errors, message });
            }
        }
        Ok(())
    }
}

fn phase_for(kind: ZiValidationKind) -> ZiValidationPhase {
    match kind {
        ZiValidationKind::Structural => ZiValidationPhase::Structural,
        ZiValidationKind::MissingRequired | ZiValidationKind::DataType => ZiValidationPhase::DataType,
        ZiValidationKind::Pattern | ZiValidationKind::Range | ZiValidationKind::Enum => {
            ZiValidationPhase::Constraint
        }
        ZiValidationKind::Conditional => ZiValidationPhase::Conditional,
        ZiValidationKind::Reference | ZiValidationKind::Cycle => ZiValidationPhase::CrossTable,
        ZiValidationKind::Semantic => ZiValidationPhase::Semantic,
    }
}
