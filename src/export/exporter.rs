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

//! # Export Context Module
//!
//! [`ZiExportContext`] owns one export run: the validated configuration, the
//! worker pool, the incremental reuse manager and the per-table results that
//! end up in the manifest.
//!
//! ## Table export flow
//!
//! 1. Records are built from collaborator items on the worker pool. Items the
//!    builder skips, or whose construction exceeds the per-record timeout,
//!    are dropped with a warning.
//! 2. Records are sorted by key (stable, ordinal).
//! 3. A single [`ZiShardWriter`] writes them sequentially.
//! 4. The key index is generated from the writer's candidates.
//!
//! A failing table is rolled back and recorded as failed; other tables keep
//! exporting unless `abortOnTableFailure` is set.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde_json::Value;

use crate::codec::ZiCompression;
use crate::config::ZiExportConfig;
use crate::errors::{Result, ZiError};
use crate::export::incremental::ZiIncrementalReuseManager;
use crate::export::index::ZiKeyIndexGenerator;
use crate::export::manifest::{
    compute_file_checksum, ZiExportOptionsSummary, ZiManifest, ZiManifestGenerator, ZiProducer,
};
use crate::export::result::{ZiDomainExportResult, ZiEntryFile, ZiExportStatus};
use crate::export::table_slug;
use crate::export::writer::{ZiShardWriter, ZiShardWriterConfig};
use crate::record::ZiRecord;
use crate::validate::ZiValidationReport;

/// What the caller asks to export for one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZiTableSpec {
    pub id: String,
    /// Schema reference recorded in the manifest, relative to the dataset root.
    pub schema: Option<String>,
}

impl ZiTableSpec {
    #[allow(non_snake_case)]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// How a table group was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZiGroupOutcome {
    Reused,
    Exported,
}

/// Result of a finished run.
#[derive(Debug)]
pub struct ZiExportSummary {
    pub manifest: ZiManifest,
    pub manifest_path: PathBuf,
    pub results: Vec<ZiDomainExportResult>,
    pub elapsed_ms: u64,
    config: ZiExportConfig,
}

impl ZiExportSummary {
    pub fn failed_tables(&self) -> Vec<&ZiDomainExportResult> {
        self.results.iter().filter(|r| r.is_failed()).collect()
    }

    /// Process exit status for the run.
    ///
    /// `1` when a required table failed, `2` when strict validation found
    /// errors, `0` otherwise.
    pub fn exit_code(&self, validation: Option<&ZiValidationReport>) -> i32 {
        if self.failed_tables().iter().any(|r| self.config.is_required(&r.table)) {
            return 1;
        }
        match validation {
            Some(report) if report.blocks_exit(self.config.validation.strict) => 2,
            _ => 0,
        }
    }
}

pub struct ZiExportContext {
    config: ZiExportConfig,
    reuse: ZiIncrementalReuseManager,
    indexer: ZiKeyIndexGenerator,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
    producer: ZiProducer,
    extra: serde_json::Map<String, Value>,
    results: Vec<ZiDomainExportResult>,
    started: Instant,
}

impl ZiExportContext {
    /// Validates the configuration and prepares the output directory.
    ///
    /// Nothing is written before the configuration has been accepted.
    #[allow(non_snake_case)]
    pub fn new(config: ZiExportConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.output_dir)?;

        #[cfg(feature = "parallel")]
        let pool = {
            let threads = config.worker_threads.unwrap_or_else(num_cpus::get).max(1);
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("zishard-worker-{i}"))
                .build()
                .map_err(|e| ZiError::internal(format!("failed to build worker pool: {e}")))?
        };

        let reuse = ZiIncrementalReuseManager::load(
            &config.output_dir,
            &config.manifest_file,
            config.incremental,
            &config.recognized_namespaces,
        );
        let indexer = ZiKeyIndexGenerator::new(&config.output_dir, config.index_dir.clone(), config.build_indexes);

        log::info!(
            "export context ready: output={} compression={} indexes={} incremental={}",
            config.output_dir.display(),
            config.compression,
            config.build_indexes,
            config.incremental
        );

        Ok(Self {
            config,
            reuse,
            indexer,
            #[cfg(feature = "parallel")]
            pool,
            producer: ZiProducer::default(),
            extra: serde_json::Map::new(),
            results: Vec::new(),
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &ZiExportConfig {
        &self.config
    }

    pub fn results(&self) -> &[ZiDomainExportResult] {
        &self.results
    }

    pub fn reuse_manager(&self) -> &ZiIncrementalReuseManager {
        &self.reuse
    }

    pub fn set_producer(&mut self, producer: ZiProducer) {
        self.producer = producer;
    }

    /// Adds a free-form entry to the manifest's `metadata.extra`.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    /// Builds records from `items` on the worker pool, then sorts and writes
    /// them.
    ///
    /// `build` returning `None` skips the item.
    pub fn export_table<T, F>(&mut self, spec: &ZiTableSpec, items: &[T], build: F) -> Result<&ZiDomainExportResult>
    where
        T: Sync,
        F: Fn(&T) -> Option<ZiRecord> + Sync + Send,
    {
        self.ensure_new_table(&spec.id)?;
        let started = Instant::now();
        let (records, dropped) = self.build_records(&spec.id, items, &build);
        self.write_table(spec, records, dropped, started)
    }

    /// Sorts and writes records that are already built.
    pub fn export_records(&mut self, spec: &ZiTableSpec, records: Vec<ZiRecord>) -> Result<&ZiDomainExportResult> {
        self.ensure_new_table(&spec.id)?;
        self.write_table(spec, records, 0, Instant::now())
    }

    /// Exports a group of related tables, reusing the prior run's output for
    /// the whole group when possible.
    ///
    /// `produce` is only called when the group is not reused. An error from
    /// it fails that table alone.
    pub fn export_group<F>(&mut self, specs: &[ZiTableSpec], mut produce: F) -> Result<ZiGroupOutcome>
    where
        F: FnMut(&ZiTableSpec) -> Result<Vec<ZiRecord>>,
    {
        for (i, spec) in specs.iter().enumerate() {
            self.ensure_new_table(&spec.id)?;
            ensure_distinct_slug(&spec.id, specs[..i].iter().map(|s| s.id.as_str()))?;
        }
        let ids: Vec<&str> = specs.iter().map(|s| s.id.as_str()).collect();
        if let Some(reused) = self.reuse.reuse_group(&ids) {
            self.results.extend(reused);
            return Ok(ZiGroupOutcome::Reused);
        }

        for spec in specs {
            let started = Instant::now();
            match produce(spec) {
                Ok(records) => {
                    self.write_table(spec, records, 0, started)?;
                }
                Err(err) => {
                    let result = ZiDomainExportResult::pending(&spec.id, spec.schema.clone(), self.config.compression);
                    self.record_failure(result, &err)?;
                }
            }
        }
        Ok(ZiGroupOutcome::Exported)
    }

    /// Registers a single file a collaborator wrote itself, relative to the
    /// output directory. The file is recorded as-is.
    pub fn register_entry_file(
        &mut self,
        spec: &ZiTableSpec,
        relative_path: &str,
        format: &str,
        record_count: u64,
    ) -> Result<&ZiDomainExportResult> {
        self.ensure_new_table(&spec.id)?;
        let path = self.config.output_dir.join(relative_path);
        let mut result = ZiDomainExportResult::pending(&spec.id, spec.schema.clone(), ZiCompression::None);
        result.format = format.to_string();

        let registered = fs::metadata(&path)
            .map_err(ZiError::from)
            .and_then(|meta| Ok((meta.len(), compute_file_checksum(&path)?)));
        match registered {
            Ok((bytes, checksum)) => {
                result.entry_file = Some(ZiEntryFile {
                    path: relative_path.replace('\\', "/"),
                    record_count,
                    bytes,
                    checksum,
                });
                result.status = ZiExportStatus::Exported;
                self.results.push(result);
                self.last_result()
            }
            Err(err) => {
                let err = ZiError::export(&spec.id, format!("entry file '{relative_path}': {err}"));
                self.record_failure(result, &err)?;
                self.last_result()
            }
        }
    }

    /// Writes the manifest and closes the run.
    pub fn finish(self) -> Result<ZiExportSummary> {
        let mut generator = ZiManifestGenerator::new(self.producer.clone());
        for (key, value) in &self.extra {
            generator = generator.with_extra(key.clone(), value.clone());
        }
        let manifest = generator.generate(&self.results, ZiExportOptionsSummary::from_config(&self.config));
        let manifest_path = self.config.manifest_path();
        manifest.save(&manifest_path)?;

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        log::info!(
            "export finished in {} ms: {} tables, {} records, {} failed",
            elapsed_ms,
            manifest.tables.len(),
            manifest.statistics.total_records,
            manifest.metadata.table_summary.failed.len()
        );

        Ok(ZiExportSummary {
            manifest,
            manifest_path,
            results: self.results,
            elapsed_ms,
            config: self.config,
        })
    }

    fn ensure_new_table(&self, table: &str) -> Result<()> {
        if table.trim().is_empty() {
            return Err(ZiError::config("table id may not be empty"));
        }
        if self.results.iter().any(|r| r.table == table) {
            return Err(ZiError::validation(format!(
                "table '{table}' was already exported in this run"
            )));
        }
        ensure_distinct_slug(table, self.results.iter().map(|r| r.table.as_str()))
    }

    fn last_result(&self) -> Result<&ZiDomainExportResult> {
        self.results
            .last()
            .ok_or_else(|| ZiError::internal("no result recorded"))
    }

    fn build_records<T, F>(&self, table: &str, items: &[T], build: &F) -> (Vec<ZiRecord>, u64)
    where
        T: Sync,
        F: Fn(&T) -> Option<ZiRecord> + Sync + Send,
    {
        let timeout = self.config.record_timeout_ms.map(Duration::from_millis);
        let build_one = |item: &T| -> Option<ZiRecord> {
            let started = Instant::now();
            let record = build(item)?;
            if let Some(limit) = timeout {
                let elapsed = started.elapsed();
                if elapsed > limit {
                    log::warn!(
                        "table '{}': record '{}' took {:?} (limit {:?}), dropped",
                        table,
                        record.key,
                        elapsed,
                        limit
                    );
                    return None;
                }
            }
            Some(record)
        };

        #[cfg(feature = "parallel")]
        let built: Vec<Option<ZiRecord>> = self.pool.install(|| items.par_iter().map(build_one).collect());
        #[cfg(not(feature = "parallel"))]
        let built: Vec<Option<ZiRecord>> = items.iter().map(build_one).collect();

        let total = built.len() as u64;
        let records: Vec<ZiRecord> = built.into_iter().flatten().collect();
        let dropped = total - records.len() as u64;
        if dropped > 0 {
            log::warn!("table '{}': {} of {} items produced no record", table, dropped, total);
        }
        (records, dropped)
    }

    fn write_table(
        &mut self,
        spec: &ZiTableSpec,
        mut records: Vec<ZiRecord>,
        dropped: u64,
        started: Instant,
    ) -> Result<&ZiDomainExportResult> {
        #[cfg(feature = "parallel")]
        self.pool.install(|| records.par_sort_by(|a, b| a.key.cmp(&b.key)));
        #[cfg(not(feature = "parallel"))]
        records.sort_by(|a, b| a.key.cmp(&b.key));

        let mut result = ZiDomainExportResult::pending(&spec.id, spec.schema.clone(), self.config.compression);
        result.dropped_records = dropped;

        let writer_config = ZiShardWriterConfig::for_table(&self.config, &spec.id);
        let written = ZiShardWriter::new(&spec.id, &self.config.output_dir, writer_config).and_then(|mut writer| {
            match writer.write_records(&records) {
                Ok(()) => writer.finish(),
                Err(err) => {
                    writer.abort();
                    Err(err)
                }
            }
        });

        let outcome = match written {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_failure(result, &err)?;
                return self.last_result();
            }
        };

        let record_count = outcome.record_count();
        result.index = self.indexer.generate(
            &spec.id,
            outcome.index_entries,
            self.config.compression,
            record_count,
        );
        result.shards = outcome.shards;
        result.status = if record_count == 0 {
            ZiExportStatus::Empty
        } else {
            ZiExportStatus::Exported
        };
        result.duration_ms = started.elapsed().as_millis() as u64;

        log::info!(
            "table '{}': exported {} records into {} shard(s) in {} ms",
            spec.id,
            record_count,
            result.shards.len(),
            result.duration_ms
        );
        self.results.push(result);
        self.last_result()
    }

    fn record_failure(&mut self, result: ZiDomainExportResult, err: &ZiError) -> Result<()> {
        log::warn!("table '{}': export failed: {}", result.table, err);
        let table = result.table.clone();
        self.results.push(result.failed(err));
        if self.config.abort_on_table_failure {
            return Err(ZiError::export(table, err.to_string()));
        }
        Ok(())
    }
}

/// Shard and index file names derive from the table slug, so two ids that
/// sanitize to the same slug would write the same files.
fn ensure_distinct_slug<'a>(table: &str, others: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let slug = table_slug(table);
    for other in others {
        if other != table && table_slug(other) == slug {
            return Err(ZiError::config(format!(
                "table '{table}' maps to file name '{slug}', already used by table '{other}'"
            )));
        }
    }
    Ok(())
}
