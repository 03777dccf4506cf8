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

//! # Export Configuration Module
//!
//! Already-parsed configuration accepted by the export engine. Hosts either
//! build a [`ZiExportConfig`] in code or load it from a JSON/YAML document;
//! command-line parsing stays with the host.
//!
//! ```yaml
//! outputDir: ./out
//! compression: zstd-seekable
//! defaultThresholds:
//!   maxRecordsPerShard: 100000
//!   maxBytesPerShard: 268435456
//! tableThresholds:
//!   facts/bundles:
//!     maxRecordsPerShard: 100000
//!     maxBytesPerShard: 33554432
//! buildIndexes: true
//! incremental: true
//! validation:
//!   mode: { type: continueOnError }
//!   strict: true
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::{ZiCodecOptions, ZiCompression, DEFAULT_SEEKABLE_FRAME_SIZE, DEFAULT_ZSTD_LEVEL};
use crate::errors::{Result, ZiError};

/// Shard rotation thresholds for one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiShardThresholds {
    /// Rotate once this many records are in the active shard.
    pub max_records_per_shard: u64,
    /// Rotate once this many uncompressed bytes are in the active shard.
    pub max_bytes_per_shard: u64,
}

impl Default for ZiShardThresholds {
    fn default() -> Self {
        Self {
            max_records_per_shard: 100_000,
            max_bytes_per_shard: 256 * 1024 * 1024,
        }
    }
}

impl ZiShardThresholds {
    pub fn new(max_records_per_shard: u64, max_bytes_per_shard: u64) -> Self {
        Self {
            max_records_per_shard,
            max_bytes_per_shard,
        }
    }

    fn validate(&self, scope: &str) -> Result<()> {
        if self.max_records_per_shard == 0 {
            return Err(ZiError::config(format!(
                "{scope}: maxRecordsPerShard must be positive"
            )));
        }
        if self.max_bytes_per_shard == 0 {
            return Err(ZiError::config(format!(
                "{scope}: maxBytesPerShard must be positive"
            )));
        }
        Ok(())
    }
}

/// How the validation engine reacts to errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ZiValidationMode {
    /// Abort as soon as the error count exceeds `threshold`.
    FailFast { threshold: u64 },
    /// Accumulate every finding and always return a report.
    #[default]
    ContinueOnError,
}

/// Validation strictness and limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZiValidationConfig {
    pub mode: ZiValidationMode,
    /// Issues stored in the report; later ones are only counted.
    pub max_reported_errors: usize,
    /// In strict mode any validation error makes the run exit non-zero.
    pub strict: bool,
    /// Recompute shard checksums while loading data.
    pub verify_checksums: bool,
}

impl Default for ZiValidationConfig {
    fn default() -> Self {
        Self {
            mode: ZiValidationMode::default(),
            max_reported_errors: 1000,
            strict: false,
            verify_checksums: true,
        }
    }
}

impl ZiValidationConfig {
    pub fn fail_fast(mut self, threshold: u64) -> Self {
        self.mode = ZiValidationMode::FailFast { threshold };
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn max_reported_errors(mut self, max: usize) -> Self {
        self.max_reported_errors = max;
        self
    }
}

/// Complete configuration surface of an export run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZiExportConfig {
    /// Root of the produced dataset.
    pub output_dir: PathBuf,
    /// Shard sub-directory under the root.
    pub data_dir: String,
    /// Key index sub-directory under the root.
    pub index_dir: String,
    /// Manifest file name under the root.
    pub manifest_file: String,
    pub compression: ZiCompression,
    pub compression_level: i32,
    pub seekable_frame_size: usize,
    pub default_thresholds: ZiShardThresholds,
    /// Per-table overrides of `default_thresholds`.
    pub table_thresholds: BTreeMap<String, ZiShardThresholds>,
    pub build_indexes: bool,
    pub incremental: bool,
    /// Table-id namespaces a prior manifest must use to be trusted.
    pub recognized_namespaces: Vec<String>,
    /// Tables whose failure fails the run; `None` means every table.
    pub required_tables: Option<Vec<String>>,
    pub abort_on_table_failure: bool,
    /// Worker threads for record construction; defaults to the CPU count.
    pub worker_threads: Option<usize>,
    /// Records whose construction takes longer are dropped.
    pub record_timeout_ms: Option<u64>,
    pub validation: ZiValidationConfig,
}

impl Default for ZiExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("export"),
            data_dir: "data".to_string(),
            index_dir: "indexes".to_string(),
            manifest_file: "manifest.json".to_string(),
            compression: ZiCompression::None,
            compression_level: DEFAULT_ZSTD_LEVEL,
            seekable_frame_size: DEFAULT_SEEKABLE_FRAME_SIZE,
            default_thresholds: ZiShardThresholds::default(),
            table_thresholds: BTreeMap::new(),
            build_indexes: false,
            incremental: false,
            recognized_namespaces: Vec::new(),
            required_tables: None,
            abort_on_table_failure: false,
            worker_threads: None,
            record_timeout_ms: None,
            validation: ZiValidationConfig::default(),
        }
    }
}

impl ZiExportConfig {
    #[allow(non_snake_case)]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_compression(mut self, compression: ZiCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_seekable_frame_size(mut self, frame_size: usize) -> Self {
        self.seekable_frame_size = frame_size;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ZiShardThresholds) -> Self {
        self.default_thresholds = thresholds;
        self
    }

    pub fn with_table_thresholds(mut self, table: &str, thresholds: ZiShardThresholds) -> Self {
        self.table_thresholds.insert(table.to_string(), thresholds);
        self
    }

    pub fn with_indexes(mut self, enabled: bool) -> Self {
        self.build_indexes = enabled;
        self
    }

    pub fn with_incremental(mut self, enabled: bool) -> Self {
        self.incremental = enabled;
        self
    }

    pub fn with_recognized_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.recognized_namespaces = namespaces.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_required_tables(mut self, tables: &[&str]) -> Self {
        self.required_tables = Some(tables.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_record_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.record_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_validation(mut self, validation: ZiValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    /// Thresholds for a table, falling back to the defaults.
    pub fn thresholds_for(&self, table: &str) -> ZiShardThresholds {
        self.table_thresholds
            .get(table)
            .copied()
            .unwrap_or(self.default_thresholds)
    }

    pub fn codec_options(&self) -> ZiCodecOptions {
        ZiCodecOptions {
            level: self.compression_level,
            frame_size: self.seekable_frame_size,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.manifest_file)
    }

    /// Whether a failure of `table` fails the whole run.
    pub fn is_required(&self, table: &str) -> bool {
        match &self.required_tables {
            Some(tables) => tables.iter().any(|t| t == table),
            None => true,
        }
    }

    /// Rejects configurations that could not produce a dataset.
    pub fn validate(&self) -> Result<()> {
        self.compression.ensure_available()?;
        self.default_thresholds.validate("defaultThresholds")?;
        for (table, thresholds) in &self.table_thresholds {
            thresholds.validate(&format!("tableThresholds.{table}"))?;
        }
        if self.compression == ZiCompression::ZstdSeekable
            && (self.seekable_frame_size == 0 || self.seekable_frame_size > u32::MAX as usize)
        {
            return Err(ZiError::config(format!(
                "seekableFrameSize {} out of range",
                self.seekable_frame_size
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(ZiError::config("workerThreads must be positive"));
        }
        if self.manifest_file.trim().is_empty() {
            return Err(ZiError::config("manifestFile may not be empty"));
        }
        Ok(())
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ZiError::config(format!("invalid JSON configuration: {e}")))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| ZiError::config(format!("invalid YAML configuration: {e}")))
    }

    /// Loads a configuration file, choosing the parser by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(ZiError::config(format!(
                "unsupported configuration extension '{other}'"
            ))),
        }
    }
}
