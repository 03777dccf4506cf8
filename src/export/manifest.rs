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

//! # Manifest Module
//!
//! The manifest is the single self-describing document of an export: which
//! tables exist, where their files are, how many records and bytes they hold,
//! their checksums and which key indexes were produced.
//!
//! Tables are kept in a `BTreeMap`, so serialization order is deterministic
//! regardless of the order in which tables finished exporting.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::ZiCompression;
use crate::config::{ZiExportConfig, ZiShardThresholds};
use crate::errors::{Result, ZiError};
use crate::export::index::ZiManifestIndex;
use crate::export::result::{ZiDomainExportResult, ZiExportStatus};
use crate::export::write_json_atomic;
use crate::export::writer::ZiShardDescriptor;

/// Identity of the tool that produced the dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiProducer {
    pub name: String,
    pub version: String,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ZiProducer {
    fn default() -> Self {
        Self {
            name: "ZiShard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl ZiProducer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiFormatInfo {
    pub mime: String,
    pub extension: String,
    /// Present only when every table of this format shares one codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<ZiCompression>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiManifestTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub format: String,
    #[serde(default)]
    pub compression: ZiCompression,
    /// Single entry file, for tables not written as shards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shards: Vec<ZiShardDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Relative path of the table's key index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

impl ZiManifestTable {
    /// Every file path the entry references, index excluded.
    pub fn referenced_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.file.iter().map(String::as_str).collect();
        files.extend(self.shards.iter().map(|s| s.path.as_str()));
        files
    }

    pub fn shard_record_total(&self) -> u64 {
        self.shards.iter().map(|s| s.record_count).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiTableStatistics {
    pub records: u64,
    pub bytes: u64,
    pub uncompressed_bytes: u64,
    pub shards: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiManifestStatistics {
    pub table_count: usize,
    pub total_records: u64,
    pub total_bytes: u64,
    pub total_uncompressed_bytes: u64,
    pub total_shards: usize,
    pub per_table: BTreeMap<String, ZiTableStatistics>,
}

/// Options the run was configured with, recorded for provenance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiExportOptionsSummary {
    pub compression: ZiCompression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seekable_frame_size: Option<usize>,
    pub default_thresholds: ZiShardThresholds,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub table_thresholds: BTreeMap<String, ZiShardThresholds>,
    pub build_indexes: bool,
    pub incremental: bool,
}

impl ZiExportOptionsSummary {
    pub fn from_config(config: &ZiExportConfig) -> Self {
        Self {
            compression: config.compression,
            seekable_frame_size: (config.compression == ZiCompression::ZstdSeekable)
                .then_some(config.seekable_frame_size),
            default_thresholds: config.default_thresholds,
            table_thresholds: config.table_thresholds.clone(),
            build_indexes: config.build_indexes,
            incremental: config.incremental,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiTableSummary {
    pub exported: Vec<String>,
    pub reused: Vec<String>,
    pub empty: Vec<String>,
    /// Failed table id → error message. Failed tables have no `tables` entry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiIndexSummary {
    pub indexed_tables: usize,
    pub total_entries: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiManifestMetadata {
    pub export_options: ZiExportOptionsSummary,
    pub table_summary: ZiTableSummary,
    pub index_summary: ZiIndexSummary,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiManifest {
    pub created_at: DateTime<Utc>,
    pub producer: ZiProducer,
    pub formats: BTreeMap<String, ZiFormatInfo>,
    pub tables: BTreeMap<String, ZiManifestTable>,
    pub statistics: ZiManifestStatistics,
    pub metadata: ZiManifestMetadata,
    #[serde(default)]
    pub indexes: BTreeMap<String, ZiManifestIndex>,
}

impl ZiManifest {
    pub fn table(&self, id: &str) -> Option<&ZiManifestTable> {
        self.tables.get(id)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ZiError::internal(format!("Failed to serialize manifest: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ZiError::validation(format!("Invalid manifest JSON: {}", e)))
    }

    /// Writes the manifest through a temporary file and rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(path.as_ref(), self, true)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// Builds a [`ZiManifest`] from the run's accumulated results.
#[derive(Clone, Debug, Default)]
pub struct ZiManifestGenerator {
    producer: ZiProducer,
    extra: Map<String, Value>,
}

impl ZiManifestGenerator {
    #[allow(non_snake_case)]
    pub fn new(producer: ZiProducer) -> Self {
        Self {
            producer,
            extra: Map::new(),
        }
    }

    /// Adds a free-form metadata entry under `metadata.extra`.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn generate(&self, results: &[ZiDomainExportResult], options: ZiExportOptionsSummary) -> ZiManifest {
        let mut tables = BTreeMap::new();
        let mut indexes = BTreeMap::new();
        let mut statistics = ZiManifestStatistics::default();
        let mut summary = ZiTableSummary::default();

        for result in results {
            match &result.status {
                ZiExportStatus::Failed { message, .. } => {
                    summary.failed.insert(result.table.clone(), message.clone());
                    continue;
                }
                ZiExportStatus::Exported => summary.exported.push(result.table.clone()),
                ZiExportStatus::Reused => summary.reused.push(result.table.clone()),
                ZiExportStatus::Empty => summary.empty.push(result.table.clone()),
            }

            if let Some(records) = result.record_count() {
                let table_stats = ZiTableStatistics {
                    records,
                    bytes: result.byte_count().unwrap_or(0),
                    uncompressed_bytes: result.uncompressed_bytes(),
                    shards: result.shards.len(),
                };
                statistics.total_records += table_stats.records;
                statistics.total_bytes += table_stats.bytes;
                statistics.total_uncompressed_bytes += table_stats.uncompressed_bytes;
                statistics.total_shards += table_stats.shards;
                statistics.per_table.insert(result.table.clone(), table_stats);
            }

            if let Some(index) = &result.index {
                indexes.insert(result.table.clone(), index.clone());
            }
            tables.insert(result.table.clone(), table_entry(result));
        }
        statistics.table_count = tables.len();

        let index_summary = ZiIndexSummary {
            indexed_tables: indexes.len(),
            total_entries: indexes.values().map(|i: &ZiManifestIndex| i.entry_count).sum(),
        };

        ZiManifest {
            created_at: Utc::now(),
            producer: self.producer.clone(),
            formats: format_registry(&tables),
            tables,
            statistics,
            metadata: ZiManifestMetadata {
                export_options: options,
                table_summary: summary,
                index_summary,
                extra: self.extra.clone(),
            },
            indexes,
        }
    }
}

fn table_entry(result: &ZiDomainExportResult) -> ZiManifestTable {
    ZiManifestTable {
        schema: result.schema.clone(),
        format: result.format.clone(),
        compression: result.compression,
        file: result.entry_file.as_ref().map(|f| f.path.clone()),
        shards: result.shards.clone(),
        record_count: result.record_count(),
        byte_count: result.byte_count(),
        checksum: table_checksum(result),
        index: result.index.as_ref().map(|i| i.path.clone()),
    }
}

/// Single files keep their own checksum; multi-shard tables get a checksum
/// over the ordered `path:checksum` list.
fn table_checksum(result: &ZiDomainExportResult) -> Option<String> {
    if let Some(file) = &result.entry_file {
        return Some(file.checksum.clone());
    }
    match result.shards.as_slice() {
        [] => None,
        [single] => Some(single.checksum.clone()),
        shards => Some(combine_checksums(
            shards.iter().map(|s| (s.path.as_str(), s.checksum.as_str())),
        )),
    }
}

pub fn combine_checksums<'a>(parts: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (path, checksum) in parts {
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(checksum.as_bytes());
        hasher.update(b"\n");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

fn format_registry(tables: &BTreeMap<String, ZiManifestTable>) -> BTreeMap<String, ZiFormatInfo> {
    let mut codecs: BTreeMap<&str, Vec<ZiCompression>> = BTreeMap::new();
    for table in tables.values() {
        codecs.entry(table.format.as_str()).or_default().push(table.compression);
    }

    codecs
        .into_iter()
        .map(|(format, used)| {
            let uniform = used.windows(2).all(|pair| pair[0] == pair[1]);
            let info = ZiFormatInfo {
                mime: mime_for(format).to_string(),
                extension: format!(".{format}"),
                compression: if uniform { used.first().copied() } else { None },
            };
            (format.to_string(), info)
        })
        .collect()
}

fn mime_for(format: &str) -> &'static str {
    match format {
        "ndjson" | "jsonl" => "application/x-ndjson",
        "json" => "application/json",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

/// `blake3:<hex>` over a file's bytes.
pub fn compute_file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}
