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

//! Per-table export outcomes, accumulated by the export context and consumed
//! by the manifest generator.

use serde::{Deserialize, Serialize};

use crate::codec::ZiCompression;
use crate::errors::ZiError;
use crate::export::index::ZiManifestIndex;
use crate::export::writer::ZiShardDescriptor;

/// Terminal state of one table in a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ZiExportStatus {
    Exported,
    /// Carried over verbatim from the prior manifest.
    Reused,
    /// Exported with zero records.
    Empty,
    Failed { code: String, message: String },
}

/// A single opaque file written by a collaborator instead of shards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiEntryFile {
    pub path: String,
    pub record_count: u64,
    pub bytes: u64,
    pub checksum: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiDomainExportResult {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub format: String,
    pub compression: ZiCompression,
    #[serde(default)]
    pub shards: Vec<ZiShardDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_file: Option<ZiEntryFile>,
    /// Authoritative record count, used for reused tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count_override: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_count_override: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<ZiManifestIndex>,
    #[serde(flatten)]
    pub status: ZiExportStatus,
    /// Records skipped by the builder or dropped for exceeding the timeout.
    #[serde(default)]
    pub dropped_records: u64,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ZiDomainExportResult {
    /// A result with no output yet.
    pub fn pending(table: impl Into<String>, schema: Option<String>, compression: ZiCompression) -> Self {
        Self {
            table: table.into(),
            schema,
            format: "ndjson".to_string(),
            compression,
            shards: Vec::new(),
            entry_file: None,
            record_count_override: None,
            byte_count_override: None,
            index: None,
            status: ZiExportStatus::Empty,
            dropped_records: 0,
            duration_ms: 0,
        }
    }

    pub fn failed(mut self, err: &ZiError) -> Self {
        self.shards.clear();
        self.entry_file = None;
        self.index = None;
        self.status = ZiExportStatus::Failed {
            code: err.code().to_string(),
            message: err.to_string(),
        };
        self
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ZiExportStatus::Failed { .. })
    }

    /// Record count, or `None` when nothing was written.
    pub fn record_count(&self) -> Option<u64> {
        if let Some(count) = self.record_count_override {
            return Some(count);
        }
        if let Some(file) = &self.entry_file {
            return Some(file.record_count);
        }
        if self.shards.is_empty() {
            None
        } else {
            Some(self.shards.iter().map(|s| s.record_count).sum())
        }
    }

    /// Bytes on disk, or `None` when nothing was written.
    pub fn byte_count(&self) -> Option<u64> {
        if let Some(bytes) = self.byte_count_override {
            return Some(bytes);
        }
        if let Some(file) = &self.entry_file {
            return Some(file.bytes);
        }
        if self.shards.is_empty() {
            None
        } else {
            Some(self.shards.iter().map(|s| s.compressed_bytes).sum())
        }
    }

    pub fn uncompressed_bytes(&self) -> u64 {
        self.shards.iter().map(|s| s.uncompressed_bytes).sum()
    }

    /// Every data file path the result references.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.shards.iter().map(|s| s.path.as_str()).collect();
        if let Some(file) = &self.entry_file {
            files.push(file.path.as_str());
        }
        files
    }
}
