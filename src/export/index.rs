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

//! # Key Index Module
//!
//! A key index is a `.kindex` JSON document mapping every record key of one
//! table to its physical location: the shard it lives in plus either a byte
//! offset/length (uncompressed shards) or a 1-based line number inside the
//! decompressed stream (compressed shards).
//!
//! Index generation is an optimization. Any failure is logged and the table
//! is exported without an index.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::ZiCompression;
use crate::errors::{Result, ZiError};
use crate::export::{table_slug, write_json_atomic};

/// How entries locate records inside their shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZiIndexingStrategy {
    ByteOffset,
    LineNumber,
}

impl ZiIndexingStrategy {
    /// Byte offsets only make sense when the file bytes are the record bytes.
    pub fn for_compression(compression: ZiCompression) -> Self {
        if compression.is_compressed() {
            ZiIndexingStrategy::LineNumber
        } else {
            ZiIndexingStrategy::ByteOffset
        }
    }
}

/// Position of one record inside a shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZiKeyLocation {
    /// Offset of the line start and its length, newline excluded.
    ByteOffset { offset: u64, length: u64 },
    /// 1-based line number in the decompressed stream.
    LineNumber { line: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiKeyIndexEntry {
    pub key: String,
    /// Shard path relative to the dataset root.
    pub shard: String,
    #[serde(flatten)]
    pub location: ZiKeyLocation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiKeyIndexMetadata {
    pub record_count: u64,
    pub compression_mode: ZiCompression,
    pub indexing_strategy: ZiIndexingStrategy,
}

/// The persisted `.kindex` document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiKeyIndexDocument {
    pub domain: String,
    pub created_at: DateTime<Utc>,
    pub indexing_strategy: ZiIndexingStrategy,
    pub entry_count: u64,
    pub entries: Vec<ZiKeyIndexEntry>,
    pub metadata: ZiKeyIndexMetadata,
}

impl ZiKeyIndexDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            ZiError::validation(format!("invalid key index {}: {}", path.display(), e))
        })
    }

    /// Binary search over the sorted entries.
    ///
    /// With duplicate keys the first entry in write order is returned.
    pub fn lookup(&self, key: &str) -> Option<&ZiKeyIndexEntry> {
        let at = self.entries.partition_point(|entry| entry.key.as_str() < key);
        self.entries.get(at).filter(|entry| entry.key == key)
    }

    /// Whether entries are in non-decreasing ordinal key order.
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|pair| pair[0].key <= pair[1].key)
    }
}

/// Manifest-side reference to a table's index file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiManifestIndex {
    pub domain: String,
    /// Path relative to the dataset root.
    pub path: String,
    pub entry_count: u64,
    pub indexing_strategy: ZiIndexingStrategy,
    pub created_at: DateTime<Utc>,
}

/// Writes `.kindex` documents under `<root>/<index_dir>/`.
#[derive(Clone, Debug)]
pub struct ZiKeyIndexGenerator {
    root: PathBuf,
    index_dir: String,
    enabled: bool,
}

impl ZiKeyIndexGenerator {
    #[allow(non_snake_case)]
    pub fn new(root: impl AsRef<Path>, index_dir: impl Into<String>, enabled: bool) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index_dir: index_dir.into(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn index_relative_path(&self, table: &str) -> String {
        format!("{}/{}.kindex", self.index_dir, table_slug(table))
    }

    /// Sorts the candidates and persists the table's index.
    ///
    /// Returns `None` when indexing is disabled, there is nothing to index or
    /// writing failed; failures are logged, never raised.
    pub fn generate(
        &self,
        table: &str,
        entries: Vec<ZiKeyIndexEntry>,
        compression: ZiCompression,
        record_count: u64,
    ) -> Option<ZiManifestIndex> {
        if !self.enabled || entries.is_empty() {
            return None;
        }
        match self.write_index(table, entries, compression, record_count) {
            Ok(index) => {
                log::info!(
                    "table '{}': wrote key index {} ({} entries)",
                    table,
                    index.path,
                    index.entry_count
                );
                Some(index)
            }
            Err(err) => {
                log::warn!("table '{}': key index generation failed: {}", table, err);
                None
            }
        }
    }

    fn write_index(
        &self,
        table: &str,
        mut entries: Vec<ZiKeyIndexEntry>,
        compression: ZiCompression,
        record_count: u64,
    ) -> Result<ZiManifestIndex> {
        // Stable, so equal keys keep their write order.
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let strategy = ZiIndexingStrategy::for_compression(compression);
        let created_at = Utc::now();
        let entry_count = entries.len() as u64;
        let document = ZiKeyIndexDocument {
            domain: table.to_string(),
            created_at,
            indexing_strategy: strategy,
            entry_count,
            entries,
            metadata: ZiKeyIndexMetadata {
                record_count,
                compression_mode: compression,
                indexing_strategy: strategy,
            },
        };

        let relative = self.index_relative_path(table);
        write_json_atomic(&self.root.join(&relative), &document, false)?;

        Ok(ZiManifestIndex {
            domain: table.to_string(),
            path: relative,
            entry_count,
            indexing_strategy: strategy,
            created_at,
        })
    }
}
