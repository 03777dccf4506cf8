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

//! # Data Export Module
//!
//! This module turns per-table record collections into an on-disk dataset:
//! sharded NDJSON files, optional key indexes and a manifest describing the
//! whole export.
//!
//! ## Module Components
//!
//! - **Writer** ([writer.rs](writer/index.html)): Size/count-bounded shard files with atomic finalization
//! - **Reader** ([reader.rs](reader/index.html)): Reading shards back, byte ranges and checksum checks
//! - **Index** ([index.rs](index/index.html)): Sorted key → location `.kindex` documents
//! - **Manifest** ([manifest.rs](manifest/index.html)): Dataset manifest generation and persistence
//! - **Incremental** ([incremental.rs](incremental/index.html)): Group-level reuse of a prior export
//! - **Result** ([result.rs](result/index.html)): Per-table export outcomes
//! - **Exporter** ([exporter.rs](exporter/index.html)): The run context tying everything together
//!
//! ## Usage Patterns
//!
//! ```rust
//! use zishard::config::ZiExportConfig;
//! use zishard::export::{ZiExportContext, ZiTableSpec};
//! use zishard::record::ZiRecord;
//! use serde_json::json;
//!
//! # fn main() -> zishard::errors::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let mut ctx = ZiExportContext::new(ZiExportConfig::new(dir.path()))?;
//! let spec = ZiTableSpec::new("facts/assets");
//! ctx.export_records(&spec, vec![ZiRecord::new("a", json!({"n": 1}))])?;
//! let summary = ctx.finish()?;
//! assert_eq!(summary.manifest.statistics.total_records, 1);
//! # Ok(())
//! # }
//! ```

pub mod exporter;
pub mod incremental;
pub mod index;
pub mod manifest;
pub mod reader;
pub mod result;
pub mod writer;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::errors::Result;

pub use exporter::{ZiExportContext, ZiExportSummary, ZiGroupOutcome, ZiTableSpec};
pub use incremental::{ZiIncrementalReuseManager, ZiReuseDecision};
pub use index::{
    ZiIndexingStrategy, ZiKeyIndexDocument, ZiKeyIndexEntry, ZiKeyIndexGenerator,
    ZiKeyIndexMetadata, ZiKeyLocation, ZiManifestIndex,
};
pub use manifest::{
    compute_file_checksum, ZiExportOptionsSummary, ZiFormatInfo, ZiIndexSummary, ZiManifest,
    ZiManifestGenerator, ZiManifestMetadata, ZiManifestStatistics, ZiManifestTable, ZiProducer,
    ZiTableStatistics, ZiTableSummary,
};
pub use reader::ZiShardReader;
pub use result::{ZiDomainExportResult, ZiEntryFile, ZiExportStatus};
pub use writer::{
    ZiChecksumWriter, ZiShardDescriptor, ZiShardWriteOutcome, ZiShardWriter, ZiShardWriterConfig,
};

/// Filesystem-safe form of a table id: every character outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn table_slug(table: &str) -> String {
    let slug: String = table
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() {
        "_".to_string()
    } else {
        slug
    }
}

/// Serializes `value` as JSON into `path` through a temporary sibling file,
/// so readers never observe a partially written document.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document");
    let tmp_path = parent.join(format!(".{name}.tmp"));

    let written = (|| -> Result<()> {
        let mut file = File::create(&tmp_path)?;
        {
            let mut writer = BufWriter::new(&mut file);
            if pretty {
                serde_json::to_writer_pretty(&mut writer, value)?;
            } else {
                serde_json::to_writer(&mut writer, value)?;
            }
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}
