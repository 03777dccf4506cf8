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

//! # ZiShard Core Library
//!
//! This is the main library entry point for the ZiShard dataset export engine.
//! It turns keyed JSON records, grouped into logical tables, into a
//! self-describing dataset on disk and checks that dataset for quality.
//!
//! ## Module Overview
//!
//! - **record**: ZiRecord, the key + payload unit, and payload field paths
//! - **codec**: Compression codecs, including seekable zstd with a frame table
//! - **config**: Export and validation configuration (JSON/YAML)
//! - **export**: Shard writing, key indexes, manifests and incremental reuse
//! - **validate**: Schema, reference, cycle and semantic validation
//! - **errors**: ZiError and the crate-wide Result alias
//!
//! ## Feature Flags
//!
//! - `parallel`: Builds records on a Rayon worker pool
//! - `compression`: Enables gzip, zstd and seekable zstd shards
//! - `full`: Enables all features
//!
//! ## Quick Start
//!
//! ```rust
//! use zishard::{ZiCompression, ZiExportConfig, ZiExportContext, ZiRecord, ZiTableSpec};
//! use serde_json::json;
//!
//! # fn main() -> zishard::Result<()> {
//! let config = ZiExportConfig::new("out/dataset")
//!     .with_compression(ZiCompression::Zstd)
//!     .with_indexes(true);
//! let mut ctx = ZiExportContext::new(config)?;
//!
//! let items: Vec<u32> = (0..1000).collect();
//! ctx.export_table(&ZiTableSpec::new("facts/numbers"), &items, |n| {
//!     Some(ZiRecord::new(format!("n{n:06}"), json!({"value": n})))
//! })?;
//!
//! let summary = ctx.finish()?;
//! println!("wrote {}", summary.manifest_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Records** are built in parallel by collaborator code
//! 2. **Sorting** puts each table in global ordinal key order
//! 3. **Shard writer** streams them into bounded, atomically finalized files
//! 4. **Indexes and manifest** describe what was written
//! 5. **Validation** re-reads the dataset and reports findings
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ZiError>`. Data-quality findings are
//! not errors; they are collected into a validation report.

#![allow(non_snake_case)]

pub mod codec;
pub mod config;
pub mod errors;
pub mod export;
pub mod record;
pub mod validate;

pub use codec::{ZiCodecOptions, ZiCompression};
pub use config::{ZiExportConfig, ZiShardThresholds, ZiValidationConfig, ZiValidationMode};
pub use errors::{Result, ZiError};
pub use record::{ZiFieldPath, ZiRecord, ZiRecordBatch};

pub use export::{
    ZiDomainExportResult, ZiExportContext, ZiExportStatus, ZiExportSummary, ZiIncrementalReuseManager,
    ZiKeyIndexDocument, ZiKeyIndexGenerator, ZiManifest, ZiManifestGenerator, ZiShardDescriptor,
    ZiShardReader, ZiShardWriter, ZiShardWriterConfig, ZiTableSpec,
};
pub use validate::{
    ZiDependencyRule, ZiReferenceRule, ZiSemanticRule, ZiTableSchema, ZiValidationEngine,
    ZiValidationKind, ZiValidationReport,
};
