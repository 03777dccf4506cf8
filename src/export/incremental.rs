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

//! # Incremental Reuse Module
//!
//! Decides whether a group of related tables can be carried over from the
//! manifest of a previous run instead of being exported again.
//!
//! Reuse is all-or-nothing per group: tables that reference each other are
//! either all reused or all re-exported, so a dataset never mixes stale and
//! fresh members of one group. Any doubt (missing manifest, unknown table,
//! missing file) means "export again".

use std::path::{Path, PathBuf};

use crate::export::manifest::ZiManifest;
use crate::export::result::{ZiDomainExportResult, ZiEntryFile, ZiExportStatus};

/// Outcome of a group reuse check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZiReuseDecision {
    Reusable,
    Rejected { table: String, reason: String },
}

impl ZiReuseDecision {
    pub fn is_reusable(&self) -> bool {
        matches!(self, ZiReuseDecision::Reusable)
    }
}

#[derive(Clone, Debug)]
pub struct ZiIncrementalReuseManager {
    root: PathBuf,
    prior: Option<ZiManifest>,
}

impl ZiIncrementalReuseManager {
    /// A manager that never reuses anything.
    pub fn disabled(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            prior: None,
        }
    }

    /// Wraps an already loaded prior manifest.
    pub fn from_manifest(root: impl AsRef<Path>, manifest: ZiManifest) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            prior: Some(manifest),
        }
    }

    /// Loads the prior manifest from `<root>/<manifest_file>`.
    ///
    /// A missing, unreadable or unrecognized manifest is not an error: the
    /// manager simply has no prior state and everything is exported.
    #[allow(non_snake_case)]
    pub fn load(root: impl AsRef<Path>, manifest_file: &str, enabled: bool, namespaces: &[String]) -> Self {
        let root = root.as_ref();
        if !enabled {
            return Self::disabled(root);
        }
        let path = root.join(manifest_file);
        if !path.exists() {
            log::info!("incremental export: no prior manifest at {}", path.display());
            return Self::disabled(root);
        }
        match ZiManifest::load(&path) {
            Ok(manifest) if is_recognized(&manifest, namespaces) => {
                log::info!(
                    "incremental export: loaded prior manifest with {} tables",
                    manifest.tables.len()
                );
                Self::from_manifest(root, manifest)
            }
            Ok(_) => {
                log::warn!(
                    "incremental export: prior manifest {} has no recognized namespace, ignoring it",
                    path.display()
                );
                Self::disabled(root)
            }
            Err(err) => {
                log::warn!(
                    "incremental export: prior manifest {} is unreadable ({}), ignoring it",
                    path.display(),
                    err
                );
                Self::disabled(root)
            }
        }
    }

    pub fn has_prior_manifest(&self) -> bool {
        self.prior.is_some()
    }

    pub fn prior_manifest(&self) -> Option<&ZiManifest> {
        self.prior.as_ref()
    }

    /// Checks every table of the group; the first failing table rejects it.
    pub fn check_group(&self, tables: &[&str]) -> ZiReuseDecision {
        let Some(manifest) = &self.prior else {
            return ZiReuseDecision::Rejected {
                table: tables.first().map(|t| t.to_string()).unwrap_or_default(),
                reason: "no prior manifest".to_string(),
            };
        };
        if tables.is_empty() {
            return ZiReuseDecision::Rejected {
                table: String::new(),
                reason: "empty group".to_string(),
            };
        }

        for &table in tables {
            let reject = |reason: String| ZiReuseDecision::Rejected {
                table: table.to_string(),
                reason,
            };
            let Some(entry) = manifest.tables.get(table) else {
                return reject("not present in prior manifest".to_string());
            };
            if entry.schema.is_none() {
                return reject("prior entry has no schema reference".to_string());
            }
            let files = entry.referenced_files();
            if files.is_empty() {
                return reject("prior entry has no data files".to_string());
            }
            for file in files.into_iter().chain(entry.index.as_deref()) {
                if !self.root.join(file).is_file() {
                    return reject(format!("file '{file}' is missing"));
                }
            }
        }
        ZiReuseDecision::Reusable
    }

    /// Builds `Reused` results for the whole group, or `None` when any member
    /// fails its check.
    pub fn reuse_group(&self, tables: &[&str]) -> Option<Vec<ZiDomainExportResult>> {
        match self.check_group(tables) {
            ZiReuseDecision::Reusable => {}
            ZiReuseDecision::Rejected { table, reason } => {
                if self.prior.is_some() {
                    log::warn!(
                        "incremental export: group [{}] not reusable, table '{}': {}; exporting again",
                        tables.join(", "),
                        table,
                        reason
                    );
                }
                return None;
            }
        }

        let manifest = self.prior.as_ref()?;
        let mut results = Vec::with_capacity(tables.len());
        for &table in tables {
            let entry = manifest.tables.get(table)?;
            results.push(ZiDomainExportResult {
                table: table.to_string(),
                schema: entry.schema.clone(),
                format: entry.format.clone(),
                compression: entry.compression,
                shards: entry.shards.clone(),
                entry_file: entry.file.as_ref().map(|path| ZiEntryFile {
                    path: path.clone(),
                    record_count: entry.record_count.unwrap_or(0),
                    bytes: entry.byte_count.unwrap_or(0),
                    checksum: entry.checksum.clone().unwrap_or_default(),
                }),
                record_count_override: entry.record_count,
                byte_count_override: entry.byte_count,
                index: manifest.indexes.get(table).cloned(),
                status: ZiExportStatus::Reused,
                dropped_records: 0,
                duration_ms: 0,
            });
        }
        log::info!("incremental export: reused group [{}]", tables.join(", "));
        Some(results)
    }
}

/// A manifest counts as ours when any table lives under a recognized
/// namespace prefix. With no namespaces configured every manifest counts.
fn is_recognized(manifest: &ZiManifest, namespaces: &[String]) -> bool {
    if namespaces.is_empty() {
        return true;
    }
    manifest.tables.keys().any(|id| {
        namespaces.iter().any(|ns| {
            id.strip_prefix(ns.as_str())
                .map(|rest| rest.starts_with('/'))
                .unwrap_or(false)
        })
    })
}
