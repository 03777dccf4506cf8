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

//! Validation findings and the report they are aggregated into.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ZiError};
use crate::export::write_json_atomic;

/// Category of a validation finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZiValidationKind {
    MissingRequired,
    DataType,
    Pattern,
    Range,
    Enum,
    Reference,
    Conditional,
    Structural,
    Cycle,
    Semantic,
}

impl ZiValidationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZiValidationKind::MissingRequired => "missing-required",
            ZiValidationKind::DataType => "data-type",
            ZiValidationKind::Pattern => "pattern",
            ZiValidationKind::Range => "range",
            ZiValidationKind::Enum => "enum",
            ZiValidationKind::Reference => "reference",
            ZiValidationKind::Conditional => "conditional",
            ZiValidationKind::Structural => "structural",
            ZiValidationKind::Cycle => "cycle",
            ZiValidationKind::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ZiValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phases of one validation run, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZiValidationPhase {
    Idle,
    SchemaLoading,
    DataLoading,
    Structural,
    DataType,
    Constraint,
    Conditional,
    CrossTable,
    Semantic,
    Reported,
}

impl fmt::Display for ZiValidationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiValidationIssue {
    pub kind: ZiValidationKind,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Rule or field the finding came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub message: String,
}

impl ZiValidationIssue {
    pub fn new(kind: ZiValidationKind, table: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            file: None,
            line: None,
            key: None,
            rule: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, file: Option<&str>, line: Option<u64>) -> Self {
        self.file = file.map(str::to_string);
        self.line = line;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZiOverallResult {
    Passed,
    PassedWithWarnings,
    Failed,
}

impl ZiOverallResult {
    pub fn from_counts(errors: u64, warnings: u64) -> Self {
        if errors > 0 {
            ZiOverallResult::Failed
        } else if warnings > 0 {
            ZiOverallResult::PassedWithWarnings
        } else {
            ZiOverallResult::Passed
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiDomainValidationSummary {
    pub files: Vec<String>,
    pub records: u64,
    pub errors: u64,
    pub warnings: u64,
    pub result: ZiOverallResult,
}

impl Default for ZiDomainValidationSummary {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            records: 0,
            errors: 0,
            warnings: 0,
            result: ZiOverallResult::Passed,
        }
    }
}

/// Collects findings, keeping exact totals while retaining at most
/// `max_reported` issues of each severity.
#[derive(Clone, Debug)]
pub struct ZiIssueCollector {
    max_reported: usize,
    errors: Vec<ZiValidationIssue>,
    warnings: Vec<ZiValidationIssue>,
    total_errors: u64,
    total_warnings: u64,
    error_counts: BTreeMap<ZiValidationKind, u64>,
}

impl ZiIssueCollector {
    pub fn new(max_reported: usize) -> Self {
        Self {
            max_reported,
            errors: Vec::new(),
            warnings: Vec::new(),
            total_errors: 0,
            total_warnings: 0,
            error_counts: BTreeMap::new(),
        }
    }

    pub fn error(&mut self, issue: ZiValidationIssue) {
        self.total_errors += 1;
        *self.error_counts.entry(issue.kind).or_insert(0) += 1;
        if self.errors.len() < self.max_reported {
            self.errors.push(issue);
        }
    }

    pub fn warning(&mut self, issue: ZiValidationIssue) {
        self.total_warnings += 1;
        if self.warnings.len() < self.max_reported {
            self.warnings.push(issue);
        }
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn total_warnings(&self) -> u64 {
        self.total_warnings
    }

    pub fn truncated(&self) -> bool {
        self.total_errors > self.errors.len() as u64 || self.total_warnings > self.warnings.len() as u64
    }

    pub fn errors(&self) -> &[ZiValidationIssue] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ZiValidationIssue] {
        &self.warnings
    }

    pub fn error_counts(&self) -> &BTreeMap<ZiValidationKind, u64> {
        &self.error_counts
    }

    pub fn into_parts(self) -> (Vec<ZiValidationIssue>, Vec<ZiValidationIssue>) {
        (self.errors, self.warnings)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiValidationReport {
    pub overall_result: ZiOverallResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub records_validated: u64,
    pub records_per_second: f64,
    pub domains: BTreeMap<String, ZiDomainValidationSummary>,
    pub total_errors: u64,
    pub total_warnings: u64,
    /// Exact error totals per kind, unaffected by truncation.
    pub error_counts: BTreeMap<ZiValidationKind, u64>,
    /// Retained errors grouped by kind.
    pub errors_by_kind: BTreeMap<ZiValidationKind, Vec<ZiValidationIssue>>,
    pub warnings: Vec<ZiValidationIssue>,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Vec<String>>,
}

impl ZiValidationReport {
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Whether the findings should fail the surrounding process.
    pub fn blocks_exit(&self, strict: bool) -> bool {
        strict && self.has_errors()
    }

    pub fn is_passed(&self) -> bool {
        self.overall_result != ZiOverallResult::Failed
    }

    /// Retained errors of one kind.
    pub fn errors_of(&self, kind: ZiValidationKind) -> &[ZiValidationIssue] {
        self.errors_by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count_of(&self, kind: ZiValidationKind) -> u64 {
        self.error_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ZiError::internal(format!("Failed to serialize validation report: {}", e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(path.as_ref(), self, true)
    }
}
