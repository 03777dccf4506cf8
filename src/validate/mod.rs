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

//! # Dataset Validation Module
//!
//! Checks an exported dataset (or records streaming into one) against table
//! schemas, cross-table references, dependency cycles and semantic rules.
//!
//! ## Module Components
//!
//! - **Engine** ([engine.rs](engine/index.html)): Phase-ordered validation driver
//! - **Schema** ([schema.rs](schema/index.html)): Table schemas and their compiled form
//! - **Rules** ([rules.rs](rules/index.html)): Reference, dependency and semantic rules
//! - **Graph** ([graph.rs](graph/index.html)): Iterative cycle detection
//! - **Report** ([report.rs](report/index.html)): Findings and the final report
//!
//! ## Usage
//!
//! ```rust
//! use zishard::config::ZiValidationConfig;
//! use zishard::record::ZiRecord;
//! use zishard::validate::{ZiReferenceRule, ZiValidationEngine};
//! use serde_json::json;
//!
//! # fn main() -> zishard::errors::Result<()> {
//! let mut engine = ZiValidationEngine::new(ZiValidationConfig::default());
//! engine.add_reference_rule(ZiReferenceRule::new("events", "asset", "assets")?);
//! engine.validate_records("assets", &[ZiRecord::new("a1", json!({}))])?;
//! engine.validate_records("events", &[ZiRecord::new("e1", json!({"asset": "a2"}))])?;
//! let report = engine.finish()?;
//! assert_eq!(report.total_errors, 1);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod graph;
pub mod report;
pub mod rules;
pub mod schema;

pub use engine::ZiValidationEngine;
pub use graph::ZiDependencyGraph;
pub use report::{
    ZiDomainValidationSummary, ZiIssueCollector, ZiOverallResult, ZiValidationIssue,
    ZiValidationKind, ZiValidationPhase, ZiValidationReport,
};
pub use rules::{ZiDependencyRule, ZiReferenceRule, ZiSemanticRule};
pub use schema::{
    ZiCompiledSchema, ZiCondition, ZiConditionalRule, ZiFieldSchema, ZiFieldType,
    ZiSchemaFinding, ZiTableSchema,
};
