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

//! Cross-table and semantic rules registered with the validation engine.

use serde_json::Value;

use crate::errors::Result;
use crate::record::ZiFieldPath;

/// A field of `table` whose value(s) must be keys of `target_table`.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiReferenceRule {
    pub name: String,
    pub table: String,
    pub field: ZiFieldPath,
    pub target_table: String,
    /// Unresolved optional references are warnings, not errors.
    pub optional: bool,
}

impl ZiReferenceRule {
    #[allow(non_snake_case)]
    pub fn new(table: impl Into<String>, field: &str, target_table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let target_table = target_table.into();
        let field = ZiFieldPath::parse(field)?;
        Ok(Self {
            name: format!("{}.{} -> {}", table, field.as_dotted(), target_table),
            table,
            field,
            target_table,
            optional: false,
        })
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Dependency edges between records of one table: every key found under
/// `from` (the record key when unset) depends on every key found under `to`.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiDependencyRule {
    pub name: String,
    pub table: String,
    pub from: Option<ZiFieldPath>,
    pub to: ZiFieldPath,
}

impl ZiDependencyRule {
    #[allow(non_snake_case)]
    pub fn new(table: impl Into<String>, to: &str) -> Result<Self> {
        let table = table.into();
        let to = ZiFieldPath::parse(to)?;
        Ok(Self {
            name: format!("{} depends on {}", table, to.as_dotted()),
            table,
            from: None,
            to,
        })
    }

    pub fn with_from(mut self, from: &str) -> Result<Self> {
        self.from = Some(ZiFieldPath::parse(from)?);
        Ok(self)
    }
}

/// Records of `table` whose `discriminator` equals `equals` must carry every
/// field of `required` with a non-empty value.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiSemanticRule {
    pub name: String,
    pub table: String,
    pub discriminator: ZiFieldPath,
    pub equals: Value,
    pub required: Vec<ZiFieldPath>,
}

impl ZiSemanticRule {
    #[allow(non_snake_case)]
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        discriminator: &str,
        equals: Value,
        required: &[&str],
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            table: table.into(),
            discriminator: ZiFieldPath::parse(discriminator)?,
            equals,
            required: required
                .iter()
                .map(|path| ZiFieldPath::parse(path))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Key values carried by a reference field: strings and numbers, alone or
/// in an array. Anything else carries none.
pub fn key_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Empty means missing, null, an empty string or an empty array.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}
