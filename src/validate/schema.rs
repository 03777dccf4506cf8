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

//! # Table Schema Module
//!
//! A table schema declares the payload shape of one table: required fields,
//! per-field type and constraints, whether undeclared top-level fields are
//! allowed and conditional requirements.
//!
//! ```json
//! {
//!   "table": "facts/assets",
//!   "required": ["kind", "size"],
//!   "fields": {
//!     "kind": {"type": "string", "enum": ["texture", "mesh"]},
//!     "size": {"type": "integer", "minimum": 0},
//!     "name": {"type": "string", "pattern": "^[a-z_]+$", "nullable": true}
//!   },
//!   "additionalFields": false,
//!   "conditionals": [
//!     {"when": {"field": "kind", "equals": "mesh"}, "thenRequired": ["vertices"]}
//!   ]
//! }
//! ```
//!
//! Schemas are compiled once (patterns included) into a [`ZiCompiledSchema`]
//! which checks payloads without further allocation of rule state.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, ZiError};
use crate::record::ZiFieldPath;
use crate::validate::report::ZiValidationKind;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZiFieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl ZiFieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ZiFieldType::String => value.is_string(),
            ZiFieldType::Integer => value.is_i64() || value.is_u64(),
            ZiFieldType::Number => value.is_number(),
            ZiFieldType::Boolean => value.is_boolean(),
            ZiFieldType::Object => value.is_object(),
            ZiFieldType::Array => value.is_array(),
            ZiFieldType::Any => true,
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZiFieldSchema {
    #[serde(rename = "type")]
    pub field_type: ZiFieldType,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Value>,
}

impl ZiFieldSchema {
    pub fn of(field_type: ZiFieldType) -> Self {
        Self {
            field_type,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZiCondition {
    pub field: String,
    pub equals: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiConditionalRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub when: ZiCondition,
    #[serde(default)]
    pub then_required: Vec<String>,
    #[serde(default)]
    pub then_fields: BTreeMap<String, ZiFieldSchema>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiTableSchema {
    pub table: String,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, ZiFieldSchema>,
    #[serde(default = "default_additional_fields")]
    pub additional_fields: bool,
    #[serde(default)]
    pub conditionals: Vec<ZiConditionalRule>,
}

fn default_additional_fields() -> bool {
    true
}

impl ZiTableSchema {
    #[allow(non_snake_case)]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            required: Vec::new(),
            fields: BTreeMap::new(),
            additional_fields: true,
            conditionals: Vec::new(),
        }
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, schema: ZiFieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    pub fn closed(mut self) -> Self {
        self.additional_fields = false;
        self
    }

    pub fn conditional(mut self, rule: ZiConditionalRule) -> Self {
        self.conditionals.push(rule);
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ZiError::schema(format!("invalid schema: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ZiError::schema(format!("cannot read schema {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Parses field paths and patterns once.
    pub fn compile(&self) -> Result<ZiCompiledSchema> {
        let required = compile_required(&self.required)?;
        let fields = compile_fields(&self.fields)?;

        let known_top_level = if self.additional_fields {
            None
        } else {
            let mut known = HashSet::new();
            let conditional_paths = self
                .conditionals
                .iter()
                .flat_map(|rule| rule.then_required.iter().chain(rule.then_fields.keys()));
            for path in self.required.iter().chain(self.fields.keys()).chain(conditional_paths) {
                let parsed = ZiFieldPath::parse(path)?;
                if let Some(first) = parsed.as_dotted().split('.').next() {
                    known.insert(first.to_string());
                }
            }
            Some(known)
        };

        let mut conditionals = Vec::with_capacity(self.conditionals.len());
        for (i, rule) in self.conditionals.iter().enumerate() {
            let field = ZiFieldPath::parse(&rule.when.field)?;
            let name = rule
                .name
                .clone()
                .unwrap_or_else(|| format!("conditional[{i}] {}", field.as_dotted()));
            conditionals.push(ZiCompiledConditional {
                name,
                field,
                equals: rule.when.equals.clone(),
                required: compile_required(&rule.then_required)?,
                fields: compile_fields(&rule.then_fields)?,
            });
        }

        Ok(ZiCompiledSchema {
            table: self.table.clone(),
            required,
            fields,
            known_top_level,
            conditionals,
        })
    }
}

fn compile_required(names: &[String]) -> Result<Vec<(String, ZiFieldPath)>> {
    names
        .iter()
        .map(|name| Ok((name.clone(), ZiFieldPath::parse(name)?)))
        .collect()
}

fn compile_fields(fields: &BTreeMap<String, ZiFieldSchema>) -> Result<Vec<ZiCompiledField>> {
    let mut compiled = Vec::with_capacity(fields.len());
    for (name, schema) in fields {
        let pattern = match &schema.pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| {
                ZiError::schema(format!("field '{name}': invalid pattern '{p}': {e}"))
            })?),
            None => None,
        };
        if let (Some(min), Some(max)) = (schema.minimum, schema.maximum) {
            if min > max {
                return Err(ZiError::schema(format!("field '{name}': minimum exceeds maximum")));
            }
        }
        compiled.push(ZiCompiledField {
            name: name.clone(),
            path: ZiFieldPath::parse(name)?,
            schema: schema.clone(),
            pattern,
        });
    }
    Ok(compiled)
}

/// One finding produced by a schema check.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiSchemaFinding {
    pub kind: ZiValidationKind,
    pub rule: String,
    pub message: String,
}

impl ZiSchemaFinding {
    pub fn new(kind: ZiValidationKind, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Whether the finding makes the payload unfit for semantic rules.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self.kind,
            ZiValidationKind::Structural | ZiValidationKind::MissingRequired | ZiValidationKind::DataType
        )
    }
}

#[derive(Clone, Debug)]
struct ZiCompiledField {
    name: String,
    path: ZiFieldPath,
    schema: ZiFieldSchema,
    pattern: Option<Regex>,
}

#[derive(Clone, Debug)]
struct ZiCompiledConditional {
    name: String,
    field: ZiFieldPath,
    equals: Value,
    required: Vec<(String, ZiFieldPath)>,
    fields: Vec<ZiCompiledField>,
}

#[derive(Clone, Debug)]
pub struct ZiCompiledSchema {
    table: String,
    required: Vec<(String, ZiFieldPath)>,
    fields: Vec<ZiCompiledField>,
    known_top_level: Option<HashSet<String>>,
    conditionals: Vec<ZiCompiledConditional>,
}

impl ZiCompiledSchema {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Checks one payload. Findings come out in phase order: structural,
    /// required, types, constraints, conditionals.
    pub fn check(&self, payload: &Value) -> Vec<ZiSchemaFinding> {
        let Value::Object(map) = payload else {
            return vec![ZiSchemaFinding::new(
                ZiValidationKind::Structural,
                "payload",
                format!("payload must be an object, found {}", describe(payload)),
            )];
        };

        let mut findings = Vec::new();
        if let Some(known) = &self.known_top_level {
            for name in map.keys() {
                if !known.contains(name) {
                    findings.push(ZiSchemaFinding::new(
                        ZiValidationKind::Structural,
                        name.clone(),
                        format!("unknown field '{name}'"),
                    ));
                }
            }
        }

        for (name, path) in &self.required {
            if is_missing(path.resolve(payload)) {
                findings.push(ZiSchemaFinding::new(
                    ZiValidationKind::MissingRequired,
                    name.clone(),
                    format!("required field '{name}' is missing"),
                ));
            }
        }

        let mut types = Vec::new();
        let mut constraints = Vec::new();
        for field in &self.fields {
            check_field(field, payload, &mut types, &mut constraints);
        }
        findings.extend(types);
        findings.extend(constraints);

        for rule in &self.conditionals {
            if rule.field.resolve(payload) != Some(&rule.equals) {
                continue;
            }
            let context = format!("when {} = {}", rule.field.as_dotted(), rule.equals);
            for (name, path) in &rule.required {
                if is_missing(path.resolve(payload)) {
                    findings.push(ZiSchemaFinding::new(
                        ZiValidationKind::Conditional,
                        rule.name.clone(),
                        format!("{context}: field '{name}' is required"),
                    ));
                }
            }
            let mut nested = Vec::new();
            for field in &rule.fields {
                let mut constraint_findings = Vec::new();
                check_field(field, payload, &mut nested, &mut constraint_findings);
                nested.extend(constraint_findings);
            }
            findings.extend(nested.into_iter().map(|f| {
                ZiSchemaFinding::new(
                    ZiValidationKind::Conditional,
                    rule.name.clone(),
                    format!("{context}: {}", f.message),
                )
            }));
        }

        findings
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn check_field(
    field: &ZiCompiledField,
    payload: &Value,
    types: &mut Vec<ZiSchemaFinding>,
    constraints: &mut Vec<ZiSchemaFinding>,
) {
    let Some(value) = field.path.resolve(payload) else {
        return;
    };
    let schema = &field.schema;
    let name = &field.name;

    if value.is_null() {
        if !schema.nullable && schema.field_type != ZiFieldType::Any {
            types.push(ZiSchemaFinding::new(
                ZiValidationKind::DataType,
                name.clone(),
                format!("field '{name}' may not be null"),
            ));
        }
        return;
    }
    if !schema.field_type.matches(value) {
        types.push(ZiSchemaFinding::new(
            ZiValidationKind::DataType,
            name.clone(),
            format!(
                "field '{name}' expected {:?}, found {}",
                schema.field_type,
                describe(value)
            ),
        ));
        return;
    }

    if let (Some(pattern), Some(text)) = (&field.pattern, value.as_str()) {
        if !pattern.is_match(text) {
            constraints.push(ZiSchemaFinding::new(
                ZiValidationKind::Pattern,
                name.clone(),
                format!("field '{name}' value '{text}' does not match '{}'", pattern.as_str()),
            ));
        }
    }

    if let Some(number) = value.as_f64() {
        if schema.minimum.map(|min| number < min).unwrap_or(false)
            || schema.maximum.map(|max| number > max).unwrap_or(false)
        {
            constraints.push(ZiSchemaFinding::new(
                ZiValidationKind::Range,
                name.clone(),
                format!(
                    "field '{name}' value {number} outside [{}, {}]",
                    bound(schema.minimum),
                    bound(schema.maximum)
                ),
            ));
        }
    }

    let length = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    };
    if let Some(length) = length {
        if schema.min_length.map(|min| length < min).unwrap_or(false)
            || schema.max_length.map(|max| length > max).unwrap_or(false)
        {
            constraints.push(ZiSchemaFinding::new(
                ZiValidationKind::Range,
                name.clone(),
                format!("field '{name}' length {length} out of bounds"),
            ));
        }
    }

    if !schema.allowed.is_empty() && !schema.allowed.contains(value) {
        constraints.push(ZiSchemaFinding::new(
            ZiValidationKind::Enum,
            name.clone(),
            format!("field '{name}' value {value} is not an allowed value"),
        ));
    }
}

fn bound(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
