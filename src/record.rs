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

//! # ZiShard Record Module
//!
//! A [`ZiRecord`] is the unit handed to the export engine by extraction
//! collaborators: a stable key that is unique within its logical table and an
//! opaque JSON payload. The engine never inspects the payload while writing;
//! only the validation engine looks inside it, through [`ZiFieldPath`].
//!
//! ## Usage Example
//!
//! ```rust
//! use zishard::record::{ZiFieldPath, ZiRecord};
//! use serde_json::json;
//!
//! let record = ZiRecord::new("asset:0001", json!({"kind": "texture", "size": {"w": 64}}));
//! let width = ZiFieldPath::parse("size.w").unwrap();
//! assert_eq!(width.resolve(&record.payload), Some(&json!(64)));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, ZiError};

/// Fundamental data unit exported by ZiShard.
///
/// Records are serialized as a single JSON line `{"key":…,"payload":…}`.
/// Keys are compared ordinally (byte order), which is what `String`'s `Ord`
/// implements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZiRecord {
    /// Stable key, unique within the record's logical table.
    pub key: String,

    /// Opaque structured payload.
    pub payload: Value,
}

impl ZiRecord {
    /// Constructs a record from a key and payload.
    #[allow(non_snake_case)]
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        ZiRecord {
            key: key.into(),
            payload,
        }
    }

    /// Serializes the record as one JSON line without the trailing newline.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a record back from a single serialized line.
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Convenience alias for working on batches of records.
pub type ZiRecordBatch = Vec<ZiRecord>;

/// Dotted path into a record payload, e.g. `target.key`.
///
/// A leading `payload.` segment is accepted and ignored so that paths written
/// against the serialized line shape resolve the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZiFieldPath {
    segments: Vec<String>,
}

impl ZiFieldPath {
    /// Parses a dotted field path.
    #[allow(non_snake_case)]
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments: Vec<String> = path
            .split('.')
            .map(|segment| segment.trim().to_string())
            .filter(|segment| !segment.is_empty())
            .collect();

        if segments.first().map(|s| s == "payload").unwrap_or(false) {
            segments.remove(0);
        }

        if segments.is_empty() {
            return Err(ZiError::validation(format!(
                "field path '{path}' may not be empty"
            )));
        }

        Ok(Self { segments })
    }

    /// Resolves the path against a payload value.
    pub fn resolve<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        let mut current = payload;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns the path in its dotted form.
    pub fn as_dotted(&self) -> String {
        self.segments.join(".")
    }
}
