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

//! # ZiShard Error Module
//!
//! This module defines the error types used throughout the export engine.
//!
//! ## Error Categories
//!
//! - **Io**: Filesystem errors while writing shards, indexes or manifests
//! - **Config**: Unsupported codecs or invalid thresholds, raised before any write
//! - **Schema**: Malformed validation schemas
//! - **Validation**: Invalid parameters or inputs handed to the core
//! - **KeyOrder**: A record arrived out of global key order
//! - **Export**: A table export that could not complete
//! - **ValidationAborted**: Fail-fast validation crossed its error threshold
//! - **Serde**: Serialization/deserialization errors
//! - **Internal**: Unexpected internal failures
//!
//! Data-quality findings are never errors: they are collected into a
//! [`ZiValidationReport`](crate::validate::ZiValidationReport). Only fail-fast
//! mode turns them into [`ZiError::ValidationAborted`].
//!
//! ## Usage
//!
//! ```rust
//! use zishard::errors::{Result, ZiError};
//!
//! fn check_threshold(max_records: u64) -> Result<()> {
//!     if max_records == 0 {
//!         return Err(ZiError::config("maxRecordsPerShard must be positive"));
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::ZiValidationKind;

/// Convenience result type used throughout ZiShard.
pub type Result<T> = std::result::Result<T, ZiError>;

/// Canonical error enumeration for ZiShard.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ZiError {
    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Configuration rejected before any write begins.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Errors caused by malformed validation schemas.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Validation errors triggered by invalid parameters or inputs.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A record key sorted before the key written just before it.
    #[error("table '{table}': key '{key}' sorts before previous key '{previous}'")]
    KeyOrder {
        table: String,
        previous: String,
        key: String,
    },

    /// A table export that failed and was rolled back.
    #[error("export of table '{table}' failed: {message}")]
    Export { table: String, message: String },

    /// Fail-fast validation crossed its configured error threshold.
    #[error("validation aborted after {errors} errors ({kind}): {message}")]
    ValidationAborted {
        kind: ZiValidationKind,
        errors: u64,
        message: String,
    },

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for ZiError {
    fn from(err: io::Error) -> Self {
        ZiError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ZiError {
    fn from(err: serde_json::Error) -> Self {
        ZiError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for ZiError {
    fn from(err: serde_yaml::Error) -> Self {
        ZiError::Serde(err.to_string())
    }
}

impl From<regex::Error> for ZiError {
    fn from(err: regex::Error) -> Self {
        ZiError::Schema {
            message: err.to_string(),
        }
    }
}

impl ZiError {
    /// Helper to construct configuration errors.
    pub fn config<T: Into<String>>(message: T) -> Self {
        ZiError::Config {
            message: message.into(),
        }
    }

    /// Helper to construct simple validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        ZiError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct schema errors.
    pub fn schema<T: Into<String>>(message: T) -> Self {
        ZiError::Schema {
            message: message.into(),
        }
    }

    /// Helper to construct table export errors.
    pub fn export(table: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::Export {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        ZiError::Internal(message.into())
    }

    /// Short machine-readable code used in per-table failure results.
    pub fn code(&self) -> &'static str {
        match self {
            ZiError::Io(_) => "io",
            ZiError::Config { .. } => "config",
            ZiError::Schema { .. } => "schema",
            ZiError::Validation { .. } => "validation",
            ZiError::KeyOrder { .. } => "key-order",
            ZiError::Export { .. } => "export",
            ZiError::ValidationAborted { .. } => "validation-aborted",
            ZiError::Serde(_) => "serde",
            ZiError::Internal(_) => "internal",
        }
    }
}
