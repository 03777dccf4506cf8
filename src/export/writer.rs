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

//! # Shard Writer Module
//!
//! Streams one table's records, already in global key order, into a sequence
//! of size- or count-bounded shard files.
//!
//! Each shard is written to a hidden temporary file and renamed into place
//! when it is finalized, so a crash or I/O error never leaves a truncated
//! shard under its final name. The content checksum is computed on the fly
//! over the bytes that reach the file, i.e. over the compressed stream.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::{ZiCodecOptions, ZiCompression, ZiEncoder};
use crate::config::{ZiExportConfig, ZiShardThresholds};
use crate::errors::{Result, ZiError};
use crate::export::index::{ZiKeyIndexEntry, ZiKeyLocation};
use crate::export::table_slug;
use crate::record::ZiRecord;

/// Metadata of one finalized shard file. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZiShardDescriptor {
    pub table: String,
    /// Path relative to the dataset root, `/`-separated.
    pub path: String,
    pub record_count: u64,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    pub compression: ZiCompression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_key: Option<String>,
    /// `blake3:<hex>` over the file bytes.
    pub checksum: String,
}

/// Settings for one table's writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZiShardWriterConfig {
    pub compression: ZiCompression,
    pub codec: ZiCodecOptions,
    pub thresholds: ZiShardThresholds,
    pub build_index: bool,
    /// Shard sub-directory under the dataset root.
    pub data_dir: String,
}

impl Default for ZiShardWriterConfig {
    fn default() -> Self {
        Self {
            compression: ZiCompression::None,
            codec: ZiCodecOptions::default(),
            thresholds: ZiShardThresholds::default(),
            build_index: false,
            data_dir: "data".to_string(),
        }
    }
}

impl ZiShardWriterConfig {
    /// Derives the writer settings for `table` from the run configuration.
    pub fn for_table(config: &ZiExportConfig, table: &str) -> Self {
        Self {
            compression: config.compression,
            codec: config.codec_options(),
            thresholds: config.thresholds_for(table),
            build_index: config.build_indexes,
            data_dir: config.data_dir.clone(),
        }
    }
}

/// Everything a finished writer produced.
#[derive(Clone, Debug, Default)]
pub struct ZiShardWriteOutcome {
    pub shards: Vec<ZiShardDescriptor>,
    /// Unsorted index candidates, in write order.
    pub index_entries: Vec<ZiKeyIndexEntry>,
}

impl ZiShardWriteOutcome {
    pub fn record_count(&self) -> u64 {
        self.shards.iter().map(|s| s.record_count).sum()
    }
}

/// Byte sink that counts and hashes everything passing through it.
pub struct ZiChecksumWriter<W: Write> {
    inner: W,
    hasher: blake3::Hasher,
    bytes: u64,
}

impl<W: Write> ZiChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            bytes: 0,
        }
    }

    /// Returns the inner sink, the byte count and the `blake3:` checksum.
    pub fn into_parts(self) -> (W, u64, String) {
        let checksum = format!("blake3:{}", self.hasher.finalize().to_hex());
        (self.inner, self.bytes, checksum)
    }
}

impl<W: Write> Write for ZiChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct ZiActiveShard {
    relative_path: String,
    final_path: PathBuf,
    temp_path: PathBuf,
    encoder: ZiEncoder<ZiChecksumWriter<BufWriter<File>>>,
    record_count: u64,
    uncompressed_bytes: u64,
    first_key: String,
    last_key: String,
}

/// Single-writer shard producer for one logical table.
pub struct ZiShardWriter {
    table: String,
    root: PathBuf,
    config: ZiShardWriterConfig,
    active: Option<ZiActiveShard>,
    next_index: usize,
    shards: Vec<ZiShardDescriptor>,
    index_entries: Vec<ZiKeyIndexEntry>,
    previous_key: Option<String>,
}

impl ZiShardWriter {
    /// Creates a writer; no file is touched until the first record arrives.
    #[allow(non_snake_case)]
    pub fn new(table: impl Into<String>, root: impl AsRef<Path>, config: ZiShardWriterConfig) -> Result<Self> {
        config.compression.ensure_available()?;
        if config.thresholds.max_records_per_shard == 0 || config.thresholds.max_bytes_per_shard == 0 {
            return Err(ZiError::config("shard thresholds must be positive"));
        }
        Ok(Self {
            table: table.into(),
            root: root.as_ref().to_path_buf(),
            config,
            active: None,
            next_index: 0,
            shards: Vec::new(),
            index_entries: Vec::new(),
            previous_key: None,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Shards finalized so far.
    pub fn finalized_shards(&self) -> &[ZiShardDescriptor] {
        &self.shards
    }

    /// Relative path of the shard with the given ordinal.
    pub fn shard_relative_path(&self, index: usize) -> String {
        let slug = table_slug(&self.table);
        format!(
            "{}/{}/{}-{:05}.ndjson{}",
            self.config.data_dir,
            slug,
            slug,
            index,
            self.config.compression.extension()
        )
    }

    /// Appends one record to the active shard, rotating as needed.
    pub fn write_record(&mut self, record: &ZiRecord) -> Result<()> {
        if let Some(previous) = &self.previous_key {
            if record.key < *previous {
                return Err(ZiError::KeyOrder {
                    table: self.table.clone(),
                    previous: previous.clone(),
                    key: record.key.clone(),
                });
            }
        }

        let line = record.to_line()?;
        let line_bytes = line.len() as u64 + 1;
        let thresholds = self.config.thresholds;

        // An oversized record gets a shard of its own.
        if line_bytes > thresholds.max_bytes_per_shard
            && self.active.as_ref().map(|s| s.record_count > 0).unwrap_or(false)
        {
            self.finalize_active()?;
        }
        if self.active.is_none() {
            self.open_shard(&record.key)?;
        }

        let shard = self
            .active
            .as_mut()
            .ok_or_else(|| ZiError::internal("no active shard after open"))?;
        let offset = shard.uncompressed_bytes;
        shard.encoder.write_all(&line)?;
        shard.encoder.write_all(b"\n")?;
        shard.record_count += 1;
        shard.uncompressed_bytes += line_bytes;
        shard.last_key.clone_from(&record.key);

        if self.config.build_index {
            let location = if self.config.compression.is_compressed() {
                ZiKeyLocation::LineNumber {
                    line: shard.record_count,
                }
            } else {
                ZiKeyLocation::ByteOffset {
                    offset,
                    length: line.len() as u64,
                }
            };
            self.index_entries.push(ZiKeyIndexEntry {
                key: record.key.clone(),
                shard: shard.relative_path.clone(),
                location,
            });
        }

        let rotate = shard.record_count >= thresholds.max_records_per_shard
            || shard.uncompressed_bytes >= thresholds.max_bytes_per_shard;
        self.previous_key = Some(record.key.clone());
        if rotate {
            self.finalize_active()?;
        }
        Ok(())
    }

    /// Writes every record of an iterator.
    pub fn write_records<'a, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a ZiRecord>,
    {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Finalizes the last shard and returns everything written.
    ///
    /// If the last shard cannot be sealed the whole table is discarded, as
    /// with [`Self::abort`].
    pub fn finish(mut self) -> Result<ZiShardWriteOutcome> {
        if let Err(err) = self.finalize_active() {
            self.abort();
            return Err(err);
        }
        Ok(ZiShardWriteOutcome {
            shards: std::mem::take(&mut self.shards),
            index_entries: std::mem::take(&mut self.index_entries),
        })
    }

    /// Discards the table's output: the in-flight temporary file and every
    /// shard already finalized.
    pub fn abort(mut self) {
        if let Some(shard) = self.active.take() {
            let temp_path = shard.temp_path.clone();
            drop(shard);
            remove_quietly(&temp_path);
        }
        for descriptor in &self.shards {
            remove_quietly(&self.root.join(&descriptor.path));
        }
        log::warn!(
            "aborted export of table '{}', removed {} finalized shard(s)",
            self.table,
            self.shards.len()
        );
        self.shards.clear();
        self.index_entries.clear();
    }

    fn open_shard(&mut self, first_key: &str) -> Result<()> {
        let relative_path = self.shard_relative_path(self.next_index);
        let final_path = self.root.join(&relative_path);
        let parent = final_path
            .parent()
            .ok_or_else(|| ZiError::internal("shard path has no parent"))?
            .to_path_buf();
        fs::create_dir_all(&parent)?;
        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("shard");
        let temp_path = parent.join(format!(".{file_name}.tmp"));

        let file = File::create(&temp_path)?;
        let sink = ZiChecksumWriter::new(BufWriter::new(file));
        let encoder = match self.config.compression.encoder(sink, &self.config.codec) {
            Ok(encoder) => encoder,
            Err(err) => {
                remove_quietly(&temp_path);
                return Err(err);
            }
        };

        log::debug!("table '{}': opened shard {}", self.table, relative_path);
        self.next_index += 1;
        self.active = Some(ZiActiveShard {
            relative_path,
            final_path,
            temp_path,
            encoder,
            record_count: 0,
            uncompressed_bytes: 0,
            first_key: first_key.to_string(),
            last_key: first_key.to_string(),
        });
        Ok(())
    }

    fn finalize_active(&mut self) -> Result<()> {
        let Some(shard) = self.active.take() else {
            return Ok(());
        };
        let temp_path = shard.temp_path.clone();
        match self.seal(shard) {
            Ok(descriptor) => {
                log::debug!(
                    "table '{}': finalized {} ({} records, {} bytes)",
                    self.table,
                    descriptor.path,
                    descriptor.record_count,
                    descriptor.compressed_bytes
                );
                self.shards.push(descriptor);
                Ok(())
            }
            Err(err) => {
                remove_quietly(&temp_path);
                Err(err)
            }
        }
    }

    fn seal(&self, shard: ZiActiveShard) -> Result<ZiShardDescriptor> {
        let output = shard.encoder.finish()?;
        let (buffered, compressed_bytes, checksum) = output.sink.into_parts();
        let file = buffered.into_inner().map_err(|e| ZiError::from(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&shard.temp_path, &shard.final_path)?;

        let frame_size = match self.config.compression {
            ZiCompression::ZstdSeekable => Some(self.config.codec.frame_size),
            _ => None,
        };
        Ok(ZiShardDescriptor {
            table: self.table.clone(),
            path: shard.relative_path,
            record_count: shard.record_count,
            uncompressed_bytes: shard.uncompressed_bytes,
            compressed_bytes,
            compression: self.config.compression,
            frame_size,
            frame_count: output.frames.map(|f| f.len()),
            first_key: Some(shard.first_key),
            last_key: Some(shard.last_key),
            checksum,
        })
    }
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("could not remove {}: {}", path.display(), err);
        }
    }
}
