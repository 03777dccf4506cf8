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

//! Reading shards back: line iteration through the right decoder, byte-range
//! reads for index lookups, and checksum verification.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec::ZiCompression;
#[cfg(feature = "compression")]
use crate::codec::ZiSeekableReader;
use crate::errors::{Result, ZiError};
use crate::export::index::{ZiKeyIndexEntry, ZiKeyLocation};
use crate::export::manifest::compute_file_checksum;
use crate::export::writer::ZiShardDescriptor;
use crate::record::ZiRecord;

/// Iterates `(line_number, record)` pairs of one shard. Line numbers are
/// 1-based and count blank lines, which are otherwise skipped.
pub struct ZiShardReader {
    lines: Lines<BufReader<Box<dyn Read>>>,
    line: u64,
}

impl ZiShardReader {
    pub fn open(root: impl AsRef<Path>, shard: &ZiShardDescriptor) -> Result<Self> {
        Self::open_path(root.as_ref().join(&shard.path), shard.compression)
    }

    #[allow(non_snake_case)]
    pub fn open_path(path: impl AsRef<Path>, compression: ZiCompression) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let source: Box<dyn Read> = match compression {
            #[cfg(feature = "compression")]
            ZiCompression::ZstdSeekable => Box::new(ZiSeekableReader::new(BufReader::new(file))?),
            other => Box::new(other.decoder(BufReader::new(file))?),
        };
        Ok(Self {
            lines: BufReader::new(source).lines(),
            line: 0,
        })
    }

    /// Reads every record, failing on the first malformed line.
    pub fn read_all(self) -> Result<Vec<ZiRecord>> {
        self.map(|(_, record)| record).collect()
    }
}

impl Iterator for ZiShardReader {
    type Item = (u64, Result<ZiRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = self.lines.next()?;
            self.line += 1;
            match text {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => return Some((self.line, ZiRecord::from_line(&text))),
                Err(err) => return Some((self.line, Err(err.into()))),
            }
        }
    }
}

/// Reads `length` decompressed bytes starting at `offset`.
///
/// Only plain and seekable shards support this without decoding the stream
/// from the start.
pub fn read_range(root: impl AsRef<Path>, shard: &ZiShardDescriptor, offset: u64, length: u64) -> Result<Vec<u8>> {
    let path = root.as_ref().join(&shard.path);
    match shard.compression {
        ZiCompression::None => {
            let mut file = File::open(&path)?;
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; length as usize];
            file.read_exact(&mut buf)?;
            Ok(buf)
        }
        #[cfg(feature = "compression")]
        ZiCompression::ZstdSeekable => ZiSeekableReader::open(&path)?.read_range(offset, length),
        other => Err(ZiError::validation(format!(
            "codec '{}' does not support byte-range reads",
            other
        ))),
    }
}

/// Fetches the record an index entry points at.
pub fn read_indexed(root: impl AsRef<Path>, shard: &ZiShardDescriptor, entry: &ZiKeyIndexEntry) -> Result<ZiRecord> {
    let root = root.as_ref();
    match entry.location {
        ZiKeyLocation::ByteOffset { offset, length } => {
            let bytes = read_range(root, shard, offset, length)?;
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| ZiError::validation(format!("record bytes are not UTF-8: {e}")))?;
            ZiRecord::from_line(text)
        }
        ZiKeyLocation::LineNumber { line } => {
            for (number, record) in ZiShardReader::open(root, shard)? {
                if number == line {
                    return record;
                }
            }
            Err(ZiError::validation(format!(
                "line {} not found in {}",
                line, shard.path
            )))
        }
    }
}

/// Recomputes the shard checksum and compares it with the descriptor.
pub fn verify_checksum(root: impl AsRef<Path>, shard: &ZiShardDescriptor) -> Result<bool> {
    let actual = compute_file_checksum(root.as_ref().join(&shard.path))?;
    Ok(actual == shard.checksum)
}
