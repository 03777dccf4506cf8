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

//! # Compression Codec Module
//!
//! Pluggable byte-stream transforms applied to whole shard files.
//!
//! ## Codecs
//!
//! - **None**: identity
//! - **Gzip**: one continuous gzip member per shard
//! - **Zstd**: one continuous zstd frame per shard
//! - **ZstdSeekable**: the uncompressed stream is cut into fixed-size frames
//!   that are compressed independently, followed by a seek table in the zstd
//!   seekable format. Any single frame can be decompressed without touching
//!   the frames before it.
//!
//! Gzip and zstd require the `compression` feature. Asking for them without it
//! is a configuration error, raised before anything is written.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

#[cfg(feature = "compression")]
use std::fs::File;
#[cfg(feature = "compression")]
use std::io::{BufReader, Cursor, Seek, SeekFrom};
#[cfg(feature = "compression")]
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Result, ZiError};

/// Default uncompressed size of one seekable frame (2 MiB).
pub const DEFAULT_SEEKABLE_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Default zstd compression level.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

#[cfg(feature = "compression")]
const SKIPPABLE_MAGIC: u32 = 0x184D_2A5E;
#[cfg(feature = "compression")]
const SEEKABLE_MAGIC: u32 = 0x8F92_EAB1;
#[cfg(feature = "compression")]
const SEEK_FOOTER_LEN: usize = 9;
#[cfg(feature = "compression")]
const SKIPPABLE_HEADER_LEN: usize = 8;
#[cfg(feature = "compression")]
const CHECKSUM_FLAG: u8 = 0x80;

/// Compression applied to a shard file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ZiCompression {
    /// Plain newline-delimited text.
    #[default]
    None,
    /// Single continuous gzip stream.
    Gzip,
    /// Single continuous zstd stream.
    Zstd,
    /// Independently compressed zstd frames plus a seek table.
    ZstdSeekable,
}

impl ZiCompression {
    /// Parses a codec name. Unknown names are configuration errors.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(ZiCompression::None),
            "gzip" | "gz" => Ok(ZiCompression::Gzip),
            "zstd" | "zst" => Ok(ZiCompression::Zstd),
            "zstd-seekable" | "zstd_seekable" | "seekable" => Ok(ZiCompression::ZstdSeekable),
            other => Err(ZiError::config(format!(
                "unsupported compression codec '{other}'"
            ))),
        }
    }

    /// Canonical codec name as written to manifests.
    pub fn name(&self) -> &'static str {
        match self {
            ZiCompression::None => "none",
            ZiCompression::Gzip => "gzip",
            ZiCompression::Zstd => "zstd",
            ZiCompression::ZstdSeekable => "zstd-seekable",
        }
    }

    /// File extension appended after `.ndjson`.
    pub fn extension(&self) -> &'static str {
        match self {
            ZiCompression::None => "",
            ZiCompression::Gzip => ".gz",
            ZiCompression::Zstd | ZiCompression::ZstdSeekable => ".zst",
        }
    }

    /// Whether the bytes on disk differ from the serialized lines.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, ZiCompression::None)
    }

    /// Fails when the codec was compiled out.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_compressed() && !cfg!(feature = "compression") {
            return Err(ZiError::config(format!(
                "compression codec '{}' requires the 'compression' feature",
                self.name()
            )));
        }
        Ok(())
    }

    /// Wraps a raw byte sink with this codec.
    pub fn encoder<W: Write>(self, sink: W, options: &ZiCodecOptions) -> Result<ZiEncoder<W>> {
        self.ensure_available()?;
        match self {
            ZiCompression::None => Ok(ZiEncoder::Plain(sink)),
            #[cfg(feature = "compression")]
            ZiCompression::Gzip => Ok(ZiEncoder::Gzip(flate2::write::GzEncoder::new(
                sink,
                flate2::Compression::default(),
            ))),
            #[cfg(feature = "compression")]
            ZiCompression::Zstd => {
                let encoder = zstd::stream::write::Encoder::new(sink, options.level)?;
                Ok(ZiEncoder::Zstd(encoder))
            }
            #[cfg(feature = "compression")]
            ZiCompression::ZstdSeekable => Ok(ZiEncoder::Seekable(ZiSeekableEncoder::new(
                sink,
                options.frame_size,
                options.level,
            )?)),
            #[cfg(not(feature = "compression"))]
            _ => {
                let _ = options;
                Err(ZiError::internal("codec availability already checked"))
            }
        }
    }

    /// Wraps a raw byte source with the matching decompressor.
    ///
    /// Seekable shards are plain zstd frames followed by a skippable frame, so
    /// the streaming zstd decoder reads them front to back. Use
    /// [`ZiSeekableReader`] for frame-level access.
    pub fn decoder<R: Read>(self, source: R) -> Result<ZiDecoder<R>> {
        self.ensure_available()?;
        match self {
            ZiCompression::None => Ok(ZiDecoder::Plain(source)),
            #[cfg(feature = "compression")]
            ZiCompression::Gzip => Ok(ZiDecoder::Gzip(flate2::read::MultiGzDecoder::new(source))),
            #[cfg(feature = "compression")]
            ZiCompression::Zstd | ZiCompression::ZstdSeekable => Ok(ZiDecoder::Zstd(
                zstd::stream::read::Decoder::new(source)?,
            )),
            #[cfg(not(feature = "compression"))]
            _ => Err(ZiError::internal("codec availability already checked")),
        }
    }
}

impl fmt::Display for ZiCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ZiCompression {
    type Err = ZiError;

    fn from_str(s: &str) -> Result<Self> {
        ZiCompression::from_name(s)
    }
}

impl Serialize for ZiCompression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ZiCompression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ZiCompression::from_name(&name).map_err(serde::de::Error::custom)
    }
}

/// Tuning knobs shared by the encoders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZiCodecOptions {
    /// zstd level; gzip always uses the flate2 default level.
    pub level: i32,
    /// Uncompressed bytes per seekable frame.
    pub frame_size: usize,
}

impl Default for ZiCodecOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_ZSTD_LEVEL,
            frame_size: DEFAULT_SEEKABLE_FRAME_SIZE,
        }
    }
}

/// Codec-wrapped byte sink.
pub enum ZiEncoder<W: Write> {
    Plain(W),
    #[cfg(feature = "compression")]
    Gzip(flate2::write::GzEncoder<W>),
    #[cfg(feature = "compression")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
    #[cfg(feature = "compression")]
    Seekable(ZiSeekableEncoder<W>),
}

/// What is left once an encoder has been finished.
#[derive(Debug)]
pub struct ZiEncoderOutput<W> {
    /// The raw sink, with every compressed byte written to it.
    pub sink: W,
    /// Frame table for seekable output.
    pub frames: Option<Vec<ZiSeekFrame>>,
}

impl<W: Write> ZiEncoder<W> {
    /// Flushes the codec trailer and hands back the raw sink.
    pub fn finish(self) -> Result<ZiEncoderOutput<W>> {
        match self {
            ZiEncoder::Plain(mut sink) => {
                sink.flush()?;
                Ok(ZiEncoderOutput { sink, frames: None })
            }
            #[cfg(feature = "compression")]
            ZiEncoder::Gzip(encoder) => Ok(ZiEncoderOutput {
                sink: encoder.finish()?,
                frames: None,
            }),
            #[cfg(feature = "compression")]
            ZiEncoder::Zstd(encoder) => Ok(ZiEncoderOutput {
                sink: encoder.finish()?,
                frames: None,
            }),
            #[cfg(feature = "compression")]
            ZiEncoder::Seekable(encoder) => {
                let (sink, frames) = encoder.finish()?;
                Ok(ZiEncoderOutput {
                    sink,
                    frames: Some(frames),
                })
            }
        }
    }
}

impl<W: Write> Write for ZiEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ZiEncoder::Plain(sink) => sink.write(buf),
            #[cfg(feature = "compression")]
            ZiEncoder::Gzip(encoder) => encoder.write(buf),
            #[cfg(feature = "compression")]
            ZiEncoder::Zstd(encoder) => encoder.write(buf),
            #[cfg(feature = "compression")]
            ZiEncoder::Seekable(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ZiEncoder::Plain(sink) => sink.flush(),
            #[cfg(feature = "compression")]
            ZiEncoder::Gzip(encoder) => encoder.flush(),
            #[cfg(feature = "compression")]
            ZiEncoder::Zstd(encoder) => encoder.flush(),
            #[cfg(feature = "compression")]
            ZiEncoder::Seekable(encoder) => encoder.flush(),
        }
    }
}

/// Codec-wrapped byte source.
pub enum ZiDecoder<R: Read> {
    Plain(R),
    #[cfg(feature = "compression")]
    Gzip(flate2::read::MultiGzDecoder<R>),
    #[cfg(feature = "compression")]
    Zstd(zstd::stream::read::Decoder<'static, BufReader<R>>),
}

impl<R: Read> Read for ZiDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ZiDecoder::Plain(source) => source.read(buf),
            #[cfg(feature = "compression")]
            ZiDecoder::Gzip(decoder) => decoder.read(buf),
            #[cfg(feature = "compression")]
            ZiDecoder::Zstd(decoder) => decoder.read(buf),
        }
    }
}

/// Compresses a byte slice in memory.
pub fn compress(codec: ZiCompression, data: &[u8], options: &ZiCodecOptions) -> Result<Vec<u8>> {
    let mut encoder = codec.encoder(Vec::new(), options)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?.sink)
}

/// Decompresses a byte slice in memory.
pub fn decompress(codec: ZiCompression, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match codec {
        #[cfg(feature = "compression")]
        ZiCompression::ZstdSeekable => {
            let mut reader = ZiSeekableReader::new(Cursor::new(data))?;
            reader.read_to_end(&mut out)?;
        }
        _ => {
            let mut decoder = codec.decoder(data)?;
            decoder.read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

/// One entry of a seek table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZiSeekFrame {
    pub compressed_size: u32,
    pub decompressed_size: u32,
}

/// Seek table entry with absolute offsets resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZiSeekEntry {
    pub compressed_offset: u64,
    pub compressed_size: u32,
    pub decompressed_offset: u64,
    pub decompressed_size: u32,
}

/// Parsed seek table of a seekable shard.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZiSeekTable {
    entries: Vec<ZiSeekEntry>,
}

impl ZiSeekTable {
    /// Resolves offsets for a list of frames laid out back to back.
    pub fn from_frames(frames: &[ZiSeekFrame]) -> Self {
        let mut entries = Vec::with_capacity(frames.len());
        let mut compressed_offset = 0u64;
        let mut decompressed_offset = 0u64;
        for frame in frames {
            entries.push(ZiSeekEntry {
                compressed_offset,
                compressed_size: frame.compressed_size,
                decompressed_offset,
                decompressed_size: frame.decompressed_size,
            });
            compressed_offset += u64::from(frame.compressed_size);
            decompressed_offset += u64::from(frame.decompressed_size);
        }
        Self { entries }
    }

    pub fn frame_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&ZiSeekEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[ZiSeekEntry] {
        &self.entries
    }

    /// Total uncompressed length covered by the table.
    pub fn decompressed_len(&self) -> u64 {
        self.entries
            .last()
            .map(|e| e.decompressed_offset + u64::from(e.decompressed_size))
            .unwrap_or(0)
    }

    /// Index of the frame holding the given uncompressed offset.
    pub fn frame_for_offset(&self, offset: u64) -> Option<usize> {
        if offset >= self.decompressed_len() {
            return None;
        }
        let idx = self
            .entries
            .partition_point(|e| e.decompressed_offset + u64::from(e.decompressed_size) <= offset);
        Some(idx)
    }
}

#[cfg(feature = "compression")]
fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(feature = "compression")]
impl ZiSeekTable {
    /// Serializes frames as a zstd skippable frame holding the seek table.
    pub fn encode(frames: &[ZiSeekFrame]) -> Vec<u8> {
        let payload_len = frames.len() * 8 + SEEK_FOOTER_LEN;
        let mut out = Vec::with_capacity(SKIPPABLE_HEADER_LEN + payload_len);
        out.extend_from_slice(&SKIPPABLE_MAGIC.to_le_bytes());
        out.extend_from_slice(&(payload_len as u32).to_le_bytes());
        for frame in frames {
            out.extend_from_slice(&frame.compressed_size.to_le_bytes());
            out.extend_from_slice(&frame.decompressed_size.to_le_bytes());
        }
        out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        out.push(0);
        out.extend_from_slice(&SEEKABLE_MAGIC.to_le_bytes());
        out
    }

    /// Parses the seek table from bytes that end at end-of-file.
    pub fn parse(tail: &[u8]) -> Result<Self> {
        let len = tail.len();
        if len < SKIPPABLE_HEADER_LEN + SEEK_FOOTER_LEN {
            return Err(ZiError::validation("seek table truncated"));
        }
        if read_u32_le(tail, len - 4) != SEEKABLE_MAGIC {
            return Err(ZiError::validation("missing seekable magic number"));
        }
        let descriptor = tail[len - 5];
        let entry_len = if descriptor & CHECKSUM_FLAG != 0 { 12 } else { 8 };
        let frame_count = read_u32_le(tail, len - SEEK_FOOTER_LEN) as usize;
        let payload_len = frame_count * entry_len + SEEK_FOOTER_LEN;
        let table_len = SKIPPABLE_HEADER_LEN + payload_len;
        if len < table_len {
            return Err(ZiError::validation(format!(
                "seek table needs {table_len} bytes, only {len} available"
            )));
        }

        let start = len - table_len;
        if read_u32_le(tail, start) != SKIPPABLE_MAGIC
            || read_u32_le(tail, start + 4) as usize != payload_len
        {
            return Err(ZiError::validation("malformed seek table header"));
        }

        let frames: Vec<ZiSeekFrame> = (0..frame_count)
            .map(|i| {
                let at = start + SKIPPABLE_HEADER_LEN + i * entry_len;
                ZiSeekFrame {
                    compressed_size: read_u32_le(tail, at),
                    decompressed_size: read_u32_le(tail, at + 4),
                }
            })
            .collect();
        Ok(Self::from_frames(&frames))
    }
}

/// Writer that cuts its input into independently compressed zstd frames.
#[cfg(feature = "compression")]
pub struct ZiSeekableEncoder<W: Write> {
    inner: W,
    frame_size: usize,
    level: i32,
    pending: Vec<u8>,
    frames: Vec<ZiSeekFrame>,
}

#[cfg(feature = "compression")]
impl<W: Write> ZiSeekableEncoder<W> {
    pub fn new(inner: W, frame_size: usize, level: i32) -> Result<Self> {
        if frame_size == 0 || frame_size > u32::MAX as usize {
            return Err(ZiError::config(format!(
                "seekable frame size {frame_size} out of range"
            )));
        }
        Ok(Self {
            inner,
            frame_size,
            level,
            pending: Vec::with_capacity(frame_size.min(DEFAULT_SEEKABLE_FRAME_SIZE)),
            frames: Vec::new(),
        })
    }

    fn emit_frame(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let compressed = zstd::bulk::compress(&self.pending, self.level)?;
        let compressed_size = u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame exceeds 4 GiB"))?;
        self.inner.write_all(&compressed)?;
        self.frames.push(ZiSeekFrame {
            compressed_size,
            decompressed_size: self.pending.len() as u32,
        });
        self.pending.clear();
        Ok(())
    }

    /// Emits the last partial frame and the seek table.
    pub fn finish(mut self) -> io::Result<(W, Vec<ZiSeekFrame>)> {
        self.emit_frame()?;
        self.inner.write_all(&ZiSeekTable::encode(&self.frames))?;
        self.inner.flush()?;
        Ok((self.inner, self.frames))
    }
}

#[cfg(feature = "compression")]
impl<W: Write> Write for ZiSeekableEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let room = self.frame_size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.frame_size {
                self.emit_frame()?;
            }
        }
        Ok(buf.len())
    }

    // Frames are cut by size only; flushing never shortens a frame.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Random-access reader over a seekable zstd stream.
///
/// Also implements [`Read`], decoding frame after frame from the start.
#[cfg(feature = "compression")]
pub struct ZiSeekableReader<R: Read + Seek> {
    source: R,
    table: ZiSeekTable,
    next_frame: usize,
    buffer: Vec<u8>,
    position: usize,
}

#[cfg(feature = "compression")]
impl ZiSeekableReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

#[cfg(feature = "compression")]
impl<R: Read + Seek> ZiSeekableReader<R> {
    /// Reads the seek table from the end of the source.
    pub fn new(mut source: R) -> Result<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        if len < (SKIPPABLE_HEADER_LEN + SEEK_FOOTER_LEN) as u64 {
            return Err(ZiError::validation("stream too short for a seek table"));
        }

        let mut footer = [0u8; SEEK_FOOTER_LEN];
        source.seek(SeekFrom::End(-(SEEK_FOOTER_LEN as i64)))?;
        source.read_exact(&mut footer)?;
        let entry_len = if footer[4] & CHECKSUM_FLAG != 0 { 12 } else { 8 };
        let frame_count = read_u32_le(&footer, 0) as u64;
        let table_len =
            SKIPPABLE_HEADER_LEN as u64 + frame_count * entry_len + SEEK_FOOTER_LEN as u64;
        if table_len > len {
            return Err(ZiError::validation("seek table larger than stream"));
        }

        let mut tail = vec![0u8; table_len as usize];
        source.seek(SeekFrom::Start(len - table_len))?;
        source.read_exact(&mut tail)?;
        let table = ZiSeekTable::parse(&tail)?;

        Ok(Self {
            source,
            table,
            next_frame: 0,
            buffer: Vec::new(),
            position: 0,
        })
    }

    pub fn table(&self) -> &ZiSeekTable {
        &self.table
    }

    pub fn frame_count(&self) -> usize {
        self.table.frame_count()
    }

    /// Decompresses one frame without touching any other frame.
    pub fn read_frame(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = *self.table.entry(index).ok_or_else(|| {
            ZiError::validation(format!(
                "frame {index} out of range ({} frames)",
                self.table.frame_count()
            ))
        })?;
        let mut compressed = vec![0u8; entry.compressed_size as usize];
        self.source.seek(SeekFrom::Start(entry.compressed_offset))?;
        self.source.read_exact(&mut compressed)?;
        let frame = zstd::bulk::decompress(&compressed, entry.decompressed_size as usize)?;
        if frame.len() != entry.decompressed_size as usize {
            return Err(ZiError::validation(format!(
                "frame {index} decompressed to {} bytes, expected {}",
                frame.len(),
                entry.decompressed_size
            )));
        }
        Ok(frame)
    }

    /// Reads an uncompressed byte range, decoding only the frames it spans.
    pub fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let end = offset + length;
        if end > self.table.decompressed_len() {
            return Err(ZiError::validation(format!(
                "range {offset}..{end} beyond stream length {}",
                self.table.decompressed_len()
            )));
        }
        let mut out = Vec::with_capacity(length as usize);
        if length == 0 {
            return Ok(out);
        }

        let mut index = self
            .table
            .frame_for_offset(offset)
            .ok_or_else(|| ZiError::internal("offset inside stream has no frame"))?;
        while (out.len() as u64) < length {
            let entry = *self
                .table
                .entry(index)
                .ok_or_else(|| ZiError::internal("range ran past last frame"))?;
            let frame = self.read_frame(index)?;
            let from = offset.saturating_sub(entry.decompressed_offset) as usize;
            let wanted = (length - out.len() as u64) as usize;
            let to = (from + wanted).min(frame.len());
            out.extend_from_slice(&frame[from..to]);
            index += 1;
        }
        Ok(out)
    }
}

#[cfg(feature = "compression")]
impl<R: Read + Seek> Read for ZiSeekableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position >= self.buffer.len() {
            if self.next_frame >= self.table.frame_count() {
                return Ok(0);
            }
            self.buffer = self
                .read_frame(self.next_frame)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            self.position = 0;
            self.next_frame += 1;
        }
        let available = &self.buffer[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}
