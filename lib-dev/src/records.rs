// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Record framing of the bulk stream.
//!
//! A stream is a sequence of records, each made of a UTF-8 filename, a NUL
//! terminator, a little-endian `u32` length and that many payload bytes. A
//! record with an empty filename marks the end of the stream.

use crate::error::{ModuleError, Result};
use bytes::{Buf, Bytes, BytesMut};
use log::debug;
use std::fmt;

/// One file received over the bulk stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub filename: String,
    pub data: Bytes,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Wire form of this record. Fails for payloads of 4 GiB or more.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let length = length_prefix(self.data.len())?;
        let mut buffer = Vec::with_capacity(self.filename.len() + 5 + self.data.len());
        buffer.extend_from_slice(self.filename.as_bytes());
        buffer.push(0);
        buffer.extend_from_slice(&length);
        buffer.extend_from_slice(&self.data);
        Ok(buffer)
    }
}

/// Little-endian length field for a payload of `len` bytes
pub(crate) fn length_prefix(len: usize) -> Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| {
            ModuleError::ProtocolViolation(format!("{} bytes do not fit a u32 length", len))
        })
}

impl fmt::Display for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.filename, self.data.len())
    }
}

/// Parser position within the current record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingTerminator,
    AwaitingLength { filename: String },
    AwaitingPayload { filename: String, length: usize },
    Done,
}

/// Incremental decoder over a growing byte accumulator
#[derive(Debug)]
pub struct RecordDecoder {
    buffer: BytesMut,
    state: DecoderState,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            state: DecoderState::AwaitingTerminator,
        }
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == DecoderState::Done
    }

    /// Bytes received but not yet consumed by a complete field
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append freshly read bytes
    pub fn feed(&mut self, data: &[u8]) {
        if self.is_done() {
            debug!("Ignoring {} bytes after end of stream", data.len());
            return;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Advance as far as the buffered bytes allow.
    ///
    /// Returns the next complete record, or `None` when more bytes are needed
    /// or the end marker has been consumed.
    pub fn next_record(&mut self) -> Option<FileRecord> {
        loop {
            let state = std::mem::replace(&mut self.state, DecoderState::Done);

            match state {
                DecoderState::AwaitingTerminator => {
                    let Some(position) = self.buffer.iter().position(|&b| b == 0) else {
                        self.state = DecoderState::AwaitingTerminator;
                        return None;
                    };

                    let name = self.buffer.split_to(position);
                    self.buffer.advance(1);

                    if name.is_empty() {
                        debug!("End of stream marker received");
                        return None;
                    }

                    let filename = String::from_utf8_lossy(&name).into_owned();
                    debug!("Filename: '{}'", filename);
                    self.state = DecoderState::AwaitingLength { filename };
                }
                DecoderState::AwaitingLength { filename } => {
                    if self.buffer.len() < 4 {
                        self.state = DecoderState::AwaitingLength { filename };
                        return None;
                    }

                    let length = self.buffer.get_u32_le() as usize;
                    debug!(
                        "Expecting {} bytes for '{}', {} already buffered",
                        length,
                        filename,
                        self.buffer.len()
                    );
                    self.state = DecoderState::AwaitingPayload { filename, length };
                }
                DecoderState::AwaitingPayload { filename, length } => {
                    if self.buffer.len() < length {
                        self.state = DecoderState::AwaitingPayload { filename, length };
                        return None;
                    }

                    let data = self.buffer.split_to(length).freeze();
                    self.state = DecoderState::AwaitingTerminator;
                    return Some(FileRecord { filename, data });
                }
                DecoderState::Done => return None,
            }
        }
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}
