// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::constants::{HEADER_SIZE, MAGIC_BYTE, MAX_PAYLOAD_SIZE, PACKET_SIZE};
use crate::error::{ModuleError, Result};
use std::fmt;

/// Identifiers for outgoing module commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    Ls = 0x50,
    Cd = 0x51,
    Pwd = 0x52,
    Rm = 0x53,
    Mkdir = 0x54,
    Touch = 0x55,
    Cat = 0x56,
    Open = 0x57,
    Write = 0x58,
    Close = 0x59,
    FormatFilesystem = 0x5A,
    FlashRemaining = 0x5B,
    ChooseImage = 0x5C,
    WriteDisplay = 0x5D,
    SetTime = 0x5E,
    LsNext = 0x60,
    LsAll = 0x61,
    SetAnimation = 0x71,
    SetSpeed = 0x72,
    SetBrightness = 0x74,
    SetColorHs = 0x75,
    GetLightingState = 0x76,
}

impl From<CommandId> for u8 {
    fn from(val: CommandId) -> Self {
        val as u8
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#04x})", self, *self as u8)
    }
}

/// Status byte leading every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    ImageAlreadyExists,
    ImageFlashFull,
    ImageWidthOutOfBounds,
    ImageHeightOutOfBounds,
    ImageNameInUse,
    ImageNotFound,
    ImageNotOpen,
    ImagePacketIdError,
    FlashRemaining,
    MoreEntries,
    InvalidCommand,
    Unknown(u8),
}

impl StatusCode {
    pub fn code(&self) -> u8 {
        match self {
            StatusCode::Success => 0x00,
            StatusCode::ImageAlreadyExists => 0xE1,
            StatusCode::ImageFlashFull => 0xE2,
            StatusCode::ImageWidthOutOfBounds => 0xE3,
            StatusCode::ImageHeightOutOfBounds => 0xE4,
            StatusCode::ImageNameInUse => 0xE5,
            StatusCode::ImageNotFound => 0xE6,
            StatusCode::ImageNotOpen => 0xE7,
            StatusCode::ImagePacketIdError => 0xE8,
            StatusCode::FlashRemaining => 0xE9,
            StatusCode::MoreEntries => 0xEA,
            StatusCode::InvalidCommand => 0xEF,
            StatusCode::Unknown(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == StatusCode::Success
    }
}

impl From<u8> for StatusCode {
    fn from(val: u8) -> Self {
        match val {
            0x00 => StatusCode::Success,
            0xE1 => StatusCode::ImageAlreadyExists,
            0xE2 => StatusCode::ImageFlashFull,
            0xE3 => StatusCode::ImageWidthOutOfBounds,
            0xE4 => StatusCode::ImageHeightOutOfBounds,
            0xE5 => StatusCode::ImageNameInUse,
            0xE6 => StatusCode::ImageNotFound,
            0xE7 => StatusCode::ImageNotOpen,
            0xE8 => StatusCode::ImagePacketIdError,
            0xE9 => StatusCode::FlashRemaining,
            0xEA => StatusCode::MoreEntries,
            0xEF => StatusCode::InvalidCommand,
            other => StatusCode::Unknown(other),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Unknown(code) => write!(f, "Unknown ({:#04x})", code),
            other => write!(f, "{:?} ({:#04x})", other, other.code()),
        }
    }
}

/// Outbound 32-byte command packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    command: CommandId,
    sequence_id: u32,
    payload: Vec<u8>,
}

impl Packet {
    /// Fails when the payload does not fit into one packet
    pub fn new(command: CommandId, sequence_id: u32, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ModuleError::ProtocolViolation(format!(
                "payload of {} bytes exceeds {} bytes",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self {
            command,
            sequence_id,
            payload: payload.to_vec(),
        })
    }

    pub fn command(&self) -> CommandId {
        self.command
    }

    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Wire representation: magic, command, LE sequence id, zero-padded payload
    pub fn to_buffer(&self) -> [u8; PACKET_SIZE] {
        let mut buffer = [0u8; PACKET_SIZE];
        buffer[0] = MAGIC_BYTE;
        buffer[1] = self.command.into();
        buffer[2..HEADER_SIZE].copy_from_slice(&self.sequence_id.to_le_bytes());
        buffer[HEADER_SIZE..HEADER_SIZE + self.payload.len()].copy_from_slice(&self.payload);
        buffer
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet {{ command: {}, sequence: {}, payload: {} bytes }}",
            self.command,
            self.sequence_id,
            self.payload.len()
        )
    }
}

/// Inbound response: status byte followed by the response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        let (status, payload) = buffer.split_first().ok_or_else(|| {
            ModuleError::ProtocolViolation("empty response report".to_string())
        })?;

        Ok(Self {
            status: StatusCode::from(*status),
            payload: payload.to_vec(),
        })
    }

    /// Stand-in used when the module never answered
    pub fn no_answer() -> Self {
        Self {
            status: StatusCode::InvalidCommand,
            payload: Vec::new(),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Response {{ status: {}, payload: {} bytes }}",
            self.status,
            self.payload.len()
        )
    }
}
