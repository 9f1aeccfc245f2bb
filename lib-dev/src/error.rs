// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::hid_commands::StatusCode;
use std::time::Duration;

/// Errors that can occur while talking to the module
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// No matching device or port was found, or it could not be opened
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed or undersized response or payload
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The module answered with a failure status
    #[error("Device returned {0}")]
    DeviceError(StatusCode),

    /// I/O failure on an open connection
    #[error("Transport error: {0}")]
    TransportError(String),
}

impl From<std::io::Error> for ModuleError {
    fn from(err: std::io::Error) -> Self {
        ModuleError::TransportError(err.to_string())
    }
}

impl From<hidapi::HidError> for ModuleError {
    fn from(err: hidapi::HidError) -> Self {
        ModuleError::TransportError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ModuleError>;
