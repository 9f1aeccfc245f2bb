// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::constants::{
    BULK_CHUNK_SIZE, COMMAND_TIMEOUT_MS, LS_ALL_SETTLE_MS, RAW_HID_USAGE_PAGE,
    RECEIVE_IDLE_TIMEOUT_MS, SEND_SETTLE_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device identification used by both transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Narrows the report channel to one HID interface. `None` accepts the first match.
    #[serde(default = "default_usage_page")]
    pub usage_page: Option<u16>,
}

impl DeviceInfo {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            usage_page: default_usage_page(),
        }
    }

    pub fn with_usage_page(mut self, usage_page: Option<u16>) -> Self {
        self.usage_page = usage_page;
        self
    }
}

fn default_usage_page() -> Option<u16> {
    Some(RAW_HID_USAGE_PAGE)
}

/// Timeouts and settle delays of the wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimings {
    pub command_timeout_ms: u64,
    pub ls_all_settle_ms: u64,
    pub send_settle_ms: u64,
    pub receive_idle_timeout_ms: u64,
    pub bulk_chunk_size: usize,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            command_timeout_ms: COMMAND_TIMEOUT_MS,
            ls_all_settle_ms: LS_ALL_SETTLE_MS,
            send_settle_ms: SEND_SETTLE_MS,
            receive_idle_timeout_ms: RECEIVE_IDLE_TIMEOUT_MS,
            bulk_chunk_size: BULK_CHUNK_SIZE,
        }
    }
}

impl ProtocolTimings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn ls_all_settle(&self) -> Duration {
        Duration::from_millis(self.ls_all_settle_ms)
    }

    pub fn send_settle(&self) -> Duration {
        Duration::from_millis(self.send_settle_ms)
    }

    pub fn receive_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_idle_timeout_ms)
    }
}
