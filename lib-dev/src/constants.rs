// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

/// Size of every packet on the report channel, in both directions
pub const PACKET_SIZE: usize = 32;

/// First byte of every outbound packet
pub const MAGIC_BYTE: u8 = 0x09;

/// Magic (1) + command (1) + sequence id (4)
pub const HEADER_SIZE: usize = 6;

/// Maximum payload carried by one outbound packet
pub const MAX_PAYLOAD_SIZE: usize = PACKET_SIZE - HEADER_SIZE;

/// Report ID prepended to writes; the module firmware uses unnumbered reports
pub const HID_REPORT_ID: u8 = 0;

/// Usage page of the raw report interface exposed by the keyboard firmware
pub const RAW_HID_USAGE_PAGE: u16 = 0xFF60;

/// Capacity of the inbound report queue fed by the reader thread
pub const INBOUND_QUEUE_SIZE: usize = 64;

/// Poll interval of the blocking HID reader thread in milliseconds
pub const READ_POLL_INTERVAL_MS: i32 = 100;

/// Time to wait for a response packet in milliseconds
pub const COMMAND_TIMEOUT_MS: u64 = 1500;

/// Time between triggering LS_ALL and reading the bulk stream in milliseconds
pub const LS_ALL_SETTLE_MS: u64 = 500;

/// Pause after the filename and after the length prefix of an outbound file
pub const SEND_SETTLE_MS: u64 = 100;

/// Idle time after which an inbound file stream is considered finished
pub const RECEIVE_IDLE_TIMEOUT_MS: u64 = 3000;

/// Size of the data writes of an outbound file
pub const BULK_CHUNK_SIZE: usize = 4096;

/// Baud rate requested when opening the bulk port (ignored by CDC ACM)
pub const BULK_BAUD_RATE: u32 = 115_200;

/// Size of a single read from the bulk port
pub const BULK_READ_SIZE: usize = 4096;

/// Width and height of the module display
pub const DISPLAY_WIDTH: u32 = 128;
pub const DISPLAY_HEIGHT: u32 = 128;

/// Bytes per RGB565 pixel
pub const BYTES_PER_PIXEL: usize = 2;

/// Maximum length of the base name of a pushed image
pub const MAX_IMAGE_NAME_LEN: usize = 50;

/// Extension of a single static frame
pub const STATIC_IMAGE_EXTENSION: &str = "raw";

/// Extension of concatenated animation frames
pub const ANIMATED_IMAGE_EXTENSION: &str = "araw";
