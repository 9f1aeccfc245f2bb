// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # Toffee Module Communication Library
//!
//! This library talks to the Toffee keyboard accessory module, including:
//! - Command/response packets over the raw report channel
//! - Directory listing and lighting control
//! - File push and multi-file dump over the USB serial channel
//! - RGB565 encoding of still images and animations for the display

pub mod cdc;
pub mod config;
pub mod constants;
pub mod device_update;
pub mod error;
pub mod filesystem;
pub mod hid_commands;
pub mod hid_device;
pub mod image_codec;
pub mod lighting;
pub mod records;

// Re-export commonly used types
pub use cdc::{BulkChannel, BulkConnector, BulkIo, ReceivedFiles, SerialConnector, StreamEnd};
pub use config::{DeviceInfo, ProtocolTimings};
pub use constants::*;
pub use device_update::{
    dump_all_files, encode_image_file, image_file_name, push_image, save_records, EncodedImage,
};
pub use error::{ModuleError, Result};
pub use filesystem::FilesystemClient;
pub use hid_commands::{CommandId, Packet, Response, StatusCode};
pub use hid_device::{
    ControlDriver, HidReportTransport, ReportDevice, ReportIo, ReportTransport, WriteAck,
};
pub use image_codec::{
    decode_rgb565, encode_animated_rgb565, encode_image, encode_rgb565, gif_frames, raw_to_png,
    Animation, AnimationFrame, Disposal,
};
pub use lighting::{LightingClient, LightingState};
pub use records::{DecoderState, FileRecord, RecordDecoder};
