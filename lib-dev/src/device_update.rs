// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::cdc::BulkChannel;
use crate::constants::{
    ANIMATED_IMAGE_EXTENSION, DISPLAY_HEIGHT, DISPLAY_WIDTH, MAX_IMAGE_NAME_LEN,
    STATIC_IMAGE_EXTENSION,
};
use crate::error::{ModuleError, Result};
use crate::filesystem::FilesystemClient;
use crate::hid_device::ReportTransport;
use crate::image_codec::{encode_animated_rgb565, encode_image, gif_frames, load_image};
use crate::records::FileRecord;
use image::ImageFormat;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Display payload ready to be pushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub frames: usize,
}

impl EncodedImage {
    pub fn is_animated(&self) -> bool {
        self.frames > 1
    }
}

/// Name under which an image is stored on the module.
///
/// Only `[A-Za-z0-9_]` survives, truncated to 50 characters.
pub fn image_file_name(base: &str, animated: bool) -> String {
    let mut name: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(MAX_IMAGE_NAME_LEN)
        .collect();

    if name.is_empty() {
        name.push_str("image");
    }

    let extension = if animated {
        ANIMATED_IMAGE_EXTENSION
    } else {
        STATIC_IMAGE_EXTENSION
    };
    format!("{}.{}", name, extension)
}

/// Encode an image file for the display.
///
/// GIFs with more than one frame become animations; anything else is
/// encoded as a single frame.
pub fn encode_image_file(bytes: &[u8]) -> Result<EncodedImage> {
    if image::guess_format(bytes).ok() == Some(ImageFormat::Gif) {
        let animation = gif_frames(bytes)?;
        if animation.frames.len() > 1 {
            let data = encode_animated_rgb565(&animation, DISPLAY_WIDTH, DISPLAY_HEIGHT);
            return Ok(EncodedImage {
                data,
                frames: animation.frames.len(),
            });
        }
    }

    let image = load_image(bytes)?;
    Ok(EncodedImage {
        data: encode_image(&image, DISPLAY_WIDTH, DISPLAY_HEIGHT),
        frames: 1,
    })
}

/// Encode an image file and push it over the bulk channel.
///
/// Returns the name the file was stored under.
pub async fn push_image(bulk: &BulkChannel, base_name: &str, bytes: &[u8]) -> Result<String> {
    if !bulk.is_connected().await {
        return Err(ModuleError::TransportUnavailable(
            "bulk port is not connected".to_string(),
        ));
    }

    let encoded = encode_image_file(bytes)?;
    let filename = image_file_name(base_name, encoded.is_animated());
    info!(
        "Pushing {} ({} frames, {} bytes)",
        filename,
        encoded.frames,
        encoded.data.len()
    );

    bulk.send_file(&filename, &encoded.data).await?;
    Ok(filename)
}

/// Pull every file stored on the module
pub async fn dump_all_files<T: ReportTransport>(
    fs: &FilesystemClient<'_, T>,
    bulk: &BulkChannel,
) -> Result<Vec<FileRecord>> {
    fs.ls_all(bulk).await
}

/// Write dumped records below `dir`, returning the written paths.
///
/// Records whose names are not plain file names are skipped.
pub async fn save_records(dir: &Path, records: &[FileRecord]) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::with_capacity(records.len());

    for record in records {
        let Some(name) = Path::new(&record.filename).file_name() else {
            warn!("Skipping record with unusable name '{}'", record.filename);
            continue;
        };
        if name.to_str() != Some(record.filename.as_str()) {
            warn!("Skipping record with unusable name '{}'", record.filename);
            continue;
        }

        let path = dir.join(name);
        tokio::fs::write(&path, &record.data).await?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}
