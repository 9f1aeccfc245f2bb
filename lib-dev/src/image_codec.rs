// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Pixel codec for the module display.
//!
//! The display takes raw RGB565 pixels, big endian, row major, without any
//! header. Animations are the per-frame buffers concatenated; the firmware
//! splits them by the fixed frame size.

use crate::constants::BYTES_PER_PIXEL;
use crate::error::{ModuleError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use log::debug;
use std::io::Cursor;

/// What happens to a frame's region once the frame has been shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposal {
    /// Leave the composited pixels in place
    #[default]
    None,
    /// Clear the frame's rectangle to transparent
    ClearRegion,
    /// Restore the canvas to its state before the frame was drawn
    RestoreSnapshot,
}

impl Disposal {
    /// Map a GIF disposal code. Unknown codes keep the canvas.
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Disposal::ClearRegion,
            3 => Disposal::RestoreSnapshot,
            _ => Disposal::None,
        }
    }
}

impl From<gif::DisposalMethod> for Disposal {
    fn from(method: gif::DisposalMethod) -> Self {
        match method {
            gif::DisposalMethod::Background => Disposal::ClearRegion,
            gif::DisposalMethod::Previous => Disposal::RestoreSnapshot,
            _ => Disposal::None,
        }
    }
}

/// One animation frame: a patch drawn at an offset of the canvas
#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub patch: RgbaImage,
    pub left: u32,
    pub top: u32,
    pub disposal: Disposal,
}

impl AnimationFrame {
    pub fn new(patch: RgbaImage, left: u32, top: u32, disposal: Disposal) -> Self {
        Self {
            patch,
            left,
            top,
            disposal,
        }
    }
}

/// Frames sharing one logical canvas
#[derive(Debug, Clone)]
pub struct Animation {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<AnimationFrame>,
}

fn expected_len(width: u32, height: u32, bytes_per_pixel: usize) -> usize {
    width as usize * height as usize * bytes_per_pixel
}

fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r5 = u16::from(r >> 3);
    let g6 = u16::from(g >> 2);
    let b5 = u16::from(b >> 3);
    (r5 << 11) | (g6 << 5) | b5
}

/// Encode RGBA pixels to big-endian RGB565, dropping alpha
pub fn encode_rgb565(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = expected_len(width, height, 4);
    if rgba.len() != expected {
        return Err(ModuleError::ProtocolViolation(format!(
            "expected {} RGBA bytes for {}x{}, got {}",
            expected,
            width,
            height,
            rgba.len()
        )));
    }

    let mut output = Vec::with_capacity(expected_len(width, height, BYTES_PER_PIXEL));
    for pixel in rgba.chunks_exact(4) {
        output.extend_from_slice(&pack_rgb565(pixel[0], pixel[1], pixel[2]).to_be_bytes());
    }
    Ok(output)
}

/// Decode big-endian RGB565 to opaque RGBA, replicating the high bits
pub fn decode_rgb565(buffer: &[u8], width: u32, height: u32) -> Result<RgbaImage> {
    let expected = expected_len(width, height, BYTES_PER_PIXEL);
    if buffer.len() != expected {
        return Err(ModuleError::ProtocolViolation(format!(
            "expected {} bytes for {}x{}, got {}",
            expected,
            width,
            height,
            buffer.len()
        )));
    }

    let mut image = RgbaImage::new(width, height);
    for (pixel, bytes) in image.pixels_mut().zip(buffer.chunks_exact(BYTES_PER_PIXEL)) {
        let value = u16::from_be_bytes([bytes[0], bytes[1]]);
        let r5 = ((value >> 11) & 0x1F) as u8;
        let g6 = ((value >> 5) & 0x3F) as u8;
        let b5 = (value & 0x1F) as u8;

        *pixel = Rgba([
            (r5 << 3) | (r5 >> 2),
            (g6 << 2) | (g6 >> 4),
            (b5 << 3) | (b5 >> 2),
            255,
        ]);
    }
    Ok(image)
}

/// Re-encode a raw display buffer as PNG
pub fn raw_to_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let image = decode_rgb565(buffer, width, height)?;
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ModuleError::ProtocolViolation(e.to_string()))?;
    Ok(png)
}

/// Decode an image file of any supported format
pub fn load_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| ModuleError::ProtocolViolation(e.to_string()))
}

/// Resize to the target and composite over black
fn render(canvas: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let mut working = if canvas.dimensions() == (width, height) {
        canvas.clone()
    } else {
        imageops::resize(canvas, width, height, FilterType::Triangle)
    };

    for pixel in working.pixels_mut() {
        let alpha = u16::from(pixel[3]);
        for channel in 0..3 {
            pixel[channel] = (u16::from(pixel[channel]) * alpha / 255) as u8;
        }
        pixel[3] = 255;
    }
    working
}

fn encode_pixels(image: &RgbaImage) -> Vec<u8> {
    image
        .pixels()
        .flat_map(|pixel| pack_rgb565(pixel[0], pixel[1], pixel[2]).to_be_bytes())
        .collect()
}

/// Encode a still image for a `width`x`height` display
pub fn encode_image(image: &DynamicImage, width: u32, height: u32) -> Vec<u8> {
    encode_pixels(&render(&image.to_rgba8(), width, height))
}

fn clear_region(canvas: &mut RgbaImage, left: u32, top: u32, width: u32, height: u32) {
    let right = left.saturating_add(width).min(canvas.width());
    let bottom = top.saturating_add(height).min(canvas.height());

    for y in top..bottom {
        for x in left..right {
            canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
}

/// Flatten an animation into concatenated `width`x`height` RGB565 frames
pub fn encode_animated_rgb565(animation: &Animation, width: u32, height: u32) -> Vec<u8> {
    let frame_len = expected_len(width, height, BYTES_PER_PIXEL);
    let mut output = Vec::with_capacity(frame_len * animation.frames.len());
    let mut canvas = RgbaImage::new(animation.width, animation.height);

    for (index, frame) in animation.frames.iter().enumerate() {
        let snapshot = (frame.disposal == Disposal::RestoreSnapshot).then(|| canvas.clone());

        imageops::overlay(&mut canvas, &frame.patch, i64::from(frame.left), i64::from(frame.top));
        output.extend(encode_pixels(&render(&canvas, width, height)));

        match frame.disposal {
            Disposal::None => {}
            Disposal::ClearRegion => {
                let (patch_width, patch_height) = frame.patch.dimensions();
                clear_region(&mut canvas, frame.left, frame.top, patch_width, patch_height);
            }
            Disposal::RestoreSnapshot => {
                if let Some(snapshot) = snapshot {
                    canvas = snapshot;
                }
            }
        }

        debug!("Encoded frame {} ({:?})", index, frame.disposal);
    }

    output
}

/// Extract the raw patches of a GIF with their offsets and disposal modes
pub fn gif_frames(bytes: &[u8]) -> Result<Animation> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options
        .read_info(bytes)
        .map_err(|e| ModuleError::ProtocolViolation(e.to_string()))?;

    let width = u32::from(decoder.width());
    let height = u32::from(decoder.height());
    let mut frames = Vec::new();

    while let Some(frame) = decoder
        .read_next_frame()
        .map_err(|e| ModuleError::ProtocolViolation(e.to_string()))?
    {
        let patch = RgbaImage::from_raw(
            u32::from(frame.width),
            u32::from(frame.height),
            frame.buffer.to_vec(),
        )
        .ok_or_else(|| ModuleError::ProtocolViolation("GIF frame size mismatch".to_string()))?;

        frames.push(AnimationFrame::new(
            patch,
            u32::from(frame.left),
            u32::from(frame.top),
            frame.dispose.into(),
        ));
    }

    debug!("GIF {}x{} with {} frames", width, height, frames.len());
    Ok(Animation {
        width,
        height,
        frames,
    })
}
