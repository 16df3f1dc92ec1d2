//! Raw frame buffers, decoding and aspect-preserving scaling

use crate::error::VisionError;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest frame accepted anywhere in the pipeline (8K)
const MAX_DIMENSION: u32 = 7680;

/// Dimensions and pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel: 1 (gray), 3 (RGB) or 4 (RGBA)
    pub channels: u8,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::rgb(640, 480)
    }
}

impl FrameFormat {
    pub const fn rgb(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: 3,
        }
    }

    /// Buffer size in bytes, `None` on overflow
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.channels as usize)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("Frame dimensions must be non-zero".to_string());
        }
        if self.width > MAX_DIMENSION || self.height > 4320 {
            return Err("Frame dimensions too large (max 8K)".to_string());
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(format!("Unsupported channel count: {}", self.channels));
        }
        if self.byte_len().is_none() {
            return Err("Frame size would overflow".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Target size of the presentation surface for one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl Default for RenderSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Result<Self, VisionError> {
        let size = Self { width, height };
        size.validate().map_err(VisionError::Config)?;
        Ok(size)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("Render size must be non-zero".to_string());
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err("Render size too large".to_string());
        }
        Ok(())
    }
}

/// Immutable row-major pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    format: FrameFormat,
    data: Bytes,
}

impl FrameBuffer {
    /// Wrap `data`, which must hold exactly one frame of `format`
    pub fn new(format: FrameFormat, data: impl Into<Bytes>) -> Result<Self, VisionError> {
        let data = data.into();
        let expected = format
            .byte_len()
            .ok_or_else(|| VisionError::Config(format!("Frame format {} overflows", format)))?;
        if data.len() != expected {
            return Err(VisionError::ProtocolDecode {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { format, data })
    }

    /// Black RGB canvas
    pub fn blank(size: RenderSize) -> Self {
        let format = FrameFormat::rgb(size.width, size.height);
        let len = format.byte_len().unwrap_or(0);
        Self {
            format,
            data: Bytes::from(vec![0u8; len]),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// RGB value at (x, y) of an RGB frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if self.format.channels != 3 || x >= self.format.width || y >= self.format.height {
            return None;
        }
        let offset = (y as usize * self.format.width as usize + x as usize) * 3;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    fn to_rgb_image(&self) -> Result<RgbImage, VisionError> {
        if self.format.channels != 3 {
            return Err(VisionError::Image(format!(
                "Expected an RGB frame, got {} channels",
                self.format.channels
            )));
        }
        RgbImage::from_raw(self.format.width, self.format.height, self.data.to_vec())
            .ok_or_else(|| VisionError::Image("Frame buffer too small for its format".to_string()))
    }

    fn from_rgb_image(image: RgbImage) -> Self {
        let format = FrameFormat::rgb(image.width(), image.height());
        Self {
            format,
            data: Bytes::from(image.into_raw()),
        }
    }
}

/// Decode a relay response into an RGB frame.
///
/// The payload must be exactly one frame of `format`; gray and RGBA payloads
/// are expanded or flattened to RGB.
pub fn decode_frame(format: FrameFormat, payload: Bytes) -> Result<FrameBuffer, VisionError> {
    let frame = FrameBuffer::new(format, payload)?;
    match format.channels {
        3 => Ok(frame),
        1 => {
            let rgb: Vec<u8> = frame.data.iter().flat_map(|&v| [v, v, v]).collect();
            FrameBuffer::new(FrameFormat::rgb(format.width, format.height), rgb)
        }
        4 => {
            let rgb: Vec<u8> = frame
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            FrameBuffer::new(FrameFormat::rgb(format.width, format.height), rgb)
        }
        n => Err(VisionError::Image(format!("Unsupported channel count: {}", n))),
    }
}

/// Size of `(width, height)` scaled to fit inside `target` keeping its aspect ratio
pub fn fit_within(width: u32, height: u32, target: RenderSize) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let scale = f64::min(
        target.width as f64 / width as f64,
        target.height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, target.width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, target.height);
    (w, h)
}

/// Scale an RGB frame to fit `target`, centered on a black canvas of exactly `target`
pub fn scale_to_fit(frame: &FrameBuffer, target: RenderSize) -> Result<FrameBuffer, VisionError> {
    target.validate().map_err(VisionError::Config)?;

    if frame.width() == target.width && frame.height() == target.height {
        return Ok(frame.clone());
    }

    let source = frame.to_rgb_image()?;
    let (w, h) = fit_within(frame.width(), frame.height(), target);
    let resized = imageops::resize(&source, w, h, FilterType::Triangle);

    let mut canvas = RgbImage::new(target.width, target.height);
    let x = (target.width - w) / 2;
    let y = (target.height - h) / 2;
    imageops::replace(&mut canvas, &resized, x as i64, y as i64);

    Ok(FrameBuffer::from_rgb_image(canvas))
}
