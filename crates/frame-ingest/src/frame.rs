//! Decoded frame type and payload decoding

use crate::FrameError;
use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

/// Upper bound on decoded frame size. Uploads beyond 4K are rejected
/// before pixel data is materialized further down the pipeline.
pub const MAX_FRAME_PIXELS: u64 = 3840 * 2160;

/// Decoded RGB webcam frame
#[derive(Debug, Clone)]
pub struct ExamFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Client-reported capture timestamp (milliseconds)
    pub timestamp_ms: i64,
}

impl ExamFrame {
    /// Create a frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ms: i64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms,
        }
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> Vec<u8> {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = (pixel[0] as f32 * 0.299
                + pixel[1] as f32 * 0.587
                + pixel[2] as f32 * 0.114) as u8;
            gray.push(y);
        }
        gray
    }
}

/// Strip an optional `data:image/...;base64,` header and decode the payload.
///
/// Browser `canvas.toDataURL()` captures arrive with the header; raw base64
/// bodies are accepted as well.
pub fn decode_data_url(payload: &str) -> Result<Vec<u8>, FrameError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }

    let body = match trimmed.split_once(',') {
        Some((_, b)) => b,
        None => trimmed,
    };

    general_purpose::STANDARD
        .decode(body)
        .map_err(|e| FrameError::Base64(e.to_string()))
}

/// Decode encoded image bytes (JPEG/PNG) into an RGB frame.
pub fn decode_frame(bytes: &[u8], timestamp_ms: i64) -> Result<ExamFrame, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }

    let img = image::load_from_memory(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    if width as u64 * height as u64 > MAX_FRAME_PIXELS {
        return Err(FrameError::TooLarge {
            width,
            height,
            max_pixels: MAX_FRAME_PIXELS,
        });
    }

    let rgb = img.to_rgb8();
    debug!(width, height, "frame decoded");
    Ok(ExamFrame {
        data: rgb.into_raw(),
        width,
        height,
        timestamp_ms,
    })
}
