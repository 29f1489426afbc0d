//! Exam Frame Ingestion
//!
//! Decodes webcam frames uploaded by the exam client:
//! - base64 data-URL payloads (browser canvas captures)
//! - JPEG/PNG decode into raw RGB frames
//! - upload sanity limits (the submission cadence is client-controlled)

pub mod frame;

pub use frame::{decode_data_url, decode_frame, ExamFrame, MAX_FRAME_PIXELS};

use thiserror::Error;

/// Frame ingestion error types
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Empty frame payload")]
    Empty,

    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Frame too large: {width}x{height} exceeds {max_pixels} pixels")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
}
