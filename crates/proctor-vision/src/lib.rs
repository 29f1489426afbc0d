//! Webcam Proctoring Vision
//!
//! Per-frame analysis of exam webcam captures:
//! - Face presence detection
//! - Multiple-person detection
//! - Face size and centering heuristics (attention monitoring)
//!
//! The analyzer is stateless and side-effect-free; frames from any number
//! of attempts may be analyzed concurrently. Only the resulting verdict's
//! application to an attempt's violation count requires serialization, and
//! that lives in `violation-engine`.

pub mod analyzer;
pub mod config;
pub mod detector;
pub mod verdict;

pub use analyzer::{classify, FrameAnalyzer};
pub use config::{DetectorConfig, VisionConfig};
pub use detector::{CascadeDetector, FaceRegion, RegionDetector};
pub use verdict::{CameraViolation, FrameVerdict};

use thiserror::Error;

/// Vision error types
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}
