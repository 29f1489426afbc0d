//! Vision configuration
//!
//! Every heuristic threshold is configuration, not a literal in the
//! analysis code, so the policy can be tuned and tested in isolation.

use serde::{Deserialize, Serialize};

/// Face-region detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Scale step between successive detection window sizes
    pub scale_factor: f32,

    /// Minimum overlapping raw detections required to accept a region
    pub min_neighbors: u32,

    /// Minimum region side length in original-resolution pixels
    pub min_region_px: u32,

    /// Minimum model confidence for a detection (model path only)
    pub min_confidence: f32,

    /// Optional ONNX face-detection model path
    pub model_path: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_region_px: 30,
            min_confidence: 0.7,
            model_path: None,
        }
    }
}

/// Frame analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Minimum face side length as a fraction of the frame side
    pub min_face_ratio: f32,

    /// Maximum face-center deviation from frame center, as a fraction
    /// of the frame side per axis
    pub center_tolerance: f32,

    /// Confidence reported when no face is found
    pub no_face_confidence: f32,

    /// Confidence reported for an undersized face
    pub small_face_confidence: f32,

    /// Confidence reported for an off-center face
    pub off_center_confidence: f32,

    /// Per-face confidence step for multi-person detections (capped at 1.0)
    pub multi_face_confidence_step: f32,

    /// Detector configuration
    pub detector: DetectorConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            min_face_ratio: 0.15,
            center_tolerance: 0.3,
            no_face_confidence: 0.9,
            small_face_confidence: 0.7,
            off_center_confidence: 0.6,
            multi_face_confidence_step: 0.3,
            detector: DetectorConfig::default(),
        }
    }
}

impl VisionConfig {
    /// Create strict config (tighter framing requirements)
    pub fn strict() -> Self {
        Self {
            min_face_ratio: 0.2,
            center_tolerance: 0.2,
            ..Default::default()
        }
    }

    /// Create lenient config (looser framing requirements)
    pub fn lenient() -> Self {
        Self {
            min_face_ratio: 0.1,
            center_tolerance: 0.4,
            ..Default::default()
        }
    }
}
