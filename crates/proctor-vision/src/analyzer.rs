//! Frame analyzer
//!
//! Classifies one decoded frame into a violation verdict using geometric
//! heuristics over detected face regions. First matching check wins;
//! later checks are skipped once an earlier one fires:
//!
//! 1. zero regions -> no face
//! 2. multiple regions -> multiple people
//! 3. one region: undersized face, then off-center face

use crate::config::VisionConfig;
use crate::detector::{CascadeDetector, FaceRegion, RegionDetector};
use crate::verdict::{CameraViolation, FrameVerdict};
use crate::VisionError;
use frame_ingest::ExamFrame;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-frame violation analyzer
pub struct FrameAnalyzer {
    config: VisionConfig,
    detector: Arc<dyn RegionDetector>,
}

impl FrameAnalyzer {
    /// Create an analyzer with the shipped cascade detector
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let detector = Arc::new(CascadeDetector::new(&config.detector)?);
        Ok(Self { config, detector })
    }

    /// Create an analyzer over an externally supplied detector
    pub fn with_detector(config: VisionConfig, detector: Arc<dyn RegionDetector>) -> Self {
        Self { config, detector }
    }

    /// Analyze one decoded frame.
    ///
    /// Detector failure never propagates: the frame yields a clear verdict
    /// flagged `analysis_unavailable`, and the policy layer decides whether
    /// repeated failures count against the attempt.
    pub fn analyze(&self, frame: &ExamFrame) -> FrameVerdict {
        let gray = frame.to_grayscale();

        match self.detector.detect(&gray, frame.width, frame.height) {
            Ok(regions) => {
                debug!(
                    faces = regions.len(),
                    width = frame.width,
                    height = frame.height,
                    "frame analyzed"
                );
                classify(&regions, frame.width, frame.height, &self.config)
            }
            Err(e) => {
                warn!("Face detection failed, frame not classified: {}", e);
                FrameVerdict::unavailable()
            }
        }
    }
}

/// Classify detected regions against frame geometry.
pub fn classify(
    regions: &[FaceRegion],
    frame_width: u32,
    frame_height: u32,
    config: &VisionConfig,
) -> FrameVerdict {
    let (w, h) = (frame_width as f32, frame_height as f32);

    if regions.is_empty() {
        return FrameVerdict::violation(
            CameraViolation::NoFaceDetected,
            config.no_face_confidence,
            "No face detected in frame",
            0,
        );
    }

    if regions.len() > 1 {
        let confidence = (regions.len() as f32 * config.multi_face_confidence_step).min(1.0);
        return FrameVerdict::violation(
            CameraViolation::MultipleFacesDetected,
            confidence,
            format!("Multiple faces detected: {}", regions.len()),
            regions.len(),
        );
    }

    let face = &regions[0];
    if (face.width as f32) < w * config.min_face_ratio
        || (face.height as f32) < h * config.min_face_ratio
    {
        return FrameVerdict::violation(
            CameraViolation::FaceTooSmall,
            config.small_face_confidence,
            "Face appears too small - possible attention issue",
            1,
        );
    }

    let (cx, cy) = face.center();
    if (cx - w / 2.0).abs() > w * config.center_tolerance
        || (cy - h / 2.0).abs() > h * config.center_tolerance
    {
        return FrameVerdict::violation(
            CameraViolation::FaceNotCentered,
            config.off_center_confidence,
            "Face not properly centered in frame",
            1,
        );
    }

    FrameVerdict::clear(1)
}
