//! Frame analysis verdicts

use serde::{Deserialize, Serialize};

/// Camera violation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraViolation {
    /// No face visible in the frame
    NoFaceDetected,

    /// More than one person in the frame
    MultipleFacesDetected,

    /// Face too small (candidate looking away or leaning back)
    FaceTooSmall,

    /// Face off-center (candidate looking off-screen)
    FaceNotCentered,
}

impl CameraViolation {
    /// Wire/storage name of the violation
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraViolation::NoFaceDetected => "no_face_detected",
            CameraViolation::MultipleFacesDetected => "multiple_faces_detected",
            CameraViolation::FaceTooSmall => "face_too_small",
            CameraViolation::FaceNotCentered => "face_not_centered",
        }
    }
}

/// Analysis result for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameVerdict {
    /// Whether a violation was detected
    pub detected: bool,

    /// Violation type (when detected)
    pub kind: Option<CameraViolation>,

    /// Detection confidence (0-1)
    pub confidence: f32,

    /// Human-readable description
    pub message: String,

    /// Number of face regions found
    pub face_count: usize,

    /// The detector itself failed; the verdict carries no signal either way.
    /// Policy decides whether repeated failures count against the attempt.
    pub analysis_unavailable: bool,
}

impl FrameVerdict {
    /// Verdict for a frame with no violation
    pub fn clear(face_count: usize) -> Self {
        Self {
            detected: false,
            kind: None,
            confidence: 0.0,
            message: String::new(),
            face_count,
            analysis_unavailable: false,
        }
    }

    /// Verdict for a detected violation
    pub fn violation(
        kind: CameraViolation,
        confidence: f32,
        message: impl Into<String>,
        face_count: usize,
    ) -> Self {
        Self {
            detected: true,
            kind: Some(kind),
            confidence,
            message: message.into(),
            face_count,
            analysis_unavailable: false,
        }
    }

    /// Verdict for a frame the detector could not analyze
    pub fn unavailable() -> Self {
        Self {
            detected: false,
            kind: None,
            confidence: 0.0,
            message: "Face detection unavailable for this frame".to_string(),
            face_count: 0,
            analysis_unavailable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(CameraViolation::NoFaceDetected.as_str(), "no_face_detected");
        assert_eq!(
            serde_json::to_string(&CameraViolation::FaceTooSmall).unwrap(),
            "\"face_too_small\""
        );
    }

    #[test]
    fn test_clear_verdict_carries_no_violation() {
        let v = FrameVerdict::clear(1);
        assert!(!v.detected);
        assert!(v.kind.is_none());
        assert!(!v.analysis_unavailable);
    }

    #[test]
    fn test_unavailable_is_not_a_detection() {
        let v = FrameVerdict::unavailable();
        assert!(!v.detected);
        assert!(v.analysis_unavailable);
    }
}
