//! Attempt and violation-event records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which signal stream produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSource {
    /// Client-reported behavioral event (tab switch, window blur, ...)
    Behavior,
    /// Webcam frame analysis
    Camera,
}

impl ViolationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationSource::Behavior => "behavior",
            ViolationSource::Camera => "camera",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "behavior" => Some(ViolationSource::Behavior),
            "camera" => Some(ViolationSource::Camera),
            _ => None,
        }
    }
}

/// One student's single run through one exam.
///
/// `cheating_count` never decreases, and `terminated` implies it is at
/// least the termination threshold. Once `submitted` is set the row is
/// terminal and no further mutation is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub submitted: bool,
    pub terminated: bool,
    /// Violations recorded from client behavior events
    pub behavior_count: u32,
    /// Violations recorded from camera frame analysis
    pub camera_count: u32,
    /// Authoritative total compared against the termination threshold
    pub cheating_count: u32,
    pub final_marks: f64,
}

impl ExamAttempt {
    /// A fresh attempt row for (exam, student), started now
    pub fn started(exam_id: i64, student_id: i64, start_time: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            exam_id,
            student_id,
            start_time,
            end_time: None,
            submitted: false,
            terminated: false,
            behavior_count: 0,
            camera_count: 0,
            cheating_count: 0,
            final_marks: 0.0,
        }
    }

    /// Attempt accepts violation reports and submission
    pub fn is_active(&self) -> bool {
        !self.submitted && !self.terminated
    }

    /// Sum of both sub-counts at this instant
    pub fn total_violations(&self) -> u32 {
        self.behavior_count + self.camera_count
    }
}

/// Append-only record of one detected violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub id: Uuid,
    pub attempt_id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub source: ViolationSource,
    /// Violation type wire name (`tab_switch`, `no_face_detected`, ...)
    pub kind: String,
    pub confidence: Option<f32>,
    /// Reference to the triggering evidence (e.g. a stored frame)
    pub evidence_ref: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ViolationEvent {
    pub fn new(
        attempt: &ExamAttempt,
        source: ViolationSource,
        kind: impl Into<String>,
        confidence: Option<f32>,
        evidence_ref: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt_id: attempt.id,
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            source,
            kind: kind.into(),
            confidence,
            evidence_ref,
            recorded_at,
        }
    }
}
