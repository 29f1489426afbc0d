//! Engine input and outcome types

use serde::{Deserialize, Serialize};
use storage::{ExamAttempt, ViolationEvent};

/// Client-reported behavior violation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorViolation {
    /// Browser tab lost focus
    TabSwitch,
    /// Exam window lost focus
    WindowBlur,
    /// Fullscreen mode abandoned
    FullscreenExit,
    /// Copy/paste attempted on exam content
    CopyAttempt,
    /// Unclassified client report
    Other,
}

impl BehaviorViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorViolation::TabSwitch => "tab_switch",
            BehaviorViolation::WindowBlur => "window_blur",
            BehaviorViolation::FullscreenExit => "fullscreen_exit",
            BehaviorViolation::CopyAttempt => "copy_attempt",
            BehaviorViolation::Other => "other",
        }
    }
}

/// Result of recording one behavior event
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ViolationOutcome {
    pub total_violations: u32,
    pub terminated: bool,
}

/// Result of applying one camera verdict
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CameraOutcome {
    /// Whether this verdict incremented the count
    pub counted: bool,
    /// Camera-sourced violations so far
    pub camera_warnings: u32,
    pub total_violations: u32,
    pub terminated: bool,
}

/// Result of finalizing an attempt
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FinalizeOutcome {
    pub final_marks: f64,
    pub total_violations: u32,
    pub terminated: bool,
}

/// Attempt plus its full event log
#[derive(Debug, Clone, Serialize)]
pub struct AttemptReport {
    pub attempt: ExamAttempt,
    pub events: Vec<ViolationEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_wire_names() {
        assert_eq!(BehaviorViolation::TabSwitch.as_str(), "tab_switch");
        assert_eq!(
            serde_json::from_str::<BehaviorViolation>("\"window_blur\"").unwrap(),
            BehaviorViolation::WindowBlur
        );
    }
}
