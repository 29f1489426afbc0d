//! Attempt lifecycle state machine
//!
//! `Active -> Terminated` fires the instant the violation total reaches
//! the threshold; it is one-way and idempotent. `Active -> Submitted`
//! fires on finalize. A terminated attempt still takes the finalize path
//! exactly once to persist its zero score, so an attempt can end up both
//! terminated and submitted; submitted is terminal either way.

use crate::EngineError;
use chrono::{DateTime, Utc};
use storage::{ExamAttempt, ViolationSource};

/// Lifecycle phase of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Active,
    Terminated,
    Submitted,
}

/// Current phase. Submitted wins over terminated: both flags set means
/// the terminated attempt has been finalized.
pub fn phase(attempt: &ExamAttempt) -> AttemptPhase {
    if attempt.submitted {
        AttemptPhase::Submitted
    } else if attempt.terminated {
        AttemptPhase::Terminated
    } else {
        AttemptPhase::Active
    }
}

/// Reject any mutation of a non-active attempt
pub fn ensure_active(attempt: &ExamAttempt) -> Result<(), EngineError> {
    match phase(attempt) {
        AttemptPhase::Active => Ok(()),
        AttemptPhase::Submitted => Err(EngineError::InvalidAttempt("attempt already submitted")),
        AttemptPhase::Terminated => Err(EngineError::InvalidAttempt("attempt terminated")),
    }
}

/// Apply one violation to the matching sub-count. The authoritative
/// `cheating_count` only ever ratchets upward.
pub fn apply_violation(attempt: &mut ExamAttempt, source: ViolationSource) {
    match source {
        ViolationSource::Behavior => attempt.behavior_count += 1,
        ViolationSource::Camera => attempt.camera_count += 1,
    }
    attempt.cheating_count = attempt.cheating_count.max(attempt.total_violations());
}

/// Terminate once the total reaches the threshold. Returns whether this
/// call performed the transition; re-triggering is a no-op.
///
/// On transition the stored count is coerced to at least the threshold,
/// so reporting never shows a terminated attempt below it.
pub fn evaluate_termination(attempt: &mut ExamAttempt, threshold: u32) -> bool {
    if attempt.terminated {
        attempt.cheating_count = attempt.cheating_count.max(threshold);
        return false;
    }
    if attempt.total_violations() >= threshold || attempt.cheating_count >= threshold {
        attempt.terminated = true;
        attempt.cheating_count = attempt.cheating_count.max(threshold);
        return true;
    }
    false
}

/// Seal the attempt with its final marks. Submitted is terminal.
pub fn seal(attempt: &mut ExamAttempt, final_marks: f64, end_time: DateTime<Utc>) {
    attempt.final_marks = final_marks;
    attempt.end_time = Some(end_time);
    attempt.submitted = true;
}
