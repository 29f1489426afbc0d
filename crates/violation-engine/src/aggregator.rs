//! Violation aggregator
//!
//! One critical section per attempt id serializes counter updates,
//! threshold evaluation, and finalize against each other. Operations on
//! different attempts share nothing and run fully in parallel.

use crate::lifecycle;
use crate::types::{
    AttemptReport, BehaviorViolation, CameraOutcome, FinalizeOutcome, ViolationOutcome,
};
use crate::EngineError;
use chrono::Utc;
use metrics::counter;
use proctor_vision::FrameVerdict;
use scoring::{PenaltyPolicy, QuestionBank, SubmittedAnswer};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use storage::{ExamAttempt, Repository, ViolationEvent, ViolationSource};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Engine configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Violation total at which an attempt is terminated
    pub termination_threshold: u32,

    /// Count frames the detector could not analyze as camera violations.
    /// Off by default: an unavailable analysis carries no signal, but a
    /// client inducing repeated failures to starve the camera stream can
    /// be policed by enabling this.
    pub count_unavailable_analysis: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            termination_threshold: 3,
            count_unavailable_analysis: false,
        }
    }
}

/// Per-attempt violation aggregation and lifecycle enforcement
pub struct ViolationAggregator {
    repo: Arc<Repository>,
    config: EngineConfig,
    policy: PenaltyPolicy,
    /// Per-attempt critical sections, created on first touch
    gates: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
    /// Attempts with a started camera-proctoring session
    sessions: Mutex<HashSet<i64>>,
}

impl ViolationAggregator {
    pub fn new(repo: Arc<Repository>, config: EngineConfig, policy: PenaltyPolicy) -> Self {
        info!(
            threshold = config.termination_threshold,
            "Creating violation aggregator"
        );
        Self {
            repo,
            config,
            policy,
            gates: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashSet::new()),
        }
    }

    /// Underlying repository (reporting queries)
    pub fn repository(&self) -> Arc<Repository> {
        Arc::clone(&self.repo)
    }

    /// Open a new attempt for (exam, student), or resume the unsubmitted
    /// one that already exists.
    pub async fn open_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<ExamAttempt, EngineError> {
        let attempt = self.repo.open_attempt(exam_id, student_id, Utc::now()).await?;
        if attempt.submitted {
            return Err(EngineError::InvalidAttempt("attempt already submitted"));
        }
        Ok(attempt)
    }

    /// Initialize camera proctoring for an active attempt. Idempotent.
    pub async fn start_proctoring(
        &self,
        attempt_id: i64,
        student_id: i64,
    ) -> Result<(), EngineError> {
        let attempt = self.load_owned(attempt_id, student_id).await?;
        lifecycle::ensure_active(&attempt)?;

        self.lock_sessions().insert(attempt_id);
        debug!(attempt = attempt_id, "camera proctoring started");
        Ok(())
    }

    /// Record one client-reported behavior violation.
    pub async fn record_behavior(
        &self,
        attempt_id: i64,
        student_id: i64,
        kind: BehaviorViolation,
    ) -> Result<ViolationOutcome, EngineError> {
        let attempt = self
            .record(
                attempt_id,
                student_id,
                ViolationSource::Behavior,
                kind.as_str(),
                None,
                None,
            )
            .await?;

        Ok(ViolationOutcome {
            total_violations: attempt.cheating_count,
            terminated: attempt.terminated,
        })
    }

    /// Apply one camera verdict. Clear verdicts are a no-op that reports
    /// the current state; an unavailable analysis counts only when the
    /// policy says so.
    pub async fn record_camera(
        &self,
        attempt_id: i64,
        student_id: i64,
        verdict: &FrameVerdict,
        evidence_ref: Option<String>,
    ) -> Result<CameraOutcome, EngineError> {
        if !self.lock_sessions().contains(&attempt_id) {
            return Err(EngineError::SessionNotActive(attempt_id));
        }

        if verdict.analysis_unavailable {
            counter!("proctor_analysis_unavailable_total").increment(1);
        }

        let counts = verdict.detected
            || (verdict.analysis_unavailable && self.config.count_unavailable_analysis);

        if !counts {
            let attempt = self.load_owned(attempt_id, student_id).await?;
            lifecycle::ensure_active(&attempt)?;
            return Ok(CameraOutcome {
                counted: false,
                camera_warnings: attempt.camera_count,
                total_violations: attempt.cheating_count,
                terminated: attempt.terminated,
            });
        }

        let kind = match verdict.kind {
            Some(k) => k.as_str(),
            None => "analysis_unavailable",
        };
        let attempt = self
            .record(
                attempt_id,
                student_id,
                ViolationSource::Camera,
                kind,
                Some(verdict.confidence),
                evidence_ref,
            )
            .await?;

        Ok(CameraOutcome {
            counted: true,
            camera_warnings: attempt.camera_count,
            total_violations: attempt.cheating_count,
            terminated: attempt.terminated,
        })
    }

    /// Finalize the attempt: compute the raw score, apply the tier
    /// penalty from the latest committed violation count, and seal.
    ///
    /// Competes for the same per-attempt critical section as the record
    /// operations, so a violation reported just before submission lands
    /// in the score and one reported just after is rejected.
    pub async fn finalize(
        &self,
        attempt_id: i64,
        student_id: i64,
        answers: &[SubmittedAnswer],
        bank: &dyn QuestionBank,
    ) -> Result<FinalizeOutcome, EngineError> {
        let gate = self.gate(attempt_id);
        let _guard = gate.lock().await;

        let mut attempt = self.load_owned(attempt_id, student_id).await?;
        if attempt.submitted {
            return Err(EngineError::InvalidAttempt("attempt already submitted"));
        }

        // A stale snapshot can read terminated=false with the count at the
        // threshold; repair before the penalty is chosen.
        lifecycle::evaluate_termination(&mut attempt, self.config.termination_threshold);

        let raw = scoring::raw_score(answers, bank);
        let final_marks = self.policy.final_marks(raw, attempt.cheating_count);
        lifecycle::seal(&mut attempt, final_marks, Utc::now());
        self.repo.update_attempt(&attempt).await?;
        self.lock_sessions().remove(&attempt_id);

        info!(
            attempt = attempt_id,
            raw,
            final_marks,
            violations = attempt.cheating_count,
            terminated = attempt.terminated,
            "attempt finalized"
        );
        Ok(FinalizeOutcome {
            final_marks,
            total_violations: attempt.cheating_count,
            terminated: attempt.terminated,
        })
    }

    /// Attempt plus its full violation event log
    pub async fn attempt_report(&self, attempt_id: i64) -> Result<AttemptReport, EngineError> {
        let attempt = self
            .repo
            .attempt(attempt_id)
            .await?
            .ok_or(EngineError::InvalidAttempt("unknown attempt"))?;
        let events = self.repo.events_for_attempt(attempt_id).await?;
        Ok(AttemptReport { attempt, events })
    }

    /// The indivisible unit: lock the attempt, load, increment, evaluate
    /// the threshold, persist, append the event. Returns the updated row.
    async fn record(
        &self,
        attempt_id: i64,
        student_id: i64,
        source: ViolationSource,
        kind: &str,
        confidence: Option<f32>,
        evidence_ref: Option<String>,
    ) -> Result<ExamAttempt, EngineError> {
        let gate = self.gate(attempt_id);
        let _guard = gate.lock().await;

        let mut attempt = self.load_owned(attempt_id, student_id).await?;
        lifecycle::ensure_active(&attempt)?;

        lifecycle::apply_violation(&mut attempt, source);
        let newly_terminated =
            lifecycle::evaluate_termination(&mut attempt, self.config.termination_threshold);

        self.repo.update_attempt(&attempt).await?;
        let event = ViolationEvent::new(
            &attempt,
            source,
            kind,
            confidence,
            evidence_ref,
            Utc::now(),
        );
        self.repo.append_event(&event).await?;
        counter!("proctor_violations_total", "source" => source.as_str()).increment(1);
        debug!(
            attempt = attempt_id,
            source = source.as_str(),
            kind,
            total = attempt.cheating_count,
            "violation recorded"
        );

        if newly_terminated {
            warn!(
                attempt = attempt_id,
                total = attempt.cheating_count,
                "attempt terminated after excessive violations"
            );
            // Audit marker only; totals come from the attempt row, never
            // from event-table cardinality.
            let audit = ViolationEvent::new(&attempt, source, "exam_terminated", None, None, Utc::now());
            self.repo.append_event(&audit).await?;
            counter!("proctor_terminations_total").increment(1);
        }

        Ok(attempt)
    }

    async fn load_owned(
        &self,
        attempt_id: i64,
        student_id: i64,
    ) -> Result<ExamAttempt, EngineError> {
        let attempt = self
            .repo
            .attempt(attempt_id)
            .await?
            .ok_or(EngineError::InvalidAttempt("unknown attempt"))?;
        if attempt.student_id != student_id {
            return Err(EngineError::InvalidAttempt(
                "attempt belongs to another student",
            ));
        }
        Ok(attempt)
    }

    fn gate(&self, attempt_id: i64) -> Arc<AsyncMutex<()>> {
        let mut gates = self
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(gates.entry(attempt_id).or_default())
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashSet<i64>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_vision::CameraViolation;
    use scoring::{AnswerOption, QuestionSpec, StaticQuestionBank};

    fn aggregator() -> ViolationAggregator {
        ViolationAggregator::new(
            Arc::new(Repository::in_memory()),
            EngineConfig::default(),
            PenaltyPolicy::default(),
        )
    }

    /// Fifteen one-mark questions, all keyed to option A
    fn bank() -> StaticQuestionBank {
        StaticQuestionBank::new((1..=15).map(|id| {
            (
                id,
                QuestionSpec {
                    correct: AnswerOption::A,
                    marks: 1.0,
                },
            )
        }))
    }

    fn all_correct() -> Vec<SubmittedAnswer> {
        (1..=15)
            .map(|id| SubmittedAnswer {
                question_id: id,
                selected: AnswerOption::A,
            })
            .collect()
    }

    fn no_face_verdict() -> FrameVerdict {
        FrameVerdict::violation(
            CameraViolation::NoFaceDetected,
            0.9,
            "No face detected in frame",
            0,
        )
    }

    #[tokio::test]
    async fn test_open_and_resume_attempt() {
        let agg = aggregator();
        let first = agg.open_attempt(1, 7).await.unwrap();
        let second = agg.open_attempt(1, 7).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_behavior_violation_increments() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();

        let outcome = agg
            .record_behavior(attempt.id, 7, BehaviorViolation::TabSwitch)
            .await
            .unwrap();
        assert_eq!(outcome.total_violations, 1);
        assert!(!outcome.terminated);
    }

    #[tokio::test]
    async fn test_unknown_attempt_rejected() {
        let agg = aggregator();
        assert!(matches!(
            agg.record_behavior(999, 7, BehaviorViolation::TabSwitch).await,
            Err(EngineError::InvalidAttempt(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_owner_rejected() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();

        assert!(matches!(
            agg.record_behavior(attempt.id, 8, BehaviorViolation::TabSwitch).await,
            Err(EngineError::InvalidAttempt(_))
        ));
    }

    #[tokio::test]
    async fn test_frame_without_session_rejected() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();

        assert!(matches!(
            agg.record_camera(attempt.id, 7, &no_face_verdict(), None).await,
            Err(EngineError::SessionNotActive(_))
        ));
    }

    #[tokio::test]
    async fn test_start_proctoring_is_idempotent() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();

        agg.start_proctoring(attempt.id, 7).await.unwrap();
        agg.start_proctoring(attempt.id, 7).await.unwrap();

        let outcome = agg
            .record_camera(attempt.id, 7, &no_face_verdict(), None)
            .await
            .unwrap();
        assert!(outcome.counted);
        assert_eq!(outcome.camera_warnings, 1);
    }

    #[tokio::test]
    async fn test_clear_verdict_is_a_noop() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();
        agg.start_proctoring(attempt.id, 7).await.unwrap();

        let outcome = agg
            .record_camera(attempt.id, 7, &FrameVerdict::clear(1), None)
            .await
            .unwrap();
        assert!(!outcome.counted);
        assert_eq!(outcome.total_violations, 0);

        let report = agg.attempt_report(attempt.id).await.unwrap();
        assert!(report.events.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_analysis_not_counted_by_default() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();
        agg.start_proctoring(attempt.id, 7).await.unwrap();

        let outcome = agg
            .record_camera(attempt.id, 7, &FrameVerdict::unavailable(), None)
            .await
            .unwrap();
        assert!(!outcome.counted);
        assert_eq!(outcome.total_violations, 0);
    }

    #[tokio::test]
    async fn test_unavailable_analysis_counted_when_policed() {
        let agg = ViolationAggregator::new(
            Arc::new(Repository::in_memory()),
            EngineConfig {
                count_unavailable_analysis: true,
                ..Default::default()
            },
            PenaltyPolicy::default(),
        );
        let attempt = agg.open_attempt(1, 7).await.unwrap();
        agg.start_proctoring(attempt.id, 7).await.unwrap();

        let outcome = agg
            .record_camera(attempt.id, 7, &FrameVerdict::unavailable(), None)
            .await
            .unwrap();
        assert!(outcome.counted);
        assert_eq!(outcome.total_violations, 1);

        let report = agg.attempt_report(attempt.id).await.unwrap();
        assert_eq!(report.events[0].kind, "analysis_unavailable");
    }

    #[tokio::test]
    async fn test_mixed_sources_terminate_at_threshold() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();
        agg.start_proctoring(attempt.id, 7).await.unwrap();

        agg.record_behavior(attempt.id, 7, BehaviorViolation::TabSwitch)
            .await
            .unwrap();
        agg.record_camera(attempt.id, 7, &no_face_verdict(), None)
            .await
            .unwrap();
        let outcome = agg
            .record_behavior(attempt.id, 7, BehaviorViolation::WindowBlur)
            .await
            .unwrap();

        assert!(outcome.terminated);
        assert_eq!(outcome.total_violations, 3);

        // terminated attempts accept no further reports
        assert!(matches!(
            agg.record_behavior(attempt.id, 7, BehaviorViolation::TabSwitch).await,
            Err(EngineError::InvalidAttempt(_))
        ));

        let report = agg.attempt_report(attempt.id).await.unwrap();
        let counted = report
            .events
            .iter()
            .filter(|e| e.kind != "exam_terminated")
            .count();
        assert_eq!(counted, 3);
        assert_eq!(report.events.len(), 4);
    }

    #[tokio::test]
    async fn test_finalize_applies_penalty_tiers() {
        for (violations, expected) in [(0u32, 15.0), (1, 10.5), (2, 4.5)] {
            let agg = aggregator();
            let attempt = agg.open_attempt(1, 7).await.unwrap();
            for _ in 0..violations {
                agg.record_behavior(attempt.id, 7, BehaviorViolation::TabSwitch)
                    .await
                    .unwrap();
            }

            let outcome = agg
                .finalize(attempt.id, 7, &all_correct(), &bank())
                .await
                .unwrap();
            assert!(
                (outcome.final_marks - expected).abs() < 1e-9,
                "violations={violations}"
            );
            assert!(!outcome.terminated);
        }
    }

    #[tokio::test]
    async fn test_finalize_after_termination_scores_zero() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();
        for _ in 0..3 {
            agg.record_behavior(attempt.id, 7, BehaviorViolation::TabSwitch)
                .await
                .unwrap();
        }

        let outcome = agg
            .finalize(attempt.id, 7, &all_correct(), &bank())
            .await
            .unwrap();
        assert_eq!(outcome.final_marks, 0.0);
        assert!(outcome.terminated);
        assert_eq!(outcome.total_violations, 3);
    }

    #[tokio::test]
    async fn test_finalize_is_terminal() {
        let agg = aggregator();
        let attempt = agg.open_attempt(1, 7).await.unwrap();

        agg.finalize(attempt.id, 7, &all_correct(), &bank())
            .await
            .unwrap();

        assert!(matches!(
            agg.finalize(attempt.id, 7, &all_correct(), &bank()).await,
            Err(EngineError::InvalidAttempt(_))
        ));
        assert!(matches!(
            agg.record_behavior(attempt.id, 7, BehaviorViolation::TabSwitch).await,
            Err(EngineError::InvalidAttempt(_))
        ));
        assert!(matches!(
            agg.open_attempt(1, 7).await,
            Err(EngineError::InvalidAttempt(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_never_lose_updates() {
        let agg = Arc::new(aggregator());
        let attempt = agg.open_attempt(1, 7).await.unwrap();
        agg.start_proctoring(attempt.id, 7).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let agg = Arc::clone(&agg);
            let id = attempt.id;
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    agg.record_behavior(id, 7, BehaviorViolation::TabSwitch)
                        .await
                        .is_ok()
                } else {
                    agg.record_camera(id, 7, &no_face_verdict(), None)
                        .await
                        .is_ok()
                }
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        // Exactly threshold-many increments land; the rest observe the
        // terminated attempt and fail. None are lost, none double-count.
        assert_eq!(succeeded, 3);

        let row = agg.repository().attempt(attempt.id).await.unwrap().unwrap();
        assert!(row.terminated);
        assert_eq!(row.cheating_count, 3);
        assert_eq!(row.behavior_count + row.camera_count, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_below_threshold_counts_exactly() {
        let agg = Arc::new(aggregator());
        let attempt = agg.open_attempt(1, 7).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let agg = Arc::clone(&agg);
            let id = attempt.id;
            handles.push(tokio::spawn(async move {
                agg.record_behavior(id, 7, BehaviorViolation::WindowBlur).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let row = agg.repository().attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(row.cheating_count, 2);
        assert!(!row.terminated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_attempts_are_independent() {
        let agg = Arc::new(aggregator());
        let a = agg.open_attempt(1, 7).await.unwrap();
        let b = agg.open_attempt(1, 8).await.unwrap();

        let mut handles = Vec::new();
        for (id, student) in [(a.id, 7), (b.id, 8)] {
            for _ in 0..2 {
                let agg = Arc::clone(&agg);
                handles.push(tokio::spawn(async move {
                    agg.record_behavior(id, student, BehaviorViolation::TabSwitch)
                        .await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let a = agg.repository().attempt(a.id).await.unwrap().unwrap();
        let b = agg.repository().attempt(b.id).await.unwrap().unwrap();
        assert_eq!(a.cheating_count, 2);
        assert_eq!(b.cheating_count, 2);
        assert!(!a.terminated && !b.terminated);
    }
}
