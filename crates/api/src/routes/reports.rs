//! Results and monitoring reports
//!
//! Data feeds for the teacher/admin dashboards; rendering lives
//! elsewhere.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::{ApiError, AppState};
use scoring::{pass_rate, round2, Grade};
use storage::ExamAttempt;

/// Per-student attempt history
#[derive(Debug, Serialize)]
pub struct StudentReport {
    pub student_id: i64,
    pub total_attempts: usize,
    pub submitted_attempts: usize,
    pub terminated_attempts: usize,
    pub total_violations: u32,
    pub attempts: Vec<ExamAttempt>,
}

/// Attempt history and violation totals for one student
pub async fn student_report(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i64>,
) -> Result<Json<StudentReport>, ApiError> {
    let attempts = state
        .repository
        .attempts_for_student(student_id)
        .await
        .map_err(violation_engine::EngineError::from)?;

    Ok(Json(StudentReport {
        student_id,
        total_attempts: attempts.len(),
        submitted_attempts: attempts.iter().filter(|a| a.submitted).count(),
        terminated_attempts: attempts.iter().filter(|a| a.terminated).count(),
        total_violations: attempts.iter().map(|a| a.cheating_count).sum(),
        attempts,
    }))
}

/// One row in the exam results table
#[derive(Debug, Serialize)]
pub struct ExamResultRow {
    pub student_id: i64,
    pub marks: f64,
    pub grade: Grade,
    pub cheating_count: u32,
    pub camera_warnings: u32,
    pub terminated: bool,
}

/// Results for one exam's submitted attempts
#[derive(Debug, Serialize)]
pub struct ExamResults {
    pub exam_id: i64,
    pub max_marks: f64,
    pub average_marks: f64,
    pub pass_rate: f64,
    pub results: Vec<ExamResultRow>,
}

/// Submitted-attempt results for one exam, best score first
pub async fn exam_results(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<i64>,
) -> Result<Json<ExamResults>, ApiError> {
    let attempts = state
        .repository
        .submitted_attempts_for_exam(exam_id)
        .await
        .map_err(violation_engine::EngineError::from)?;

    let max_marks = state.bank.total_marks();
    let marks: Vec<f64> = attempts.iter().map(|a| a.final_marks).collect();
    let average = if marks.is_empty() {
        0.0
    } else {
        marks.iter().sum::<f64>() / marks.len() as f64
    };

    let mut results: Vec<ExamResultRow> = attempts
        .iter()
        .map(|a| ExamResultRow {
            student_id: a.student_id,
            marks: round2(a.final_marks),
            grade: state.settings.grade_scale.grade(a.final_marks, max_marks),
            cheating_count: a.cheating_count,
            camera_warnings: a.camera_count,
            terminated: a.terminated,
        })
        .collect();
    results.sort_by(|a, b| b.marks.total_cmp(&a.marks));

    Ok(Json(ExamResults {
        exam_id,
        max_marks,
        average_marks: round2(average),
        pass_rate: round2(pass_rate(&marks, max_marks, state.settings.pass_ratio)),
        results,
    }))
}

/// Recent-event counts for live monitoring polls
#[derive(Debug, Serialize)]
pub struct LiveUpdates {
    pub new_behavior_events: u64,
    pub new_camera_events: u64,
    pub timestamp: DateTime<Utc>,
}

/// Violation events recorded in the last ten seconds
pub async fn live_updates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LiveUpdates>, ApiError> {
    let cutoff = Utc::now() - Duration::seconds(10);
    let (behavior, camera) = state
        .repository
        .events_since(cutoff)
        .await
        .map_err(violation_engine::EngineError::from)?;

    Ok(Json(LiveUpdates {
        new_behavior_events: behavior,
        new_camera_events: camera,
        timestamp: Utc::now(),
    }))
}
