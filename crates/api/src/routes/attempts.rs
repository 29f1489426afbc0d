//! Attempt lifecycle routes

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};
use scoring::{round2, SubmittedAnswer};
use storage::ExamAttempt;
use violation_engine::AttemptReport;

/// Request to open (or resume) an attempt
#[derive(Debug, Deserialize)]
pub struct OpenAttemptRequest {
    pub exam_id: i64,
    pub student_id: i64,
}

/// Open a new attempt for (exam, student), or resume the existing one
pub async fn open_attempt(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenAttemptRequest>,
) -> Result<Json<ExamAttempt>, ApiError> {
    let attempt = state
        .aggregator
        .open_attempt(req.exam_id, req.student_id)
        .await?;
    Ok(Json(attempt))
}

/// Attempt report with full event log
pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AttemptReport>, ApiError> {
    let report = state.aggregator.attempt_report(id).await?;
    Ok(Json(report))
}

/// Finalize request
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub student_id: i64,
    pub answers: Vec<SubmittedAnswer>,
}

/// Finalize response
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Final marks, rounded to two decimals for display
    pub final_marks: f64,
    pub total_violations: u32,
    pub terminated: bool,
}

/// Finalize the attempt: score answers, apply the violation penalty,
/// seal the attempt.
pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let outcome = state
        .aggregator
        .finalize(id, req.student_id, &req.answers, &state.bank)
        .await?;

    Ok(Json(SubmitResponse {
        final_marks: round2(outcome.final_marks),
        total_violations: outcome.total_violations,
        terminated: outcome.terminated,
    }))
}
