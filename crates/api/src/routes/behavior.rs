//! Behavior violation routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};
use violation_engine::BehaviorViolation;

/// Client-reported behavior violation
#[derive(Debug, Deserialize)]
pub struct BehaviorRequest {
    pub attempt_id: i64,
    pub student_id: i64,
    pub kind: BehaviorViolation,
}

/// Violation report response
#[derive(Debug, Serialize)]
pub struct BehaviorResponse {
    pub total_violations: u32,
    pub terminated: bool,
    pub warning: bool,
}

/// Record one behavior violation for an active attempt
pub async fn report_violation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BehaviorRequest>,
) -> Result<Json<BehaviorResponse>, ApiError> {
    let outcome = state
        .aggregator
        .record_behavior(req.attempt_id, req.student_id, req.kind)
        .await?;

    Ok(Json(BehaviorResponse {
        total_violations: outcome.total_violations,
        terminated: outcome.terminated,
        warning: outcome.total_violations >= 1,
    }))
}
