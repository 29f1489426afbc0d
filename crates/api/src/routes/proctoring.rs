//! Camera proctoring routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};
use frame_ingest::{decode_data_url, decode_frame};
use proctor_vision::CameraViolation;

/// Request to start camera proctoring for an attempt
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub attempt_id: i64,
    pub student_id: i64,
}

/// Proctoring session response
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: String,
    pub message: String,
}

/// Initialize camera proctoring. Idempotent.
pub async fn start_proctoring(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    state
        .aggregator
        .start_proctoring(req.attempt_id, req.student_id)
        .await?;

    Ok(Json(StartResponse {
        status: "started".to_string(),
        message: "Camera proctoring initialized".to_string(),
    }))
}

/// One webcam frame from the exam client
#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    pub attempt_id: i64,
    pub student_id: i64,
    /// base64 payload, with or without a data-URL header
    pub image_data: String,
    #[serde(default)]
    pub timestamp_ms: i64,
}

/// Frame analysis response
#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub violation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_type: Option<CameraViolation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Camera-sourced violations recorded so far
    pub warning_count: u32,
    pub terminated: bool,
    pub message: String,
}

/// Decode, analyze, and apply one frame.
pub async fn submit_frame(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FrameRequest>,
) -> Result<Json<FrameResponse>, ApiError> {
    let bytes = decode_data_url(&req.image_data)?;
    let frame = decode_frame(&bytes, req.timestamp_ms)?;

    let verdict = state.analyzer.analyze(&frame);
    let evidence = Some(format!("frame-ts:{}", frame.timestamp_ms));
    let outcome = state
        .aggregator
        .record_camera(req.attempt_id, req.student_id, &verdict, evidence)
        .await?;

    Ok(Json(FrameResponse {
        violation: outcome.counted,
        violation_type: verdict.kind,
        confidence: verdict.kind.map(|_| verdict.confidence),
        warning_count: outcome.camera_warnings,
        terminated: outcome.terminated,
        message: if outcome.counted {
            verdict.message
        } else {
            "normal".to_string()
        },
    }))
}
