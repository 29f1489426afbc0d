//! API error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use frame_ingest::FrameError;
use serde_json::json;
use storage::StorageError;
use thiserror::Error;
use tracing::error;
use violation_engine::EngineError;

/// API-surface errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(EngineError::InvalidAttempt(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::SessionNotActive(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Storage(StorageError::NotFound)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Engine(EngineError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Frame(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = ApiError::Engine(EngineError::InvalidAttempt("attempt terminated"));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let no_session = ApiError::Engine(EngineError::SessionNotActive(1));
        assert_eq!(no_session.status(), StatusCode::BAD_REQUEST);

        let decode = ApiError::Frame(FrameError::Decode("bad jpeg".into()));
        assert_eq!(decode.status(), StatusCode::BAD_REQUEST);

        let missing = ApiError::Engine(EngineError::Storage(StorageError::NotFound));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let db = ApiError::Engine(EngineError::Storage(StorageError::Database("down".into())));
        assert_eq!(db.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
