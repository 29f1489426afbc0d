//! Storage Layer
//!
//! Persistence gateway for exam attempts and violation events. Attempt
//! rows are mutable while an attempt is live; violation events are
//! append-only and never rewritten. Two backends: a Mutex-guarded
//! in-memory store for tests and ephemeral runs, and SQLite (WAL) for
//! deployments where in-progress attempts must survive a restart.

mod model;
mod repository;

pub use model::{ExamAttempt, ViolationEvent, ViolationSource};
pub use repository::Repository;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found")]
    NotFound,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}
