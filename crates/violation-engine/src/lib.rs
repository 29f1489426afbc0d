//! Violation Engine
//!
//! The authoritative anti-cheating core. Merges two asynchronously
//! arriving signal streams per exam attempt:
//! - behavior events reported by the exam client (tab switch, blur, ...)
//! - camera verdicts from webcam frame analysis
//!
//! Every counter update runs inside a per-attempt critical section, so
//! near-simultaneous reports can never both read the same pre-update
//! value and drop an increment. Crossing the violation threshold
//! terminates the attempt irreversibly; submission competes for the same
//! critical section, so a violation racing a finalize is either fully
//! counted before the score or rejected after it, never half-applied.

pub mod aggregator;
pub mod lifecycle;
pub mod types;

pub use aggregator::{EngineConfig, ViolationAggregator};
pub use lifecycle::AttemptPhase;
pub use types::{
    AttemptReport, BehaviorViolation, CameraOutcome, FinalizeOutcome, ViolationOutcome,
};

use storage::StorageError;
use thiserror::Error;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown id, wrong owner, already submitted, or terminated
    #[error("Invalid attempt: {0}")]
    InvalidAttempt(&'static str),

    /// Frame arrived without a started proctoring session
    #[error("Proctoring session not active for attempt {0}")]
    SessionNotActive(i64),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
