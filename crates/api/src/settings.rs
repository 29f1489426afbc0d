//! Layered server configuration
//!
//! Values come from `proctor.toml` (optional) overlaid with `PROCTOR_*`
//! environment variables; anything unset falls back to defaults.

use proctor_vision::VisionConfig;
use scoring::{AnswerOption, GradeScale, PenaltyPolicy};
use serde::Deserialize;
use violation_engine::EngineConfig;

use crate::rate_limit::RateLimitConfig;

/// Question seed for the in-memory question bank
#[derive(Debug, Clone, Deserialize)]
pub struct SeedQuestion {
    pub id: i64,
    pub correct: AnswerOption,
    pub marks: f64,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listen address
    pub bind_addr: String,

    /// SQLite URL; unset runs on the in-memory repository
    pub database_url: Option<String>,

    /// Frame analysis thresholds
    pub vision: VisionConfig,

    /// Violation aggregation policy
    pub engine: EngineConfig,

    /// Tier penalty table
    pub penalty: PenaltyPolicy,

    /// Rate limiting for the frame-upload endpoint
    pub rate_limit: RateLimitConfig,

    /// Grade boundaries for results reporting
    pub grade_scale: GradeScale,

    /// Pass threshold as a fraction of the maximum score
    pub pass_ratio: f64,

    /// Question bank seed
    pub questions: Vec<SeedQuestion>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            vision: VisionConfig::default(),
            engine: EngineConfig::default(),
            penalty: PenaltyPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            grade_scale: GradeScale::default(),
            pass_ratio: 0.4,
            questions: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from `proctor.toml` and `PROCTOR_*` environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("proctor").required(false))
            .add_source(config::Environment::with_prefix("PROCTOR").separator("__"))
            .build()?
            .try_deserialize()
    }
}
