//! Exam Proctoring API Server
//!
//! REST surface over the proctoring pipeline: attempt lifecycle,
//! behavior violation reports, camera frame submission, and results
//! reporting for dashboards.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod settings;

pub use error::ApiError;
pub use settings::Settings;

use proctor_vision::FrameAnalyzer;
use scoring::{QuestionSpec, StaticQuestionBank};
use storage::Repository;
use violation_engine::ViolationAggregator;

/// Application state shared across handlers
pub struct AppState {
    /// Violation aggregation and attempt lifecycle
    pub aggregator: ViolationAggregator,
    /// Frame analyzer
    pub analyzer: FrameAnalyzer,
    /// Question bank for finalize scoring
    pub bank: StaticQuestionBank,
    /// Storage repository (reporting queries)
    pub repository: Arc<Repository>,
    /// Server settings
    pub settings: Settings,
    /// Prometheus render handle
    pub metrics: PrometheusHandle,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub metrics: SystemMetrics,
}

/// System metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub attempt_count: u64,
    pub violation_event_count: u64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let governor = rate_limit::create_governor_config(&state.settings.rate_limit);

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/attempts", post(routes::attempts::open_attempt))
        .route("/api/v1/attempts/:id", get(routes::attempts::get_attempt))
        .route(
            "/api/v1/attempts/:id/submit",
            post(routes::attempts::submit_attempt),
        )
        .route(
            "/api/v1/violations/behavior",
            post(routes::behavior::report_violation),
        )
        .route(
            "/api/v1/proctoring/start",
            post(routes::proctoring::start_proctoring),
        )
        .route(
            "/api/v1/proctoring/frame",
            post(routes::proctoring::submit_frame).layer(GovernorLayer { config: governor }),
        )
        .route(
            "/api/v1/reports/students/:id",
            get(routes::reports::student_report),
        )
        .route(
            "/api/v1/reports/exams/:id",
            get(routes::reports::exam_results),
        )
        .route("/api/v1/reports/live", get(routes::reports::live_updates))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        metrics: SystemMetrics {
            attempt_count: state.repository.attempt_count().await.unwrap_or(0),
            violation_event_count: state.repository.event_count().await.unwrap_or(0),
        },
    };

    Json(response)
}

/// Prometheus exposition handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Build shared state from settings
pub async fn build_state(settings: Settings) -> anyhow::Result<Arc<AppState>> {
    let repository = Arc::new(match &settings.database_url {
        Some(url) => Repository::with_sqlite(url).await?,
        None => Repository::in_memory(),
    });

    let analyzer = FrameAnalyzer::new(settings.vision.clone())?;
    let aggregator = ViolationAggregator::new(
        Arc::clone(&repository),
        settings.engine.clone(),
        settings.penalty.clone(),
    );
    let bank = StaticQuestionBank::new(settings.questions.iter().map(|q| {
        (
            q.id,
            QuestionSpec {
                correct: q.correct,
                marks: q.marks,
            },
        )
    }));
    let metrics = PrometheusBuilder::new().install_recorder()?;

    Ok(Arc::new(AppState {
        aggregator,
        analyzer,
        bank,
        repository,
        settings,
        metrics,
        version: env!("CARGO_PKG_VERSION").to_string(),
        start_time: std::time::Instant::now(),
    }))
}

/// Run the server
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let bind_addr = settings.bind_addr.clone();
    let state = build_state(settings).await?;
    let app = create_router(state);

    info!("Starting proctoring API server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
