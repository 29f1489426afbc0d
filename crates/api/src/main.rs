//! Exam Proctoring Pipeline - Main Entry Point

use anyhow::Result;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("=== Exam Proctoring Pipeline v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Starting proctoring services...");

    let settings = Settings::load()?;
    run_server(settings).await
}
