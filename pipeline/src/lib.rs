pub mod api;
pub mod handles;
pub mod models;
pub mod processor;
pub mod services;
pub mod storage;
pub mod utils;

use common::Result;
use common::config::Settings;
use services::PipelineService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Runs the HTTP API and the failure monitor until the process is stopped.
pub async fn run_pipeline_service(settings: &Settings) -> Result<()> {
    let service = Arc::new(PipelineService::new(settings).await?);

    let evaluate_every = Duration::from_secs((settings.monitor.window_secs / 4).max(1));
    let _evaluator = service.monitor().spawn_evaluator(evaluate_every);

    let api_router = api::routes(Arc::clone(&service), &settings.api)?;

    let addr = settings.api_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Pipeline API server listening");
    axum::serve(listener, api_router).await?;

    Ok(())
}
