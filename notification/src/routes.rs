use crate::monitor::{FailureMonitor, MonitorStatus};
use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

pub async fn monitor_status(State(monitor): State<Arc<FailureMonitor>>) -> Json<MonitorStatus> {
    Json(monitor.status().await)
}

pub fn routes(monitor: Arc<FailureMonitor>) -> Router {
    Router::new()
        .route("/monitor/status", get(monitor_status))
        .with_state(monitor)
}
