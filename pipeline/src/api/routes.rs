use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use common::config::ApiSettings;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{API_KEY_HEADER, ApiKeys, require_api_key};
use super::models::{
    ApiResponse, DownloadQuery, DownloadResponse, EventResult, UploadRequest, UploadResponse,
};
use super::rate_limit::{RateLimiter, throttle};
use crate::models::{ProcessedRecord, S3EventNotification};
use crate::services::{AppError, PipelineService};

pub async fn create_upload(
    State(service): State<Arc<PipelineService>>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let file_name = request
        .file_name
        .ok_or_else(|| AppError::bad_request("fileName is required".into()))?;

    let handle = service.issue_upload_handle(&file_name).await?;
    Ok(Json(handle.into()))
}

pub async fn get_download(
    State(service): State<Arc<PipelineService>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<DownloadResponse>, AppError> {
    let file_name = query
        .file_name
        .ok_or_else(|| AppError::bad_request("fileName is required".into()))?;

    let handle = service.issue_download_handle(&file_name).await?;
    Ok(Json(handle.into()))
}

pub async fn list_records(
    State(service): State<Arc<PipelineService>>,
) -> Result<Json<Vec<ProcessedRecord>>, AppError> {
    let records = service.list_records().await?;
    Ok(Json(records))
}

/// Notification hook. Answers 500 when any record failed so the sender
/// redelivers; already-terminal objects are not reprocessed on redelivery.
pub async fn receive_events(
    State(service): State<Arc<PipelineService>>,
    Json(notification): Json<S3EventNotification>,
) -> impl IntoResponse {
    let results: Vec<EventResult> = service
        .handle_notification(notification)
        .await
        .into_iter()
        .map(|(event, result)| EventResult::new(event.bucket, event.key, &result))
        .collect();

    let failed = results.iter().filter(|r| r.failed()).count();
    let (status, body) = if failed == 0 {
        (StatusCode::OK, ApiResponse::success(results))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse {
                success: false,
                data: Some(results),
                error: Some(format!("{} object(s) failed processing", failed)),
            },
        )
    };

    (status, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(allowed_origin: &str) -> common::Result<CorsLayer> {
    let origin = if allowed_origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(allowed_origin).map_err(|e| {
            common::Error::InvalidInput(format!("invalid allowed_origin '{}': {}", allowed_origin, e))
        })?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)]))
}

// Define all API routes
pub fn routes(service: Arc<PipelineService>, settings: &ApiSettings) -> common::Result<Router> {
    let keys = Arc::new(ApiKeys::new(&settings.keys));
    let limiter = Arc::new(RateLimiter::from_settings(&settings.rate_limit));

    // Layers added later run first: the key check precedes the throttle.
    let throttled = Router::new()
        .route("/uploads", post(create_upload))
        .route("/downloads", get(get_download))
        .route("/records", get(list_records))
        .route_layer(middleware::from_fn_with_state(limiter, throttle))
        .route_layer(middleware::from_fn_with_state(keys.clone(), require_api_key));

    let events = Router::new()
        .route("/events", post(receive_events))
        .route_layer(middleware::from_fn_with_state(keys, require_api_key));

    Ok(Router::new()
        .merge(throttled)
        .merge(events)
        .route("/healthz", get(healthz))
        .with_state(service.clone())
        .merge(notification::routes(service.monitor()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&settings.allowed_origin)?))
}
