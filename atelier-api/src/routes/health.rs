//! Health and introspection endpoints

use atelier_core::service::ServiceStats;
use axum::{extract::State, Json};

use crate::dto::HealthResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        service: state.service.status().await.to_string(),
    }))
}

/// Ready check endpoint (verifies storage connectivity)
pub async fn ready_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let status = match state.service.ready().await {
        Ok(()) => "ready",
        Err(_) => "degraded",
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        service: state.service.status().await.to_string(),
    }))
}

/// Combined service, storage and metrics statistics
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<ServiceStats>> {
    let stats = state.service.stats().await.map_err(ApiError::Core)?;
    Ok(Json(stats))
}

/// Prometheus text exposition
pub async fn metrics_export(State(state): State<AppState>) -> String {
    state.service.prometheus_metrics().await
}
