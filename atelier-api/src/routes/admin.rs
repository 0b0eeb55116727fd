//! Maintenance endpoints

use axum::{extract::State, Json};

use crate::dto::{ReconcileResponse, SweepResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// Expire every lapsed hold now
pub async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepResponse>> {
    let report = state.service.run_sweep().await?;

    Ok(Json(SweepResponse::from_report(&report)))
}

/// Run one reconciliation pass over stale pending purchases
pub async fn run_reconciliation(
    State(state): State<AppState>,
) -> ApiResult<Json<ReconcileResponse>> {
    let report = state.service.run_reconciliation().await?;

    Ok(Json(ReconcileResponse::from_report(&report)))
}
