//! Purchase query endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::dto::{PendingPurchasesResponse, PendingQueryParams, PurchaseResponse};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Get a purchase by ID
pub async fn get_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<String>,
) -> ApiResult<Json<PurchaseResponse>> {
    let purchase = state.service.get_purchase(&purchase_id).await?;

    Ok(Json(PurchaseResponse::from_purchase(&purchase)))
}

/// Get the purchase a ledger signature settles
pub async fn get_purchase_by_signature(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> ApiResult<Json<PurchaseResponse>> {
    let purchase = state
        .service
        .get_purchase_by_signature(&signature)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No purchase for signature {}", signature)))?;

    Ok(Json(PurchaseResponse::from_purchase(&purchase)))
}

/// Purchases still waiting on settlement
///
/// `?stale_only=true` restricts to rows older than the pending grace
/// window, the set the next reconciliation pass will examine.
pub async fn list_pending(
    State(state): State<AppState>,
    Query(params): Query<PendingQueryParams>,
) -> ApiResult<Json<PendingPurchasesResponse>> {
    let pending = state
        .service
        .list_pending_purchases(params.stale_only)
        .await?;

    let items: Vec<PurchaseResponse> = pending.iter().map(PurchaseResponse::from_purchase).collect();
    let total = items.len() as u64;

    Ok(Json(PendingPurchasesResponse { items, total }))
}
