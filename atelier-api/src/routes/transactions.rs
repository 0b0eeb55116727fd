//! Transaction build and submit endpoints

use axum::{extract::State, Json};

use crate::dto::{
    BuildTransactionRequest, BuildTransactionResponse, PurchaseResponse, SubmitTransactionRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Build the settlement bundle for an active reservation
///
/// Decides gift-versus-paid, verifies asset ownership and returns the
/// encoded bundle for the wallet to sign. Gift bundles need no signature.
pub async fn build_transaction(
    State(state): State<AppState>,
    Json(req): Json<BuildTransactionRequest>,
) -> ApiResult<Json<BuildTransactionResponse>> {
    let built = state.service.build_transaction(&req.reservation_id).await?;
    let encoded = state.service.encode_bundle(&built.bundle)?;

    Ok(Json(BuildTransactionResponse::from_parts(
        &built.purchase,
        &built.bundle,
        encoded,
    )))
}

/// Submit a built bundle and drive the purchase to settlement
///
/// Returns the purchase in its settled state. A confirmation timeout maps
/// to 202: the purchase stays pending and reconciliation resolves it.
pub async fn submit_transaction(
    State(state): State<AppState>,
    Json(req): Json<SubmitTransactionRequest>,
) -> ApiResult<Json<PurchaseResponse>> {
    let purchase = state
        .service
        .submit_transaction(&req.bundle_id, req.user_signature.as_deref())
        .await?;

    Ok(Json(PurchaseResponse::from_purchase(&purchase)))
}
