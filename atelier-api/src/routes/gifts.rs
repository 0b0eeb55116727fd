//! Gift balance endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::dto::{CreditGiftBalanceRequest, GiftBalanceResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// Current gift balance for a wallet and trait; a missing row reads as zero
pub async fn get_gift_balance(
    State(state): State<AppState>,
    Path((wallet_address, trait_id)): Path<(String, String)>,
) -> ApiResult<Json<GiftBalanceResponse>> {
    let balance = state.service.gift_balance(&wallet_address, &trait_id).await?;

    Ok(Json(GiftBalanceResponse::from_balance(&balance)))
}

/// Grant gift redemptions to a wallet
pub async fn credit_gift_balance(
    State(state): State<AppState>,
    Json(req): Json<CreditGiftBalanceRequest>,
) -> ApiResult<Json<GiftBalanceResponse>> {
    let balance = state
        .service
        .credit_gift(&req.wallet_address, &req.trait_id, req.qty)
        .await?;

    Ok(Json(GiftBalanceResponse::from_balance(&balance)))
}
