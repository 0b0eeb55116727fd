//! Reservation endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::dto::{CreateReservationRequest, CreateReservationResponse, ReservationResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// Reserve one unit of a trait for a wallet/asset pair
///
/// Retrying the same triple while the hold is active returns the original
/// hold with `reissued: true`; no second unit is consumed.
pub async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateReservationRequest>,
) -> ApiResult<Json<CreateReservationResponse>> {
    let outcome = state
        .service
        .reserve_trait(&req.trait_id, &req.wallet_address, &req.asset_id)
        .await?;

    Ok(Json(CreateReservationResponse::from_outcome(&outcome)))
}

/// Release a hold before settlement
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<String>,
) -> ApiResult<Json<ReservationResponse>> {
    let reservation = state.service.cancel_reservation(&reservation_id).await?;

    Ok(Json(ReservationResponse::from_reservation(&reservation)))
}
