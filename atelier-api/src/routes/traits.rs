//! Trait catalog endpoints

use atelier_core::types::{Amount, TraitListing};
use axum::{
    extract::{Path, State},
    Json,
};

use crate::dto::{TraitListResponse, TraitResponse, UpsertTraitRequest};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Get a trait listing
pub async fn get_trait(
    State(state): State<AppState>,
    Path(trait_id): Path<String>,
) -> ApiResult<Json<TraitResponse>> {
    let listing = state.service.get_listing(&trait_id).await?;

    Ok(Json(TraitResponse::from_listing(&listing)))
}

/// List the whole trait catalog
pub async fn list_traits(State(state): State<AppState>) -> ApiResult<Json<TraitListResponse>> {
    let listings = state.service.list_listings().await?;

    let items: Vec<TraitResponse> = listings.iter().map(TraitResponse::from_listing).collect();
    let total = items.len() as u64;

    Ok(Json(TraitListResponse { items, total }))
}

/// Create or replace a trait listing
///
/// Replacing resets `remaining_supply` to the new `total_supply`.
pub async fn upsert_trait(
    State(state): State<AppState>,
    Json(req): Json<UpsertTraitRequest>,
) -> ApiResult<Json<TraitResponse>> {
    if req.trait_id.is_empty() {
        return Err(ApiError::BadRequest("trait_id is required".to_string()));
    }
    let price_amount: Amount = req.price_amount.parse().map_err(|_| {
        ApiError::BadRequest("price_amount must be a base-10 integer".to_string())
    })?;

    let mut listing = match req.total_supply {
        Some(total) => TraitListing::limited(&req.trait_id, total, price_amount),
        None => TraitListing::unlimited(&req.trait_id, price_amount),
    };
    if let Some(token_id) = &req.token_id {
        listing = listing.with_token(token_id);
    }
    listing.active = req.active;

    state.service.upsert_listing(&listing).await?;

    Ok(Json(TraitResponse::from_listing(&listing)))
}
