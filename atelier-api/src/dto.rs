//! Data Transfer Objects for API requests and responses
//!
//! Money crosses the wire as a base-10 string because `price_amount` is a
//! `u128` and JSON numbers cannot carry it safely. Engine timestamps are
//! Unix milliseconds; DTOs render them as RFC 3339 through `chrono`.

use atelier_core::storage::ReserveOutcome;
use atelier_core::types::{GiftBalance, Purchase, Reservation, Timestamp, TraitListing};
use atelier_core::{ReconcileReport, SweepReport, UnsignedBundle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine milliseconds to a wire timestamp
fn to_utc(ts: Timestamp) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.as_millis() as i64)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============ Reservation DTOs ============

/// Reserve one unit of a trait
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    /// Trait to hold
    pub trait_id: String,
    /// Buyer wallet
    pub wallet_address: String,
    /// Asset the trait will be applied to
    pub asset_id: String,
}

/// Granted hold
#[derive(Debug, Serialize)]
pub struct CreateReservationResponse {
    pub reservation_id: String,
    pub trait_id: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    /// Whether an existing active hold for the same triple was re-issued
    pub reissued: bool,
}

impl CreateReservationResponse {
    pub fn from_outcome(outcome: &ReserveOutcome) -> Self {
        let reservation = outcome.reservation();
        Self {
            reservation_id: reservation.reservation_id.clone(),
            trait_id: reservation.trait_id.clone(),
            status: reservation.status.to_string(),
            expires_at: to_utc(reservation.expires_at),
            reissued: outcome.is_reissued(),
        }
    }
}

/// Reservation row
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub reservation_id: String,
    pub trait_id: String,
    pub wallet_address: String,
    pub asset_id: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ReservationResponse {
    pub fn from_reservation(reservation: &Reservation) -> Self {
        Self {
            reservation_id: reservation.reservation_id.clone(),
            trait_id: reservation.trait_id.clone(),
            wallet_address: reservation.wallet_address.clone(),
            asset_id: reservation.asset_id.clone(),
            status: reservation.status.to_string(),
            expires_at: to_utc(reservation.expires_at),
            created_at: to_utc(reservation.created_at),
        }
    }
}

// ============ Transaction DTOs ============

/// Build the settlement bundle for a held reservation
#[derive(Debug, Deserialize)]
pub struct BuildTransactionRequest {
    /// The active hold to settle
    pub reservation_id: String,
}

/// Built bundle awaiting the buyer's signature
#[derive(Debug, Serialize)]
pub struct BuildTransactionResponse {
    pub bundle_id: String,
    pub purchase_id: String,
    /// Whether a gift balance settles this purchase (no payment leg)
    pub gift: bool,
    /// Settlement amount in the smallest currency unit, base-10
    pub price_amount: String,
    pub token_id: Option<String>,
    /// Wallets that must sign before submission; empty for gifts
    pub required_signatures: Vec<String>,
    /// Base64 wire encoding of the bundle, handed to the wallet for signing
    pub encoded_bundle: String,
}

impl BuildTransactionResponse {
    pub fn from_parts(purchase: &Purchase, bundle: &UnsignedBundle, encoded: String) -> Self {
        Self {
            bundle_id: bundle.bundle_id.clone(),
            purchase_id: purchase.purchase_id.clone(),
            gift: purchase.is_gift(),
            price_amount: purchase.price_amount.to_string(),
            token_id: purchase.token_id.clone(),
            required_signatures: bundle.required_signatures.clone(),
            encoded_bundle: encoded,
        }
    }
}

/// Submit a built bundle
#[derive(Debug, Deserialize)]
pub struct SubmitTransactionRequest {
    /// The bundle returned by the build call
    pub bundle_id: String,
    /// Buyer signature over the bundle digest; absent for gift bundles
    pub user_signature: Option<String>,
}

// ============ Purchase DTOs ============

/// Purchase row
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub purchase_id: String,
    pub wallet_address: String,
    pub asset_id: String,
    pub trait_id: String,
    /// Settlement amount in the smallest currency unit, base-10
    pub price_amount: String,
    pub token_id: Option<String>,
    pub status: String,
    pub tx_signature: Option<String>,
    pub reservation_id: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseResponse {
    pub fn from_purchase(purchase: &Purchase) -> Self {
        Self {
            purchase_id: purchase.purchase_id.clone(),
            wallet_address: purchase.wallet_address.clone(),
            asset_id: purchase.asset_id.clone(),
            trait_id: purchase.trait_id.clone(),
            price_amount: purchase.price_amount.to_string(),
            token_id: purchase.token_id.clone(),
            status: purchase.status.to_string(),
            tx_signature: purchase.tx_signature.clone(),
            reservation_id: purchase.reservation_id.clone(),
            failure_reason: purchase.failure_reason.clone(),
            created_at: to_utc(purchase.created_at),
            updated_at: to_utc(purchase.updated_at),
        }
    }
}

/// Purchases awaiting settlement
#[derive(Debug, Serialize)]
pub struct PendingPurchasesResponse {
    pub items: Vec<PurchaseResponse>,
    pub total: u64,
}

/// Query parameters for the pending-purchases view
#[derive(Debug, Deserialize, Default)]
pub struct PendingQueryParams {
    /// Restrict to rows old enough for the next reconciliation pass
    #[serde(default)]
    pub stale_only: bool,
}

// ============ Trait DTOs ============

/// Create or replace a trait listing
#[derive(Debug, Deserialize)]
pub struct UpsertTraitRequest {
    pub trait_id: String,
    /// Total sellable units; omit for unlimited supply
    pub total_supply: Option<u64>,
    /// Price in the smallest currency unit, base-10
    pub price_amount: String,
    /// Settlement token mint; omit for native currency
    pub token_id: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Trait listing
#[derive(Debug, Serialize)]
pub struct TraitResponse {
    pub trait_id: String,
    pub total_supply: Option<u64>,
    pub remaining_supply: u64,
    /// Price in the smallest currency unit, base-10
    pub price_amount: String,
    pub token_id: Option<String>,
    pub active: bool,
}

impl TraitResponse {
    pub fn from_listing(listing: &TraitListing) -> Self {
        Self {
            trait_id: listing.trait_id.clone(),
            total_supply: listing.total_supply,
            remaining_supply: listing.remaining_supply,
            price_amount: listing.price_amount.to_string(),
            token_id: listing.token_id.clone(),
            active: listing.active,
        }
    }
}

/// Trait catalog
#[derive(Debug, Serialize)]
pub struct TraitListResponse {
    pub items: Vec<TraitResponse>,
    pub total: u64,
}

// ============ Gift balance DTOs ============

/// Grant gift redemptions to a wallet
#[derive(Debug, Deserialize)]
pub struct CreditGiftBalanceRequest {
    pub wallet_address: String,
    pub trait_id: String,
    /// Redemptions to add
    pub qty: u64,
}

/// Gift balance row; a missing row reads as zero
#[derive(Debug, Serialize)]
pub struct GiftBalanceResponse {
    pub wallet_address: String,
    pub trait_id: String,
    pub qty_available: u64,
    pub updated_at: DateTime<Utc>,
}

impl GiftBalanceResponse {
    pub fn from_balance(balance: &GiftBalance) -> Self {
        Self {
            wallet_address: balance.wallet_address.clone(),
            trait_id: balance.trait_id.clone(),
            qty_available: balance.qty_available,
            updated_at: to_utc(balance.updated_at),
        }
    }
}

// ============ Maintenance DTOs ============

/// Sweep outcome
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired_count: u64,
    pub ran_at: DateTime<Utc>,
}

impl SweepResponse {
    pub fn from_report(report: &SweepReport) -> Self {
        Self {
            expired_count: report.expired_count,
            ran_at: to_utc(report.ran_at),
        }
    }
}

/// Reconciliation pass outcome
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub examined: u64,
    pub fulfilled: u64,
    pub failed: u64,
    pub still_pending: u64,
    pub ran_at: DateTime<Utc>,
}

impl ReconcileResponse {
    pub fn from_report(report: &ReconcileReport) -> Self {
        Self {
            examined: report.examined as u64,
            fulfilled: report.fulfilled as u64,
            failed: report.failed as u64,
            still_pending: report.still_pending as u64,
            ran_at: to_utc(report.ran_at),
        }
    }
}

// ============ Health DTOs ============

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Service lifecycle state
    pub service: String,
}
