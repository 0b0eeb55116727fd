//! Reservation row
//!
//! A time-bounded hold on one unit of a trait's supply for a specific
//! wallet/asset pair. `reserved` is the only live state; every other status
//! is terminal and the row is immutable once it gets there.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{AssetId, ReservationId, Timestamp, TraitId, WalletAddress};

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Live hold; the only state transitions leave from
    Reserved,
    /// Settled into a fulfilled purchase
    Consumed,
    /// TTL elapsed and the sweep reclaimed the unit
    Expired,
    /// Released explicitly before settlement
    Cancelled,
}

impl ReservationStatus {
    /// Whether the row can never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Reserved)
    }

    /// Valid transitions; terminal states go nowhere
    pub fn can_transition_to(&self, target: ReservationStatus) -> bool {
        match (self, target) {
            (Self::Reserved, Self::Consumed) => true,
            (Self::Reserved, Self::Expired) => true,
            (Self::Reserved, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => write!(f, "reserved"),
            Self::Consumed => write!(f, "consumed"),
            Self::Expired => write!(f, "expired"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A hold on one unit of trait supply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Row id
    pub reservation_id: ReservationId,
    /// Trait being held
    pub trait_id: TraitId,
    /// Buyer wallet
    pub wallet_address: WalletAddress,
    /// Asset the trait will be applied to
    pub asset_id: AssetId,
    /// Hold deadline
    pub expires_at: Timestamp,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Creation time
    pub created_at: Timestamp,
}

impl Reservation {
    /// Create a fresh hold expiring `ttl_secs` from now
    pub fn new(
        trait_id: impl Into<TraitId>,
        wallet_address: impl Into<WalletAddress>,
        asset_id: impl Into<AssetId>,
        ttl_secs: u64,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            reservation_id: super::common::new_id(),
            trait_id: trait_id.into(),
            wallet_address: wallet_address.into(),
            asset_id: asset_id.into(),
            expires_at: now.plus_secs(ttl_secs),
            status: ReservationStatus::Reserved,
            created_at: now,
        }
    }

    /// Still `reserved` and not past its deadline
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.status == ReservationStatus::Reserved && !self.expires_at.is_past(now)
    }

    /// `reserved` but past its deadline; the sweep will reclaim it
    pub fn is_expired_hold(&self, now: Timestamp) -> bool {
        self.status == ReservationStatus::Reserved && self.expires_at.is_past(now)
    }

    /// The `(trait, wallet, asset)` identity used for idempotent retry
    pub fn triple_key(&self) -> String {
        triple_key(&self.trait_id, &self.wallet_address, &self.asset_id)
    }
}

/// Composite key for the idempotency index
pub fn triple_key(trait_id: &str, wallet_address: &str, asset_id: &str) -> String {
    format!("{}|{}|{}", trait_id, wallet_address, asset_id)
}
