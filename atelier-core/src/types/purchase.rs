//! Purchase row - the unit of settlement
//!
//! # State machine
//!
//! ```text
//! created ──→ tx_built ──→ confirmed ──→ fulfilled
//!    │            │            │
//!    └────────────┴────────────┴──→ failed
//! ```
//!
//! Status only moves forward. `fulfilled` and `failed` are terminal; nothing
//! leaves them. A bound `tx_signature` is globally unique across purchases:
//! one ledger transaction settles exactly one purchase.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{
    Amount, AssetId, BundleId, PurchaseId, ReservationId, Timestamp, TraitId, TxSignature,
    WalletAddress,
};

/// Purchase lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Intent recorded; reservation or gift grant held
    #[default]
    Created,

    /// Bundle assembled and validated
    TxBuilt,

    /// Ledger reported the bound signature confirmed
    Confirmed,

    /// Post-confirmation bookkeeping complete
    Fulfilled,

    /// Irrecoverable error; reservation released
    Failed,
}

impl PurchaseStatus {
    /// Whether the row can never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Failed)
    }

    /// Whether this status is waiting on settlement (reconciliation scope)
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Created | Self::TxBuilt)
    }

    /// Valid forward transitions
    pub fn can_transition_to(&self, target: PurchaseStatus) -> bool {
        match (self, target) {
            (Self::Created, Self::TxBuilt) => true,
            (Self::TxBuilt, Self::Confirmed) => true,
            (Self::Confirmed, Self::Fulfilled) => true,

            // failed is reachable from every non-terminal status
            (Self::Created, Self::Failed) => true,
            (Self::TxBuilt, Self::Failed) => true,
            (Self::Confirmed, Self::Failed) => true,

            _ => false,
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::TxBuilt => write!(f, "tx_built"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Rejected state-machine move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseTransitionError {
    pub from: PurchaseStatus,
    pub to: PurchaseStatus,
}

impl fmt::Display for PurchaseTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid purchase transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for PurchaseTransitionError {}

/// One settlement attempt for one trait on one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Row id
    pub purchase_id: PurchaseId,
    /// Buyer wallet
    pub wallet_address: WalletAddress,
    /// Asset the trait is applied to
    pub asset_id: AssetId,
    /// Trait being bought
    pub trait_id: TraitId,
    /// Settlement amount; zero for gift redemptions
    pub price_amount: Amount,
    /// Settlement token; `None` means native currency
    pub token_id: Option<String>,
    /// Treasury receiving the payment leg
    pub treasury_wallet: WalletAddress,
    /// Lifecycle status
    pub status: PurchaseStatus,
    /// Ledger signature, bound once at broadcast time, unique when present
    pub tx_signature: Option<TxSignature>,
    /// The hold this purchase settles
    pub reservation_id: ReservationId,
    /// The bundle built for this purchase, attached at build time
    pub bundle_id: Option<BundleId>,
    /// Why the purchase failed, when it did
    pub failure_reason: Option<String>,
    /// Creation time
    pub created_at: Timestamp,
    /// Last status change
    pub updated_at: Timestamp,
}

impl Purchase {
    /// Create a purchase in `created` against a held reservation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet_address: impl Into<WalletAddress>,
        asset_id: impl Into<AssetId>,
        trait_id: impl Into<TraitId>,
        price_amount: Amount,
        token_id: Option<String>,
        treasury_wallet: impl Into<WalletAddress>,
        reservation_id: impl Into<ReservationId>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            purchase_id: super::common::new_id(),
            wallet_address: wallet_address.into(),
            asset_id: asset_id.into(),
            trait_id: trait_id.into(),
            price_amount,
            token_id,
            treasury_wallet: treasury_wallet.into(),
            status: PurchaseStatus::Created,
            tx_signature: None,
            reservation_id: reservation_id.into(),
            bundle_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this settles through a gift-balance grant
    pub fn is_gift(&self) -> bool {
        self.price_amount == 0
    }

    /// Guarded state-machine move
    pub fn transition_to(&mut self, target: PurchaseStatus) -> Result<(), PurchaseTransitionError> {
        if !self.status.can_transition_to(target) {
            return Err(PurchaseTransitionError {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Bundle validated, ready for signature collection
    pub fn mark_tx_built(&mut self) -> Result<(), PurchaseTransitionError> {
        self.transition_to(PurchaseStatus::TxBuilt)
    }

    /// Ledger confirmed the bound signature
    pub fn mark_confirmed(&mut self) -> Result<(), PurchaseTransitionError> {
        self.transition_to(PurchaseStatus::Confirmed)
    }

    /// Bookkeeping done
    pub fn mark_fulfilled(&mut self) -> Result<(), PurchaseTransitionError> {
        self.transition_to(PurchaseStatus::Fulfilled)
    }

    /// Irrecoverable failure with an operator-readable reason
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), PurchaseTransitionError> {
        self.transition_to(PurchaseStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}
