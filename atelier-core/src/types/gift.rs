//! Gift balance row
//!
//! A per-wallet, per-trait free-redemption allowance. Redemption decrements
//! it atomically at the storage layer; the quantity never goes negative.

use serde::{Deserialize, Serialize};

use super::common::{Timestamp, TraitId, WalletAddress};

/// Free-redemption allowance keyed by `(wallet_address, trait_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftBalance {
    /// Wallet the allowance belongs to
    pub wallet_address: WalletAddress,
    /// Trait the allowance redeems
    pub trait_id: TraitId,
    /// Redemptions still available
    pub qty_available: u64,
    /// Last credit or redemption
    pub updated_at: Timestamp,
}

impl GiftBalance {
    /// Create an allowance
    pub fn new(
        wallet_address: impl Into<WalletAddress>,
        trait_id: impl Into<TraitId>,
        qty_available: u64,
    ) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            trait_id: trait_id.into(),
            qty_available,
            updated_at: Timestamp::now(),
        }
    }

    /// Composite storage key
    pub fn key(&self) -> String {
        balance_key(&self.wallet_address, &self.trait_id)
    }
}

/// Composite key for the gift balance table
pub fn balance_key(wallet_address: &str, trait_id: &str) -> String {
    format!("{}|{}", wallet_address, trait_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_key() {
        let balance = GiftBalance::new("wallet_a", "hat_crown", 2);
        assert_eq!(balance.key(), "wallet_a|hat_crown");
        assert_eq!(balance.qty_available, 2);
    }
}
