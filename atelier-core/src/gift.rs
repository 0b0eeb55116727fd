//! Gift balance ledger
//!
//! Per-wallet, per-trait free-redemption allowances. The claim that turns a
//! checkout into a gift is a storage-level conditional decrement, so two
//! concurrent redemptions of a one-unit balance resolve to exactly one gift.

use std::sync::Arc;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::storage::CheckoutStorage;
use crate::types::GiftBalance;

/// Reads, claims and credits gift balances
pub struct GiftLedger {
    storage: Arc<dyn CheckoutStorage>,
}

impl GiftLedger {
    /// Create a ledger over the given store
    pub fn new(storage: Arc<dyn CheckoutStorage>) -> Self {
        Self { storage }
    }

    /// Current balance; a missing row reads as zero
    pub async fn balance(&self, wallet_address: &str, trait_id: &str) -> CoreResult<GiftBalance> {
        Ok(self
            .storage
            .get_gift_balance(wallet_address, trait_id)
            .await?
            .unwrap_or_else(|| GiftBalance::new(wallet_address, trait_id, 0)))
    }

    /// Whether the wallet holds at least one redemption for the trait
    pub async fn has_grant(&self, wallet_address: &str, trait_id: &str) -> CoreResult<bool> {
        Ok(self.balance(wallet_address, trait_id).await?.qty_available >= 1)
    }

    /// Claim one redemption if any is available
    ///
    /// Returns the updated balance on success, `None` when the wallet holds
    /// nothing to claim. Losing a race on the last unit lands in the `None`
    /// branch like any other empty balance.
    pub async fn claim(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CoreResult<Option<GiftBalance>> {
        let claimed = self
            .storage
            .claim_gift_balance(wallet_address, trait_id)
            .await?;
        if let Some(balance) = &claimed {
            info!(
                wallet = %wallet_address,
                trait_id = %trait_id,
                remaining = balance.qty_available,
                "Claimed gift redemption"
            );
        }
        Ok(claimed)
    }

    /// Grant redemptions to a wallet
    pub async fn credit(
        &self,
        wallet_address: &str,
        trait_id: &str,
        qty: u64,
    ) -> CoreResult<GiftBalance> {
        if wallet_address.is_empty() || trait_id.is_empty() {
            return Err(CoreError::Validation(
                "wallet and trait are required".to_string(),
            ));
        }
        if qty == 0 {
            return Err(CoreError::Validation(
                "credit quantity must be at least 1".to_string(),
            ));
        }
        let balance = self
            .storage
            .credit_gift_balance(wallet_address, trait_id, qty)
            .await?;
        info!(
            wallet = %wallet_address,
            trait_id = %trait_id,
            qty,
            total = balance.qty_available,
            "Credited gift balance"
        );
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn ledger() -> GiftLedger {
        GiftLedger::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_missing_balance_reads_as_zero() {
        let ledger = ledger();
        let balance = ledger.balance("wallet_a", "hat_crown").await.unwrap();
        assert_eq!(balance.qty_available, 0);
        assert!(!ledger.has_grant("wallet_a", "hat_crown").await.unwrap());
    }

    #[tokio::test]
    async fn test_credit_then_claim_to_exhaustion() {
        let ledger = ledger();
        ledger.credit("wallet_a", "hat_crown", 2).await.unwrap();
        assert!(ledger.has_grant("wallet_a", "hat_crown").await.unwrap());

        assert!(ledger.claim("wallet_a", "hat_crown").await.unwrap().is_some());
        assert!(ledger.claim("wallet_a", "hat_crown").await.unwrap().is_some());
        assert!(ledger.claim("wallet_a", "hat_crown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credit_validation() {
        let ledger = ledger();
        assert!(matches!(
            ledger.credit("wallet_a", "hat_crown", 0).await.unwrap_err(),
            CoreError::Validation(_)
        ));
        assert!(matches!(
            ledger.credit("", "hat_crown", 1).await.unwrap_err(),
            CoreError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_balances_are_keyed_per_trait() {
        let ledger = ledger();
        ledger.credit("wallet_a", "hat_crown", 1).await.unwrap();
        assert!(!ledger.has_grant("wallet_a", "bg_plain").await.unwrap());
        assert!(ledger.claim("wallet_a", "bg_plain").await.unwrap().is_none());
    }
}
