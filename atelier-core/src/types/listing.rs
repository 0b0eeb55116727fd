//! Trait catalog listing
//!
//! The read model the checkout engine consumes: price, settlement token and
//! supply counters for one purchasable trait. Supply is decremented only on
//! fulfillment of a paid purchase, never on reservation.

use serde::{Deserialize, Serialize};

use super::common::{Amount, TraitId};

/// Catalog entry for a purchasable trait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitListing {
    /// Trait identifier
    pub trait_id: TraitId,
    /// Total units ever sellable; `None` means unlimited supply
    pub total_supply: Option<u64>,
    /// Units still sellable; meaningless for unlimited traits
    pub remaining_supply: u64,
    /// Price in the smallest unit of the settlement currency
    pub price_amount: Amount,
    /// Settlement token mint; `None` means native currency
    pub token_id: Option<String>,
    /// Whether the trait is currently offered
    pub active: bool,
}

impl TraitListing {
    /// Create a capped listing with full remaining supply
    pub fn limited(trait_id: impl Into<TraitId>, total_supply: u64, price_amount: Amount) -> Self {
        Self {
            trait_id: trait_id.into(),
            total_supply: Some(total_supply),
            remaining_supply: total_supply,
            price_amount,
            token_id: None,
            active: true,
        }
    }

    /// Create an uncapped listing
    pub fn unlimited(trait_id: impl Into<TraitId>, price_amount: Amount) -> Self {
        Self {
            trait_id: trait_id.into(),
            total_supply: None,
            remaining_supply: 0,
            price_amount,
            token_id: None,
            active: true,
        }
    }

    /// Settle in a fungible token instead of native currency
    pub fn with_token(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    /// Whether supply is capped
    pub fn is_limited(&self) -> bool {
        self.total_supply.is_some()
    }

    /// Units available for new holds given the current active reservation count
    pub fn capacity_remaining(&self, active_reservations: u64) -> Option<u64> {
        match self.total_supply {
            None => None,
            Some(_) => Some(self.remaining_supply.saturating_sub(active_reservations)),
        }
    }

    /// Supply counter consistency check
    pub fn supply_is_consistent(&self) -> bool {
        match self.total_supply {
            None => true,
            Some(total) => self.remaining_supply <= total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_listing() {
        let listing = TraitListing::limited("hat_crown", 5, 1_000_000);
        assert!(listing.is_limited());
        assert_eq!(listing.remaining_supply, 5);
        assert_eq!(listing.capacity_remaining(3), Some(2));
        assert_eq!(listing.capacity_remaining(7), Some(0));
        assert!(listing.supply_is_consistent());
    }

    #[test]
    fn test_unlimited_listing() {
        let listing = TraitListing::unlimited("bg_plain", 50_000);
        assert!(!listing.is_limited());
        assert_eq!(listing.capacity_remaining(1_000_000), None);
    }

    #[test]
    fn test_token_settlement() {
        let listing = TraitListing::limited("jacket_gold", 10, 250).with_token("tok_credits");
        assert_eq!(listing.token_id.as_deref(), Some("tok_credits"));
    }

    #[test]
    fn test_price_beyond_u64() {
        // Smallest-unit prices can exceed the 64-bit range
        let listing = TraitListing::unlimited("aura_legend", u64::MAX as Amount * 10);
        assert!(listing.price_amount > u64::MAX as Amount);
    }
}
