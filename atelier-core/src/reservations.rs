//! Reservation manager
//!
//! Hands out time-bounded holds on trait supply. The storage layer owns the
//! atomic capacity gate; this layer owns the retry discipline around it and
//! the lazy sweep that keeps lapsed holds from blocking the gate.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::storage::{CheckoutStorage, ReserveOutcome};
use crate::types::{Reservation, Timestamp};

/// Attempts per reserve call before the verdict is final
const RESERVE_ATTEMPTS: u32 = 3;

/// Issues, settles and counts trait holds
pub struct ReservationManager {
    storage: Arc<dyn CheckoutStorage>,
    ttl_secs: u64,
}

impl ReservationManager {
    /// Create a manager issuing holds with the given TTL
    pub fn new(storage: Arc<dyn CheckoutStorage>, ttl_secs: u64) -> Self {
        Self { storage, ttl_secs }
    }

    /// Reserve one unit of a trait for a wallet/asset pair
    ///
    /// Retries up to three times. An out-of-stock verdict triggers a sweep
    /// of that trait's lapsed holds first; the verdict only stands when the
    /// sweep frees nothing. Re-reserving an identical triple while its hold
    /// is live returns the existing hold instead of double-counting.
    pub async fn reserve(
        &self,
        trait_id: &str,
        wallet_address: &str,
        asset_id: &str,
    ) -> CoreResult<ReserveOutcome> {
        if trait_id.is_empty() || wallet_address.is_empty() || asset_id.is_empty() {
            return Err(CoreError::Validation(
                "trait, wallet and asset are required".to_string(),
            ));
        }

        let mut last_err = CoreError::OutOfStock {
            trait_id: trait_id.to_string(),
        };
        for attempt in 1..=RESERVE_ATTEMPTS {
            let candidate = Reservation::new(trait_id, wallet_address, asset_id, self.ttl_secs);
            let now = Timestamp::now();
            match self.storage.create_reservation(&candidate, now).await {
                Ok(outcome) => {
                    info!(
                        reservation_id = %outcome.reservation().reservation_id,
                        trait_id = %trait_id,
                        wallet = %wallet_address,
                        reissued = outcome.is_reissued(),
                        "Reserved trait"
                    );
                    return Ok(outcome);
                }
                Err(CoreError::OutOfStock { .. }) => {
                    let freed = self
                        .storage
                        .expire_reservations(now, Some(trait_id))
                        .await?;
                    if freed == 0 {
                        return Err(CoreError::OutOfStock {
                            trait_id: trait_id.to_string(),
                        });
                    }
                    debug!(trait_id = %trait_id, freed, attempt, "Swept lapsed holds, retrying");
                    last_err = CoreError::OutOfStock {
                        trait_id: trait_id.to_string(),
                    };
                }
                Err(e @ CoreError::Storage(_)) => {
                    debug!(trait_id = %trait_id, attempt, error = %e, "Reserve attempt failed");
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Settle a hold into a purchase
    pub async fn consume(&self, reservation_id: &str) -> CoreResult<Reservation> {
        self.storage
            .consume_reservation(reservation_id, Timestamp::now())
            .await
    }

    /// Release a hold before settlement
    pub async fn cancel(&self, reservation_id: &str) -> CoreResult<Reservation> {
        let reservation = self.storage.cancel_reservation(reservation_id).await?;
        info!(reservation_id = %reservation_id, "Cancelled reservation");
        Ok(reservation)
    }

    /// Fetch a hold
    pub async fn get(&self, reservation_id: &str) -> CoreResult<Reservation> {
        self.storage
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", reservation_id))
    }

    /// Holds currently active for a trait
    pub async fn count_active(&self, trait_id: &str) -> CoreResult<u64> {
        self.storage
            .count_active_reservations(trait_id, Timestamp::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::{ReservationStatus, TraitListing};

    async fn manager_with(total: u64) -> (Arc<MemoryStorage>, ReservationManager) {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .upsert_listing(&TraitListing::limited("hat_crown", total, 1_000_000))
            .await
            .unwrap();
        let manager = ReservationManager::new(storage.clone(), 600);
        (storage, manager)
    }

    #[tokio::test]
    async fn test_reserve_and_consume() {
        let (_, manager) = manager_with(2).await;
        let outcome = manager.reserve("hat_crown", "wallet_a", "asset_1").await.unwrap();
        let id = outcome.reservation().reservation_id.clone();

        let consumed = manager.consume(&id).await.unwrap();
        assert_eq!(consumed.status, ReservationStatus::Consumed);
    }

    #[tokio::test]
    async fn test_out_of_stock_verdict_is_final_after_sweep() {
        let (_, manager) = manager_with(1).await;
        manager.reserve("hat_crown", "wallet_a", "asset_1").await.unwrap();

        let err = manager
            .reserve("hat_crown", "wallet_b", "asset_2")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::OutOfStock { trait_id } if trait_id == "hat_crown"));
    }

    #[tokio::test]
    async fn test_lapsed_hold_is_swept_before_verdict() {
        let (storage, manager) = manager_with(1).await;

        // Plant a hold that has already lapsed
        let mut lapsed = Reservation::new("hat_crown", "wallet_a", "asset_1", 600);
        lapsed.expires_at = Timestamp::now().minus_secs(5);
        storage
            .create_reservation(&lapsed, Timestamp::now())
            .await
            .unwrap();

        let outcome = manager
            .reserve("hat_crown", "wallet_b", "asset_2")
            .await
            .unwrap();
        assert!(!outcome.is_reissued());

        let swept = storage
            .get_reservation(&lapsed.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(swept.status, ReservationStatus::Expired);
    }

    #[tokio::test]
    async fn test_identical_triple_reissues() {
        let (_, manager) = manager_with(5).await;
        let first = manager.reserve("hat_crown", "wallet_a", "asset_1").await.unwrap();
        let second = manager.reserve("hat_crown", "wallet_a", "asset_1").await.unwrap();

        assert!(second.is_reissued());
        assert_eq!(
            first.reservation().reservation_id,
            second.reservation().reservation_id
        );
        assert_eq!(manager.count_active("hat_crown").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reserve_rejects_blank_input() {
        let (_, manager) = manager_with(5).await;
        let err = manager.reserve("", "wallet_a", "asset_1").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancel_releases_capacity() {
        let (_, manager) = manager_with(1).await;
        let outcome = manager.reserve("hat_crown", "wallet_a", "asset_1").await.unwrap();
        manager
            .cancel(&outcome.reservation().reservation_id)
            .await
            .unwrap();
        manager.reserve("hat_crown", "wallet_b", "asset_2").await.unwrap();
    }
}
