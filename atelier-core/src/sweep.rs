//! Cleanup sweep
//!
//! Flips lapsed holds to expired so their capacity returns to the pool.
//! Runs on a timer through the background runner and on demand through the
//! admin surface; both paths converge on the same storage operation, and
//! re-running over the same rows is a no-op.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::CoreResult;
use crate::storage::CheckoutStorage;
use crate::types::Timestamp;

/// One sweep's outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Holds flipped to expired
    pub expired_count: u64,
    /// When the sweep ran
    pub ran_at: Timestamp,
}

/// Reclaims lapsed reservation capacity
pub struct CleanupSweep {
    storage: Arc<dyn CheckoutStorage>,
}

impl CleanupSweep {
    /// Create a sweep over the given store
    pub fn new(storage: Arc<dyn CheckoutStorage>) -> Self {
        Self { storage }
    }

    /// Sweep every trait
    pub async fn run(&self) -> CoreResult<SweepReport> {
        let now = Timestamp::now();
        let expired_count = self.storage.expire_reservations(now, None).await?;
        if expired_count > 0 {
            info!(expired_count, "Swept expired reservations");
        } else {
            debug!("Sweep found no expired reservations");
        }
        Ok(SweepReport {
            expired_count,
            ran_at: now,
        })
    }

    /// Sweep a single trait
    pub async fn run_for_trait(&self, trait_id: &str) -> CoreResult<SweepReport> {
        let now = Timestamp::now();
        let expired_count = self.storage.expire_reservations(now, Some(trait_id)).await?;
        if expired_count > 0 {
            debug!(trait_id = %trait_id, expired_count, "Swept trait reservations");
        }
        Ok(SweepReport {
            expired_count,
            ran_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::{Reservation, ReservationStatus, TraitListing};

    async fn seeded() -> (Arc<MemoryStorage>, CleanupSweep) {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .upsert_listing(&TraitListing::limited("hat_crown", 5, 1_000_000))
            .await
            .unwrap();
        let sweep = CleanupSweep::new(storage.clone());
        (storage, sweep)
    }

    #[tokio::test]
    async fn test_sweep_only_touches_lapsed_holds() {
        let (storage, sweep) = seeded().await;
        let now = Timestamp::now();

        let mut lapsed = Reservation::new("hat_crown", "wallet_a", "asset_1", 600);
        lapsed.expires_at = now.minus_secs(1);
        storage.create_reservation(&lapsed, now).await.unwrap();
        let live = Reservation::new("hat_crown", "wallet_b", "asset_2", 600);
        storage.create_reservation(&live, now).await.unwrap();

        let report = sweep.run().await.unwrap();
        assert_eq!(report.expired_count, 1);

        let untouched = storage
            .get_reservation(&live.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.status, ReservationStatus::Reserved);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (storage, sweep) = seeded().await;
        let now = Timestamp::now();

        let mut lapsed = Reservation::new("hat_crown", "wallet_a", "asset_1", 600);
        lapsed.expires_at = now.minus_secs(1);
        storage.create_reservation(&lapsed, now).await.unwrap();

        assert_eq!(sweep.run().await.unwrap().expired_count, 1);
        assert_eq!(sweep.run().await.unwrap().expired_count, 0);
    }

    #[tokio::test]
    async fn test_consumed_holds_are_not_swept() {
        let (storage, sweep) = seeded().await;
        let now = Timestamp::now();

        let hold = Reservation::new("hat_crown", "wallet_a", "asset_1", 600);
        storage.create_reservation(&hold, now).await.unwrap();
        storage
            .consume_reservation(&hold.reservation_id, now)
            .await
            .unwrap();

        assert_eq!(sweep.run().await.unwrap().expired_count, 0);
        let row = storage
            .get_reservation(&hold.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, ReservationStatus::Consumed);
    }
}
