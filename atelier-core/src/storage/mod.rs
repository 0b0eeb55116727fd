//! Checkout storage layer
//!
//! Persistence for listings, reservations, purchases, gift balances and
//! built-but-unsubmitted bundles.
//!
//! # Design principles
//!
//! - Every check-then-act sequence the checkout flow depends on is a single
//!   storage operation. Capacity checks, idempotent re-issue, status
//!   transitions, signature binding and gift claims are all conditional
//!   inside the store, never read-modify-write in the caller.
//! - Conditional operations return the row as the store now holds it, so
//!   callers act on the committed state rather than their own copy.
//! - Shared counters (remaining supply, gift quantities) live here and only
//!   here. Process memory is never the source of truth.

pub mod memory;
pub mod sled;

use async_trait::async_trait;

use crate::bundle::PendingBundle;
use crate::error::CoreResult;
use crate::types::{GiftBalance, Purchase, PurchaseStatus, Reservation, Timestamp, TraitListing};

/// Result of an atomic reserve attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The candidate hold was inserted
    Created(Reservation),
    /// An active hold for the same trait + wallet + asset already existed;
    /// the original is returned untouched
    Existing(Reservation),
}

impl ReserveOutcome {
    /// The reservation the caller should use
    pub fn reservation(&self) -> &Reservation {
        match self {
            ReserveOutcome::Created(r) | ReserveOutcome::Existing(r) => r,
        }
    }

    /// Whether the attempt was absorbed by an existing hold
    pub fn is_reissued(&self) -> bool {
        matches!(self, ReserveOutcome::Existing(_))
    }
}

/// Storage interface for the checkout flow
///
/// Implementations must make each operation atomic with respect to
/// concurrent callers on the same rows.
#[async_trait]
pub trait CheckoutStorage: Send + Sync {
    // ==================== Listing ops ====================

    /// Insert or replace a trait listing
    async fn upsert_listing(&self, listing: &TraitListing) -> CoreResult<()>;

    /// Fetch a listing
    async fn get_listing(&self, trait_id: &str) -> CoreResult<Option<TraitListing>>;

    /// All listings
    async fn list_listings(&self) -> CoreResult<Vec<TraitListing>>;

    // ==================== Reservation ops ====================

    /// Atomically reserve capacity for the candidate hold
    ///
    /// In one unit: re-issues an existing active hold for the same
    /// trait + wallet + asset, otherwise checks remaining capacity against
    /// the count of active holds and inserts the candidate. Fails with
    /// `OutOfStock` when capacity is exhausted, `NotFound` when the listing
    /// does not exist and `Validation` when it is inactive.
    async fn create_reservation(
        &self,
        candidate: &Reservation,
        now: Timestamp,
    ) -> CoreResult<ReserveOutcome>;

    /// Fetch a reservation
    async fn get_reservation(&self, reservation_id: &str) -> CoreResult<Option<Reservation>>;

    /// Atomically mark a held reservation consumed
    ///
    /// Fails with `ReservationExpired` when the hold lapsed (by clock or by
    /// sweep) and `InvalidState` for any other status.
    async fn consume_reservation(
        &self,
        reservation_id: &str,
        now: Timestamp,
    ) -> CoreResult<Reservation>;

    /// Atomically cancel a held reservation
    ///
    /// Cancelling twice is a no-op returning the cancelled row. Consumed
    /// and expired holds fail with `InvalidState`.
    async fn cancel_reservation(&self, reservation_id: &str) -> CoreResult<Reservation>;

    /// Count holds that are still active at `now` for one trait
    async fn count_active_reservations(&self, trait_id: &str, now: Timestamp) -> CoreResult<u64>;

    /// Flip lapsed holds to expired, returning how many flipped
    ///
    /// `trait_id` limits the sweep to one trait; `None` sweeps everything.
    async fn expire_reservations(
        &self,
        now: Timestamp,
        trait_id: Option<&str>,
    ) -> CoreResult<u64>;

    // ==================== Purchase ops ====================

    /// Insert a new purchase record
    async fn insert_purchase(&self, purchase: &Purchase) -> CoreResult<()>;

    /// Fetch a purchase
    async fn get_purchase(&self, purchase_id: &str) -> CoreResult<Option<Purchase>>;

    /// Atomically move a purchase from one status to another
    ///
    /// The transition applies only when the stored status equals `from`;
    /// anything else fails with `InvalidState`. `failure_reason` is stored
    /// when the target status is `Failed`.
    async fn transition_purchase(
        &self,
        purchase_id: &str,
        from: PurchaseStatus,
        to: PurchaseStatus,
        failure_reason: Option<&str>,
    ) -> CoreResult<Purchase>;

    /// Record which bundle was built for a purchase
    async fn attach_bundle(&self, purchase_id: &str, bundle_id: &str) -> CoreResult<Purchase>;

    /// Atomically bind a ledger signature to a purchase
    ///
    /// The signature column is unique across purchases. Binding the same
    /// signature to the same purchase twice is a no-op; binding it to a
    /// different purchase fails with `DuplicateSignature` carrying the
    /// purchase that already owns it.
    async fn bind_signature(&self, purchase_id: &str, signature: &str) -> CoreResult<Purchase>;

    /// Look a purchase up by its bound signature
    async fn get_purchase_by_signature(&self, signature: &str) -> CoreResult<Option<Purchase>>;

    /// Atomically settle a confirmed purchase
    ///
    /// In one unit: the purchase moves confirmed to fulfilled, its
    /// reservation is consumed if still held, and when `decrement_supply`
    /// is set and the listing tracks supply the remaining count drops by
    /// one. Splitting these would open a window where the freed hold and
    /// the undecremented supply both count as capacity. A reservation
    /// already swept to expired does not block settlement; payment has
    /// landed by the time this runs.
    async fn fulfill_purchase(
        &self,
        purchase_id: &str,
        decrement_supply: bool,
    ) -> CoreResult<Purchase>;

    /// Purchases still in a pending status
    ///
    /// `stale_before` keeps only rows whose last update is at or before the
    /// cutoff; `None` returns every pending purchase.
    async fn list_pending_purchases(
        &self,
        stale_before: Option<Timestamp>,
    ) -> CoreResult<Vec<Purchase>>;

    // ==================== Gift balance ops ====================

    /// Fetch a gift balance
    async fn get_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CoreResult<Option<GiftBalance>>;

    /// Atomically claim one unit of gift balance
    ///
    /// Decrements only when at least one unit is available. Returns the
    /// updated balance, or `None` when there was nothing to claim; the
    /// caller falls through to the paid path.
    async fn claim_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CoreResult<Option<GiftBalance>>;

    /// Add units to a gift balance, creating the row if absent
    async fn credit_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
        qty: u64,
    ) -> CoreResult<GiftBalance>;

    // ==================== Pending bundle ops ====================

    /// Persist a built bundle awaiting submission
    async fn save_pending_bundle(&self, record: &PendingBundle) -> CoreResult<()>;

    /// Fetch a pending bundle
    async fn get_pending_bundle(&self, bundle_id: &str) -> CoreResult<Option<PendingBundle>>;

    /// Drop a pending bundle once its purchase reached a terminal state
    async fn delete_pending_bundle(&self, bundle_id: &str) -> CoreResult<()>;

    // ==================== Aggregate ops ====================

    /// Row counts for the stats surface
    async fn get_stats(&self) -> CoreResult<StorageStats>;
}

/// Storage row counts
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StorageStats {
    /// Listing rows
    pub total_listings: u64,
    /// Listings open for checkout
    pub active_listings: u64,
    /// Reservation rows
    pub total_reservations: u64,
    /// Holds still active
    pub active_reservations: u64,
    /// Purchase rows
    pub total_purchases: u64,
    /// Purchases in created or tx_built
    pub pending_purchases: u64,
    /// Purchases fulfilled
    pub fulfilled_purchases: u64,
    /// Purchases failed
    pub failed_purchases: u64,
    /// Gift balance rows with units remaining
    pub gift_balances: u64,
    /// Bundles awaiting submission
    pub pending_bundles: u64,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data directory; empty selects the in-memory store
    pub data_dir: String,
    /// Sled cache size in bytes
    pub cache_size: usize,
    /// Compress on-disk segments
    pub enable_compression: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./atelier_data".to_string(),
            cache_size: 64 * 1024 * 1024, // 64MB
            enable_compression: true,
        }
    }
}

impl StorageConfig {
    /// Development profile
    pub fn development() -> Self {
        Self {
            data_dir: "./atelier_dev_data".to_string(),
            cache_size: 16 * 1024 * 1024, // 16MB
            enable_compression: false,
        }
    }

    /// Test profile (in-memory store)
    pub fn test() -> Self {
        Self {
            data_dir: String::new(),
            cache_size: 4 * 1024 * 1024, // 4MB
            enable_compression: false,
        }
    }
}

pub use self::sled::SledStorage;
pub use memory::MemoryStorage;
