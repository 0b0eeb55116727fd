//! In-memory storage implementation
//!
//! Backs tests and development. Every table sits behind one `RwLock`, so a
//! conditional operation holds a single write guard across all the rows it
//! touches; the cross-table atomicity the trait demands falls out of that.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CheckoutStorage, ReserveOutcome, StorageStats};
use crate::bundle::PendingBundle;
use crate::error::{CoreError, CoreResult};
use crate::types::{
    GiftBalance, Purchase, PurchaseStatus, Reservation, ReservationStatus, Timestamp, TraitListing,
    balance_key,
};

#[derive(Debug, Default)]
struct State {
    listings: HashMap<String, TraitListing>,
    reservations: HashMap<String, Reservation>,
    purchases: HashMap<String, Purchase>,
    gift_balances: HashMap<String, GiftBalance>,
    pending_bundles: HashMap<String, PendingBundle>,
    // Indexes
    triple_index: HashMap<String, String>,
    signature_index: HashMap<String, String>,
}

impl State {
    fn active_count(&self, trait_id: &str, now: Timestamp) -> u64 {
        self.reservations
            .values()
            .filter(|r| r.trait_id == trait_id && r.is_active(now))
            .count() as u64
    }
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every row
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }
}

#[async_trait]
impl CheckoutStorage for MemoryStorage {
    // ==================== Listing ops ====================

    async fn upsert_listing(&self, listing: &TraitListing) -> CoreResult<()> {
        let mut state = self.state.write().await;
        state
            .listings
            .insert(listing.trait_id.clone(), listing.clone());
        Ok(())
    }

    async fn get_listing(&self, trait_id: &str) -> CoreResult<Option<TraitListing>> {
        let state = self.state.read().await;
        Ok(state.listings.get(trait_id).cloned())
    }

    async fn list_listings(&self) -> CoreResult<Vec<TraitListing>> {
        let state = self.state.read().await;
        let mut listings: Vec<TraitListing> = state.listings.values().cloned().collect();
        listings.sort_by(|a, b| a.trait_id.cmp(&b.trait_id));
        Ok(listings)
    }

    // ==================== Reservation ops ====================

    async fn create_reservation(
        &self,
        candidate: &Reservation,
        now: Timestamp,
    ) -> CoreResult<ReserveOutcome> {
        let mut state = self.state.write().await;

        let listing = state
            .listings
            .get(&candidate.trait_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("trait_listing", &candidate.trait_id))?;
        if !listing.active {
            return Err(CoreError::Validation(format!(
                "trait '{}' is not active",
                candidate.trait_id
            )));
        }

        let triple = candidate.triple_key();
        if let Some(existing_id) = state.triple_index.get(&triple) {
            if let Some(existing) = state.reservations.get(existing_id) {
                if existing.is_active(now) {
                    return Ok(ReserveOutcome::Existing(existing.clone()));
                }
            }
        }

        if let Some(capacity) = listing.capacity_remaining(state.active_count(&candidate.trait_id, now)) {
            if capacity == 0 {
                return Err(CoreError::OutOfStock {
                    trait_id: candidate.trait_id.clone(),
                });
            }
        }

        state
            .reservations
            .insert(candidate.reservation_id.clone(), candidate.clone());
        state
            .triple_index
            .insert(triple, candidate.reservation_id.clone());
        Ok(ReserveOutcome::Created(candidate.clone()))
    }

    async fn get_reservation(&self, reservation_id: &str) -> CoreResult<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.get(reservation_id).cloned())
    }

    async fn consume_reservation(
        &self,
        reservation_id: &str,
        now: Timestamp,
    ) -> CoreResult<Reservation> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(reservation_id)
            .ok_or_else(|| CoreError::not_found("reservation", reservation_id))?;

        match reservation.status {
            ReservationStatus::Reserved if reservation.expires_at.is_past(now) => {
                Err(CoreError::ReservationExpired(reservation_id.to_string()))
            }
            ReservationStatus::Reserved => {
                reservation.status = ReservationStatus::Consumed;
                Ok(reservation.clone())
            }
            ReservationStatus::Expired => {
                Err(CoreError::ReservationExpired(reservation_id.to_string()))
            }
            status => Err(CoreError::InvalidState(format!(
                "reservation {} is {}, cannot consume",
                reservation_id, status
            ))),
        }
    }

    async fn cancel_reservation(&self, reservation_id: &str) -> CoreResult<Reservation> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(reservation_id)
            .ok_or_else(|| CoreError::not_found("reservation", reservation_id))?;

        match reservation.status {
            ReservationStatus::Reserved => {
                reservation.status = ReservationStatus::Cancelled;
                Ok(reservation.clone())
            }
            ReservationStatus::Cancelled => Ok(reservation.clone()),
            status => Err(CoreError::InvalidState(format!(
                "reservation {} is {}, cannot cancel",
                reservation_id, status
            ))),
        }
    }

    async fn count_active_reservations(&self, trait_id: &str, now: Timestamp) -> CoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.active_count(trait_id, now))
    }

    async fn expire_reservations(
        &self,
        now: Timestamp,
        trait_id: Option<&str>,
    ) -> CoreResult<u64> {
        let mut state = self.state.write().await;
        let mut expired = 0u64;
        for reservation in state.reservations.values_mut() {
            if let Some(filter) = trait_id {
                if reservation.trait_id != filter {
                    continue;
                }
            }
            if reservation.is_expired_hold(now) {
                reservation.status = ReservationStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    // ==================== Purchase ops ====================

    async fn insert_purchase(&self, purchase: &Purchase) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.purchases.contains_key(&purchase.purchase_id) {
            return Err(CoreError::Storage(format!(
                "purchase {} already exists",
                purchase.purchase_id
            )));
        }
        state
            .purchases
            .insert(purchase.purchase_id.clone(), purchase.clone());
        Ok(())
    }

    async fn get_purchase(&self, purchase_id: &str) -> CoreResult<Option<Purchase>> {
        let state = self.state.read().await;
        Ok(state.purchases.get(purchase_id).cloned())
    }

    async fn transition_purchase(
        &self,
        purchase_id: &str,
        from: PurchaseStatus,
        to: PurchaseStatus,
        failure_reason: Option<&str>,
    ) -> CoreResult<Purchase> {
        let mut state = self.state.write().await;
        let purchase = state
            .purchases
            .get_mut(purchase_id)
            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;

        if purchase.status != from {
            return Err(CoreError::InvalidState(format!(
                "purchase {} is {}, expected {}",
                purchase_id, purchase.status, from
            )));
        }
        if !from.can_transition_to(to) {
            return Err(CoreError::InvalidState(format!(
                "invalid purchase transition: {} -> {}",
                from, to
            )));
        }

        purchase.status = to;
        purchase.updated_at = Timestamp::now();
        if to == PurchaseStatus::Failed {
            purchase.failure_reason = failure_reason.map(|r| r.to_string());
        }
        Ok(purchase.clone())
    }

    async fn attach_bundle(&self, purchase_id: &str, bundle_id: &str) -> CoreResult<Purchase> {
        let mut state = self.state.write().await;
        let purchase = state
            .purchases
            .get_mut(purchase_id)
            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
        purchase.bundle_id = Some(bundle_id.to_string());
        purchase.updated_at = Timestamp::now();
        Ok(purchase.clone())
    }

    async fn bind_signature(&self, purchase_id: &str, signature: &str) -> CoreResult<Purchase> {
        let mut state = self.state.write().await;

        if let Some(owner) = state.signature_index.get(signature) {
            if owner == purchase_id {
                let purchase = state.purchases.get(purchase_id).cloned().ok_or_else(|| {
                    CoreError::not_found("purchase", purchase_id)
                })?;
                return Ok(purchase);
            }
            return Err(CoreError::DuplicateSignature {
                purchase_id: owner.clone(),
            });
        }

        let purchase = state
            .purchases
            .get_mut(purchase_id)
            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
        if let Some(existing) = &purchase.tx_signature {
            if existing != signature {
                return Err(CoreError::InvalidState(format!(
                    "purchase {} already bound to a different signature",
                    purchase_id
                )));
            }
        }
        purchase.tx_signature = Some(signature.to_string());
        purchase.updated_at = Timestamp::now();
        let purchase = purchase.clone();
        state
            .signature_index
            .insert(signature.to_string(), purchase_id.to_string());
        Ok(purchase)
    }

    async fn get_purchase_by_signature(&self, signature: &str) -> CoreResult<Option<Purchase>> {
        let state = self.state.read().await;
        Ok(state
            .signature_index
            .get(signature)
            .and_then(|id| state.purchases.get(id))
            .cloned())
    }

    async fn fulfill_purchase(
        &self,
        purchase_id: &str,
        decrement_supply: bool,
    ) -> CoreResult<Purchase> {
        let mut state = self.state.write().await;

        let (trait_id, reservation_id) = {
            let purchase = state
                .purchases
                .get(purchase_id)
                .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
            if purchase.status != PurchaseStatus::Confirmed {
                return Err(CoreError::InvalidState(format!(
                    "purchase {} is {}, expected confirmed",
                    purchase_id, purchase.status
                )));
            }
            (purchase.trait_id.clone(), purchase.reservation_id.clone())
        };

        if decrement_supply {
            let listing = state
                .listings
                .get_mut(&trait_id)
                .ok_or_else(|| CoreError::not_found("trait_listing", &trait_id))?;
            if listing.is_limited() {
                listing.remaining_supply = listing.remaining_supply.saturating_sub(1);
            }
        }

        // A hold swept to expired while the transaction settled stays expired
        if let Some(reservation) = state.reservations.get_mut(&reservation_id) {
            if reservation.status == ReservationStatus::Reserved {
                reservation.status = ReservationStatus::Consumed;
            }
        }

        let purchase = state
            .purchases
            .get_mut(purchase_id)
            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
        purchase.status = PurchaseStatus::Fulfilled;
        purchase.updated_at = Timestamp::now();
        Ok(purchase.clone())
    }

    async fn list_pending_purchases(
        &self,
        stale_before: Option<Timestamp>,
    ) -> CoreResult<Vec<Purchase>> {
        let state = self.state.read().await;
        let mut pending: Vec<Purchase> = state
            .purchases
            .values()
            .filter(|p| p.status.is_pending())
            .filter(|p| stale_before.map_or(true, |cutoff| p.updated_at <= cutoff))
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending)
    }

    // ==================== Gift balance ops ====================

    async fn get_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CoreResult<Option<GiftBalance>> {
        let state = self.state.read().await;
        Ok(state
            .gift_balances
            .get(&balance_key(wallet_address, trait_id))
            .cloned())
    }

    async fn claim_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CoreResult<Option<GiftBalance>> {
        let mut state = self.state.write().await;
        let key = balance_key(wallet_address, trait_id);
        match state.gift_balances.get_mut(&key) {
            Some(balance) if balance.qty_available >= 1 => {
                balance.qty_available -= 1;
                balance.updated_at = Timestamp::now();
                Ok(Some(balance.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn credit_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
        qty: u64,
    ) -> CoreResult<GiftBalance> {
        let mut state = self.state.write().await;
        let key = balance_key(wallet_address, trait_id);
        let balance = state
            .gift_balances
            .entry(key)
            .or_insert_with(|| GiftBalance::new(wallet_address, trait_id, 0));
        balance.qty_available = balance.qty_available.saturating_add(qty);
        balance.updated_at = Timestamp::now();
        Ok(balance.clone())
    }

    // ==================== Pending bundle ops ====================

    async fn save_pending_bundle(&self, record: &PendingBundle) -> CoreResult<()> {
        let mut state = self.state.write().await;
        state
            .pending_bundles
            .insert(record.bundle_id.clone(), record.clone());
        Ok(())
    }

    async fn get_pending_bundle(&self, bundle_id: &str) -> CoreResult<Option<PendingBundle>> {
        let state = self.state.read().await;
        Ok(state.pending_bundles.get(bundle_id).cloned())
    }

    async fn delete_pending_bundle(&self, bundle_id: &str) -> CoreResult<()> {
        let mut state = self.state.write().await;
        state.pending_bundles.remove(bundle_id);
        Ok(())
    }

    // ==================== Aggregate ops ====================

    async fn get_stats(&self) -> CoreResult<StorageStats> {
        let state = self.state.read().await;
        let now = Timestamp::now();
        Ok(StorageStats {
            total_listings: state.listings.len() as u64,
            active_listings: state.listings.values().filter(|l| l.active).count() as u64,
            total_reservations: state.reservations.len() as u64,
            active_reservations: state
                .reservations
                .values()
                .filter(|r| r.is_active(now))
                .count() as u64,
            total_purchases: state.purchases.len() as u64,
            pending_purchases: state
                .purchases
                .values()
                .filter(|p| p.status.is_pending())
                .count() as u64,
            fulfilled_purchases: state
                .purchases
                .values()
                .filter(|p| p.status == PurchaseStatus::Fulfilled)
                .count() as u64,
            failed_purchases: state
                .purchases
                .values()
                .filter(|p| p.status == PurchaseStatus::Failed)
                .count() as u64,
            gift_balances: state
                .gift_balances
                .values()
                .filter(|b| b.qty_available > 0)
                .count() as u64,
            pending_bundles: state.pending_bundles.len() as u64,
        })
    }
}
