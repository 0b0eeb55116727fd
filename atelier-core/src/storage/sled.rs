//! Sled persistent storage implementation
//!
//! Conditional operations run inside sled transactions spanning every tree
//! they touch. Transactions cannot iterate, so the capacity gate reads a
//! per-trait counter of rows still in `reserved` instead of scanning; the
//! counter moves in the same transaction as the row it describes. Lapsed
//! holds keep counting until a sweep reclaims them, which makes the gate
//! conservative: a reserve attempt can see out-of-stock where a sweep would
//! free room, and the reservation manager sweeps the trait and retries, but
//! the gate never admits more holds than supply.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult, Transactional};
use std::path::Path;

use super::{CheckoutStorage, ReserveOutcome, StorageConfig, StorageStats};
use crate::bundle::PendingBundle;
use crate::error::{CoreError, CoreResult};
use crate::types::{
    balance_key, GiftBalance, Purchase, PurchaseStatus, Reservation, ReservationStatus, Timestamp,
    TraitListing,
};

/// Tree name constants
const LISTINGS_TREE: &str = "listings";
const RESERVATIONS_TREE: &str = "reservations";
const PURCHASES_TREE: &str = "purchases";
const GIFT_BALANCES_TREE: &str = "gift_balances";
const PENDING_BUNDLES_TREE: &str = "pending_bundles";
const TRIPLE_INDEX_TREE: &str = "reservation_triple_index";
const SIGNATURE_INDEX_TREE: &str = "signature_index";
const RESERVED_COUNTS_TREE: &str = "reserved_counts";

type TxnResult<T> = Result<T, ConflictableTransactionError<CoreError>>;

fn tx_serialize<T: Serialize>(value: &T) -> TxnResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| ConflictableTransactionError::Abort(CoreError::Serialization(e.to_string())))
}

fn tx_deserialize<T: DeserializeOwned>(bytes: &[u8]) -> TxnResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ConflictableTransactionError::Abort(CoreError::Serialization(e.to_string())))
}

fn abort<T>(e: CoreError) -> TxnResult<T> {
    Err(ConflictableTransactionError::Abort(e))
}

fn commit<T>(result: TransactionResult<T, CoreError>, op: &str) -> CoreResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => {
            Err(CoreError::Storage(format!("{} transaction failed: {}", op, e)))
        }
    }
}

fn decode_count(bytes: Option<&[u8]>) -> u64 {
    match bytes {
        Some(b) if b.len() == 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(b);
            u64::from_be_bytes(buf)
        }
        _ => 0,
    }
}

/// Sled persistent store
#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
    listings: sled::Tree,
    reservations: sled::Tree,
    purchases: sled::Tree,
    gift_balances: sled::Tree,
    pending_bundles: sled::Tree,
    triple_index: sled::Tree,
    signature_index: sled::Tree,
    reserved_counts: sled::Tree,
}

impl SledStorage {
    /// Create a store from configuration
    pub fn new(config: &StorageConfig) -> CoreResult<Self> {
        let db = sled::Config::new()
            .path(&config.data_dir)
            .cache_capacity(config.cache_size as u64)
            .use_compression(config.enable_compression)
            .open()
            .map_err(|e| CoreError::Storage(format!("Failed to open sled db: {}", e)))?;
        Self::from_db(db)
    }

    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path)
            .map_err(|e| CoreError::Storage(format!("Failed to open sled db: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> CoreResult<Self> {
        let listings = db
            .open_tree(LISTINGS_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open listings tree: {}", e)))?;
        let reservations = db
            .open_tree(RESERVATIONS_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open reservations tree: {}", e)))?;
        let purchases = db
            .open_tree(PURCHASES_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open purchases tree: {}", e)))?;
        let gift_balances = db
            .open_tree(GIFT_BALANCES_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open gift_balances tree: {}", e)))?;
        let pending_bundles = db
            .open_tree(PENDING_BUNDLES_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open pending_bundles tree: {}", e)))?;
        let triple_index = db
            .open_tree(TRIPLE_INDEX_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open triple index tree: {}", e)))?;
        let signature_index = db
            .open_tree(SIGNATURE_INDEX_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open signature index tree: {}", e)))?;
        let reserved_counts = db
            .open_tree(RESERVED_COUNTS_TREE)
            .map_err(|e| CoreError::Storage(format!("Failed to open reserved counts tree: {}", e)))?;

        Ok(Self {
            db,
            listings,
            reservations,
            purchases,
            gift_balances,
            pending_bundles,
            triple_index,
            signature_index,
            reserved_counts,
        })
    }

    /// Drop every row
    pub fn clear(&self) -> CoreResult<()> {
        for (name, tree) in [
            (LISTINGS_TREE, &self.listings),
            (RESERVATIONS_TREE, &self.reservations),
            (PURCHASES_TREE, &self.purchases),
            (GIFT_BALANCES_TREE, &self.gift_balances),
            (PENDING_BUNDLES_TREE, &self.pending_bundles),
            (TRIPLE_INDEX_TREE, &self.triple_index),
            (SIGNATURE_INDEX_TREE, &self.signature_index),
            (RESERVED_COUNTS_TREE, &self.reserved_counts),
        ] {
            tree.clear()
                .map_err(|e| CoreError::Storage(format!("Failed to clear {}: {}", name, e)))?;
        }
        Ok(())
    }

    /// Flush to disk
    pub fn flush(&self) -> CoreResult<()> {
        self.db
            .flush()
            .map_err(|e| CoreError::Storage(format!("Failed to flush db: {}", e)))?;
        Ok(())
    }

    // ==================== Helpers ====================

    fn serialize<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl CheckoutStorage for SledStorage {
    // ==================== Listing ops ====================

    async fn upsert_listing(&self, listing: &TraitListing) -> CoreResult<()> {
        let value = Self::serialize(listing)?;
        self.listings
            .insert(listing.trait_id.as_bytes(), value)
            .map_err(|e| CoreError::Storage(format!("Failed to save listing: {}", e)))?;
        Ok(())
    }

    async fn get_listing(&self, trait_id: &str) -> CoreResult<Option<TraitListing>> {
        match self
            .listings
            .get(trait_id.as_bytes())
            .map_err(|e| CoreError::Storage(format!("Failed to get listing: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_listings(&self) -> CoreResult<Vec<TraitListing>> {
        let mut listings = Vec::new();
        for item in self.listings.iter() {
            let (_, value) = item
                .map_err(|e| CoreError::Storage(format!("Failed to iterate listings: {}", e)))?;
            listings.push(Self::deserialize(&value)?);
        }
        Ok(listings)
    }

    // ==================== Reservation ops ====================

    async fn create_reservation(
        &self,
        candidate: &Reservation,
        now: Timestamp,
    ) -> CoreResult<ReserveOutcome> {
        let triple = candidate.triple_key();
        let result = (
            &self.listings,
            &self.reservations,
            &self.triple_index,
            &self.reserved_counts,
        )
            .transaction(|(listings, reservations, triples, counts)| {
                let listing: TraitListing = match listings.get(candidate.trait_id.as_bytes())? {
                    Some(bytes) => tx_deserialize(&bytes)?,
                    None => {
                        return abort(CoreError::not_found("trait_listing", &candidate.trait_id))
                    }
                };
                if !listing.active {
                    return abort(CoreError::Validation(format!(
                        "trait '{}' is not active",
                        candidate.trait_id
                    )));
                }

                if let Some(existing_id) = triples.get(triple.as_bytes())? {
                    if let Some(bytes) = reservations.get(&existing_id)? {
                        let existing: Reservation = tx_deserialize(&bytes)?;
                        if existing.is_active(now) {
                            return Ok(ReserveOutcome::Existing(existing));
                        }
                    }
                }

                let reserved = decode_count(counts.get(candidate.trait_id.as_bytes())?.as_deref());
                if listing.capacity_remaining(reserved) == Some(0) {
                    return abort(CoreError::OutOfStock {
                        trait_id: candidate.trait_id.clone(),
                    });
                }

                reservations.insert(
                    candidate.reservation_id.as_bytes(),
                    tx_serialize(candidate)?,
                )?;
                triples.insert(triple.as_bytes(), candidate.reservation_id.as_bytes())?;
                counts.insert(
                    candidate.trait_id.as_bytes(),
                    reserved.saturating_add(1).to_be_bytes().to_vec(),
                )?;
                Ok(ReserveOutcome::Created(candidate.clone()))
            });
        commit(result, "reserve")
    }

    async fn get_reservation(&self, reservation_id: &str) -> CoreResult<Option<Reservation>> {
        match self
            .reservations
            .get(reservation_id.as_bytes())
            .map_err(|e| CoreError::Storage(format!("Failed to get reservation: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn consume_reservation(
        &self,
        reservation_id: &str,
        now: Timestamp,
    ) -> CoreResult<Reservation> {
        let result = (&self.reservations, &self.reserved_counts).transaction(
            |(reservations, counts)| {
                let mut row: Reservation = match reservations.get(reservation_id.as_bytes())? {
                    Some(bytes) => tx_deserialize(&bytes)?,
                    None => return abort(CoreError::not_found("reservation", reservation_id)),
                };
                match row.status {
                    ReservationStatus::Reserved if row.expires_at.is_past(now) => {
                        abort(CoreError::ReservationExpired(reservation_id.to_string()))
                    }
                    ReservationStatus::Reserved => {
                        row.status = ReservationStatus::Consumed;
                        reservations.insert(reservation_id.as_bytes(), tx_serialize(&row)?)?;
                        let reserved = decode_count(counts.get(row.trait_id.as_bytes())?.as_deref());
                        counts.insert(
                            row.trait_id.as_bytes(),
                            reserved.saturating_sub(1).to_be_bytes().to_vec(),
                        )?;
                        Ok(row)
                    }
                    ReservationStatus::Expired => {
                        abort(CoreError::ReservationExpired(reservation_id.to_string()))
                    }
                    status => abort(CoreError::InvalidState(format!(
                        "reservation {} is {}, cannot consume",
                        reservation_id, status
                    ))),
                }
            },
        );
        commit(result, "consume reservation")
    }

    async fn cancel_reservation(&self, reservation_id: &str) -> CoreResult<Reservation> {
        let result = (&self.reservations, &self.reserved_counts).transaction(
            |(reservations, counts)| {
                let mut row: Reservation = match reservations.get(reservation_id.as_bytes())? {
                    Some(bytes) => tx_deserialize(&bytes)?,
                    None => return abort(CoreError::not_found("reservation", reservation_id)),
                };
                match row.status {
                    ReservationStatus::Reserved => {
                        row.status = ReservationStatus::Cancelled;
                        reservations.insert(reservation_id.as_bytes(), tx_serialize(&row)?)?;
                        let reserved = decode_count(counts.get(row.trait_id.as_bytes())?.as_deref());
                        counts.insert(
                            row.trait_id.as_bytes(),
                            reserved.saturating_sub(1).to_be_bytes().to_vec(),
                        )?;
                        Ok(row)
                    }
                    ReservationStatus::Cancelled => Ok(row),
                    status => abort(CoreError::InvalidState(format!(
                        "reservation {} is {}, cannot cancel",
                        reservation_id, status
                    ))),
                }
            },
        );
        commit(result, "cancel reservation")
    }

    async fn count_active_reservations(&self, trait_id: &str, now: Timestamp) -> CoreResult<u64> {
        let mut count = 0u64;
        for item in self.reservations.iter() {
            let (_, value) = item.map_err(|e| {
                CoreError::Storage(format!("Failed to iterate reservations: {}", e))
            })?;
            let row: Reservation = Self::deserialize(&value)?;
            if row.trait_id == trait_id && row.is_active(now) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn expire_reservations(
        &self,
        now: Timestamp,
        trait_id: Option<&str>,
    ) -> CoreResult<u64> {
        // Collect outside the transaction, flip each row inside one
        let mut lapsed = Vec::new();
        for item in self.reservations.iter() {
            let (_, value) = item.map_err(|e| {
                CoreError::Storage(format!("Failed to iterate reservations: {}", e))
            })?;
            let row: Reservation = Self::deserialize(&value)?;
            if let Some(filter) = trait_id {
                if row.trait_id != filter {
                    continue;
                }
            }
            if row.is_expired_hold(now) {
                lapsed.push(row.reservation_id.clone());
            }
        }

        let mut expired = 0u64;
        for id in lapsed {
            let result = (&self.reservations, &self.reserved_counts).transaction(
                |(reservations, counts)| {
                    let mut row: Reservation = match reservations.get(id.as_bytes())? {
                        Some(bytes) => tx_deserialize(&bytes)?,
                        None => return Ok(false),
                    };
                    // A racing consume or cancel wins
                    if !row.is_expired_hold(now) {
                        return Ok(false);
                    }
                    row.status = ReservationStatus::Expired;
                    reservations.insert(id.as_bytes(), tx_serialize(&row)?)?;
                    let reserved = decode_count(counts.get(row.trait_id.as_bytes())?.as_deref());
                    counts.insert(
                        row.trait_id.as_bytes(),
                        reserved.saturating_sub(1).to_be_bytes().to_vec(),
                    )?;
                    Ok(true)
                },
            );
            if commit(result, "expire reservation")? {
                expired += 1;
            }
        }
        Ok(expired)
    }

    // ==================== Purchase ops ====================

    async fn insert_purchase(&self, purchase: &Purchase) -> CoreResult<()> {
        let value = Self::serialize(purchase)?;
        let result = self.purchases.transaction(|purchases| {
            if purchases.get(purchase.purchase_id.as_bytes())?.is_some() {
                return abort(CoreError::Storage(format!(
                    "purchase {} already exists",
                    purchase.purchase_id
                )));
            }
            purchases.insert(purchase.purchase_id.as_bytes(), value.clone())?;
            Ok(())
        });
        commit(result, "insert purchase")
    }

    async fn get_purchase(&self, purchase_id: &str) -> CoreResult<Option<Purchase>> {
        match self
            .purchases
            .get(purchase_id.as_bytes())
            .map_err(|e| CoreError::Storage(format!("Failed to get purchase: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn transition_purchase(
        &self,
        purchase_id: &str,
        from: PurchaseStatus,
        to: PurchaseStatus,
        failure_reason: Option<&str>,
    ) -> CoreResult<Purchase> {
        let result = self.purchases.transaction(|purchases| {
            let mut purchase: Purchase = match purchases.get(purchase_id.as_bytes())? {
                Some(bytes) => tx_deserialize(&bytes)?,
                None => return abort(CoreError::not_found("purchase", purchase_id)),
            };
            if purchase.status != from {
                return abort(CoreError::InvalidState(format!(
                    "purchase {} is {}, expected {}",
                    purchase_id, purchase.status, from
                )));
            }
            if !from.can_transition_to(to) {
                return abort(CoreError::InvalidState(format!(
                    "invalid purchase transition: {} -> {}",
                    from, to
                )));
            }
            purchase.status = to;
            purchase.updated_at = Timestamp::now();
            if to == PurchaseStatus::Failed {
                purchase.failure_reason = failure_reason.map(|r| r.to_string());
            }
            purchases.insert(purchase_id.as_bytes(), tx_serialize(&purchase)?)?;
            Ok(purchase)
        });
        commit(result, "transition purchase")
    }

    async fn attach_bundle(&self, purchase_id: &str, bundle_id: &str) -> CoreResult<Purchase> {
        let result = self.purchases.transaction(|purchases| {
            let mut purchase: Purchase = match purchases.get(purchase_id.as_bytes())? {
                Some(bytes) => tx_deserialize(&bytes)?,
                None => return abort(CoreError::not_found("purchase", purchase_id)),
            };
            purchase.bundle_id = Some(bundle_id.to_string());
            purchase.updated_at = Timestamp::now();
            purchases.insert(purchase_id.as_bytes(), tx_serialize(&purchase)?)?;
            Ok(purchase)
        });
        commit(result, "attach bundle")
    }

    async fn bind_signature(&self, purchase_id: &str, signature: &str) -> CoreResult<Purchase> {
        let result = (&self.purchases, &self.signature_index).transaction(
            |(purchases, signatures)| {
                if let Some(owner_bytes) = signatures.get(signature.as_bytes())? {
                    let owner = String::from_utf8_lossy(&owner_bytes).to_string();
                    if owner == purchase_id {
                        return match purchases.get(purchase_id.as_bytes())? {
                            Some(bytes) => Ok(tx_deserialize(&bytes)?),
                            None => abort(CoreError::not_found("purchase", purchase_id)),
                        };
                    }
                    return abort(CoreError::DuplicateSignature { purchase_id: owner });
                }

                let mut purchase: Purchase = match purchases.get(purchase_id.as_bytes())? {
                    Some(bytes) => tx_deserialize(&bytes)?,
                    None => return abort(CoreError::not_found("purchase", purchase_id)),
                };
                if let Some(existing) = &purchase.tx_signature {
                    if existing != signature {
                        return abort(CoreError::InvalidState(format!(
                            "purchase {} already bound to a different signature",
                            purchase_id
                        )));
                    }
                }
                purchase.tx_signature = Some(signature.to_string());
                purchase.updated_at = Timestamp::now();
                purchases.insert(purchase_id.as_bytes(), tx_serialize(&purchase)?)?;
                signatures.insert(signature.as_bytes(), purchase_id.as_bytes())?;
                Ok(purchase)
            },
        );
        commit(result, "bind signature")
    }

    async fn get_purchase_by_signature(&self, signature: &str) -> CoreResult<Option<Purchase>> {
        match self
            .signature_index
            .get(signature.as_bytes())
            .map_err(|e| CoreError::Storage(format!("Failed to get signature index: {}", e)))?
        {
            Some(purchase_key) => {
                match self
                    .purchases
                    .get(&purchase_key)
                    .map_err(|e| CoreError::Storage(format!("Failed to get purchase: {}", e)))?
                {
                    Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    async fn fulfill_purchase(
        &self,
        purchase_id: &str,
        decrement_supply: bool,
    ) -> CoreResult<Purchase> {
        let result = (
            &self.purchases,
            &self.listings,
            &self.reservations,
            &self.reserved_counts,
        )
            .transaction(|(purchases, listings, reservations, counts)| {
                let mut purchase: Purchase = match purchases.get(purchase_id.as_bytes())? {
                    Some(bytes) => tx_deserialize(&bytes)?,
                    None => return abort(CoreError::not_found("purchase", purchase_id)),
                };
                if purchase.status != PurchaseStatus::Confirmed {
                    return abort(CoreError::InvalidState(format!(
                        "purchase {} is {}, expected confirmed",
                        purchase_id, purchase.status
                    )));
                }

                if decrement_supply {
                    let mut listing: TraitListing =
                        match listings.get(purchase.trait_id.as_bytes())? {
                            Some(bytes) => tx_deserialize(&bytes)?,
                            None => {
                                return abort(CoreError::not_found(
                                    "trait_listing",
                                    &purchase.trait_id,
                                ))
                            }
                        };
                    if listing.is_limited() {
                        listing.remaining_supply = listing.remaining_supply.saturating_sub(1);
                        listings.insert(purchase.trait_id.as_bytes(), tx_serialize(&listing)?)?;
                    }
                }

                // A hold swept to expired while the transaction settled stays expired
                if let Some(bytes) = reservations.get(purchase.reservation_id.as_bytes())? {
                    let mut row: Reservation = tx_deserialize(&bytes)?;
                    if row.status == ReservationStatus::Reserved {
                        row.status = ReservationStatus::Consumed;
                        reservations
                            .insert(purchase.reservation_id.as_bytes(), tx_serialize(&row)?)?;
                        let reserved =
                            decode_count(counts.get(row.trait_id.as_bytes())?.as_deref());
                        counts.insert(
                            row.trait_id.as_bytes(),
                            reserved.saturating_sub(1).to_be_bytes().to_vec(),
                        )?;
                    }
                }

                purchase.status = PurchaseStatus::Fulfilled;
                purchase.updated_at = Timestamp::now();
                purchases.insert(purchase_id.as_bytes(), tx_serialize(&purchase)?)?;
                Ok(purchase)
            });
        commit(result, "fulfill purchase")
    }

    async fn list_pending_purchases(
        &self,
        stale_before: Option<Timestamp>,
    ) -> CoreResult<Vec<Purchase>> {
        let mut pending = Vec::new();
        for item in self.purchases.iter() {
            let (_, value) = item
                .map_err(|e| CoreError::Storage(format!("Failed to iterate purchases: {}", e)))?;
            let purchase: Purchase = Self::deserialize(&value)?;
            if !purchase.status.is_pending() {
                continue;
            }
            if let Some(cutoff) = stale_before {
                if purchase.updated_at > cutoff {
                    continue;
                }
            }
            pending.push(purchase);
        }
        pending.sort_by_key(|p| p.created_at);
        Ok(pending)
    }

    // ==================== Gift balance ops ====================

    async fn get_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CoreResult<Option<GiftBalance>> {
        let key = balance_key(wallet_address, trait_id);
        match self
            .gift_balances
            .get(key.as_bytes())
            .map_err(|e| CoreError::Storage(format!("Failed to get gift balance: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn claim_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CoreResult<Option<GiftBalance>> {
        let key = balance_key(wallet_address, trait_id);
        let result = self.gift_balances.transaction(|balances| {
            let mut balance: GiftBalance = match balances.get(key.as_bytes())? {
                Some(bytes) => tx_deserialize(&bytes)?,
                None => return Ok(None),
            };
            if balance.qty_available < 1 {
                return Ok(None);
            }
            balance.qty_available -= 1;
            balance.updated_at = Timestamp::now();
            balances.insert(key.as_bytes(), tx_serialize(&balance)?)?;
            Ok(Some(balance))
        });
        commit(result, "claim gift balance")
    }

    async fn credit_gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
        qty: u64,
    ) -> CoreResult<GiftBalance> {
        let key = balance_key(wallet_address, trait_id);
        let result = self.gift_balances.transaction(|balances| {
            let mut balance: GiftBalance = match balances.get(key.as_bytes())? {
                Some(bytes) => tx_deserialize(&bytes)?,
                None => GiftBalance::new(wallet_address, trait_id, 0),
            };
            balance.qty_available = balance.qty_available.saturating_add(qty);
            balance.updated_at = Timestamp::now();
            balances.insert(key.as_bytes(), tx_serialize(&balance)?)?;
            Ok(balance)
        });
        commit(result, "credit gift balance")
    }

    // ==================== Pending bundle ops ====================

    async fn save_pending_bundle(&self, record: &PendingBundle) -> CoreResult<()> {
        let value = Self::serialize(record)?;
        self.pending_bundles
            .insert(record.bundle_id.as_bytes(), value)
            .map_err(|e| CoreError::Storage(format!("Failed to save pending bundle: {}", e)))?;
        Ok(())
    }

    async fn get_pending_bundle(&self, bundle_id: &str) -> CoreResult<Option<PendingBundle>> {
        match self
            .pending_bundles
            .get(bundle_id.as_bytes())
            .map_err(|e| CoreError::Storage(format!("Failed to get pending bundle: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_pending_bundle(&self, bundle_id: &str) -> CoreResult<()> {
        self.pending_bundles
            .remove(bundle_id.as_bytes())
            .map_err(|e| CoreError::Storage(format!("Failed to delete pending bundle: {}", e)))?;
        Ok(())
    }

    // ==================== Aggregate ops ====================

    async fn get_stats(&self) -> CoreResult<StorageStats> {
        let mut stats = StorageStats::default();
        let now = Timestamp::now();

        for item in self.listings.iter() {
            let (_, value) = item
                .map_err(|e| CoreError::Storage(format!("Failed to iterate listings: {}", e)))?;
            let listing: TraitListing = Self::deserialize(&value)?;
            stats.total_listings += 1;
            if listing.active {
                stats.active_listings += 1;
            }
        }

        for item in self.reservations.iter() {
            let (_, value) = item.map_err(|e| {
                CoreError::Storage(format!("Failed to iterate reservations: {}", e))
            })?;
            let row: Reservation = Self::deserialize(&value)?;
            stats.total_reservations += 1;
            if row.is_active(now) {
                stats.active_reservations += 1;
            }
        }

        for item in self.purchases.iter() {
            let (_, value) = item
                .map_err(|e| CoreError::Storage(format!("Failed to iterate purchases: {}", e)))?;
            let purchase: Purchase = Self::deserialize(&value)?;
            stats.total_purchases += 1;
            match purchase.status {
                status if status.is_pending() => stats.pending_purchases += 1,
                PurchaseStatus::Fulfilled => stats.fulfilled_purchases += 1,
                PurchaseStatus::Failed => stats.failed_purchases += 1,
                _ => {}
            }
        }

        for item in self.gift_balances.iter() {
            let (_, value) = item.map_err(|e| {
                CoreError::Storage(format!("Failed to iterate gift balances: {}", e))
            })?;
            let balance: GiftBalance = Self::deserialize(&value)?;
            if balance.qty_available > 0 {
                stats.gift_balances += 1;
            }
        }

        stats.pending_bundles = self.pending_bundles.len() as u64;
        Ok(stats)
    }
}
