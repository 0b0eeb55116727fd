//! Purchase orchestration from held reservation to fulfilled trait
//!
//! The orchestrator drives the purchase state machine:
//!
//! ```text
//! created -> tx_built -> confirmed -> fulfilled
//!    |          |           |
//!    +----------+-----------+------> failed
//! ```
//!
//! `build_transaction` turns an active reservation into a `created` purchase
//! and an unsigned bundle, deciding the gift-or-paid question by attempting
//! a gift-balance claim first. `submit_transaction` simulates, broadcasts
//! with backoff, binds the signature, awaits settlement and settles the
//! books in one storage unit.
//!
//! Failure handling is symmetric: whenever a purchase fails before the
//! ledger settles, its reservation is released and a claimed gift unit is
//! credited back. A confirmation timeout is not a failure; the purchase
//! stays `tx_built` with its signature bound and reconciliation resolves it
//! from actual ledger state.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::bundle::{PendingBundle, TransactionBuilder, UnsignedBundle};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::external::{ActorType, AuditSink, OwnershipVerifier};
use crate::gift::GiftLedger;
use crate::ledger::SignatureStatus;
use crate::monitor::ConfirmationMonitor;
use crate::retry::RetryPolicy;
use crate::storage::CheckoutStorage;
use crate::types::{Purchase, PurchaseStatus, Timestamp};

/// Result of building a transaction for a reservation
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The purchase row, now in `tx_built`
    pub purchase: Purchase,
    /// The unsigned bundle awaiting the buyer's signature
    pub bundle: UnsignedBundle,
}

/// Drives purchases through their lifecycle
pub struct PurchaseOrchestrator {
    storage: Arc<dyn CheckoutStorage>,
    gift: GiftLedger,
    builder: TransactionBuilder,
    monitor: ConfirmationMonitor,
    ownership: Arc<dyn OwnershipVerifier>,
    audit: Arc<dyn AuditSink>,
    treasury_wallet: String,
    retry: RetryPolicy,
    max_broadcast_attempts: u32,
}

impl PurchaseOrchestrator {
    /// Create an orchestrator over shared storage and ledger plumbing
    pub fn new(
        storage: Arc<dyn CheckoutStorage>,
        builder: TransactionBuilder,
        monitor: ConfirmationMonitor,
        ownership: Arc<dyn OwnershipVerifier>,
        audit: Arc<dyn AuditSink>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            gift: GiftLedger::new(Arc::clone(&storage)),
            storage,
            builder,
            monitor,
            ownership,
            audit,
            treasury_wallet: config.treasury_wallet.clone(),
            retry: config.retry.clone(),
            max_broadcast_attempts: config.max_broadcast_attempts,
        }
    }

    // ==================== build ====================

    /// Build the settlement bundle for an active reservation
    ///
    /// Creates the purchase row, verifies asset ownership before anything
    /// touches the ledger, then assembles and validates the bundle. A gift
    /// balance is claimed up front when one exists; the purchase then
    /// carries a zero price and the bundle has no payment leg. Any error
    /// after the row exists fails the purchase and releases its hold.
    pub async fn build_transaction(&self, reservation_id: &str) -> CoreResult<BuildOutcome> {
        let reservation = self
            .storage
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", reservation_id))?;

        let now = Timestamp::now();
        if !reservation.is_active(now) {
            if reservation.is_expired_hold(now) {
                return Err(CoreError::ReservationExpired(reservation_id.to_string()));
            }
            return Err(CoreError::InvalidState(format!(
                "reservation {} is {}, expected reserved",
                reservation_id, reservation.status
            )));
        }

        let listing = self
            .storage
            .get_listing(&reservation.trait_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trait", &reservation.trait_id))?;
        if !listing.active {
            return Err(CoreError::Validation(format!(
                "trait {} is not active for sale",
                listing.trait_id
            )));
        }

        // Gift-before-paid: a successful claim settles without a payment leg.
        // Losing a claim race falls through to the paid path.
        let claimed = self
            .gift
            .claim(&reservation.wallet_address, &reservation.trait_id)
            .await?;
        let (price_amount, token_id) = match claimed {
            Some(_) => (0, None),
            None => (listing.price_amount, listing.token_id.clone()),
        };

        let purchase = Purchase::new(
            reservation.wallet_address.clone(),
            reservation.asset_id.clone(),
            reservation.trait_id.clone(),
            price_amount,
            token_id,
            self.treasury_wallet.clone(),
            reservation_id,
        );
        self.storage.insert_purchase(&purchase).await?;
        info!(
            purchase_id = %purchase.purchase_id,
            trait_id = %purchase.trait_id,
            wallet = %purchase.wallet_address,
            gift = purchase.is_gift(),
            "Created purchase"
        );
        self.audit.record(
            ActorType::Wallet,
            "purchase_created",
            json!({
                "purchase_id": purchase.purchase_id,
                "wallet_address": purchase.wallet_address,
                "trait_id": purchase.trait_id,
                "asset_id": purchase.asset_id,
                "gift": purchase.is_gift(),
            }),
        );

        let owns = match self
            .ownership
            .is_owner(&purchase.wallet_address, &purchase.asset_id)
            .await
        {
            Ok(owns) => owns,
            Err(e) => {
                self.fail_purchase(
                    &purchase.purchase_id,
                    &format!("ownership verification error: {}", e),
                )
                .await?;
                return Err(e);
            }
        };
        if !owns {
            self.fail_purchase(
                &purchase.purchase_id,
                &format!(
                    "wallet {} does not own asset {}",
                    purchase.wallet_address, purchase.asset_id
                ),
            )
            .await?;
            return Err(CoreError::Ownership {
                wallet: purchase.wallet_address.clone(),
                asset: purchase.asset_id.clone(),
            });
        }

        let bundle = match self.builder.build(
            &purchase.wallet_address,
            &purchase.asset_id,
            &purchase.trait_id,
            purchase.price_amount,
            purchase.token_id.as_deref(),
            &purchase.treasury_wallet,
        ) {
            Ok(bundle) => bundle,
            Err(e) => {
                self.fail_purchase(&purchase.purchase_id, &format!("bundle build failed: {}", e))
                    .await?;
                return Err(e);
            }
        };

        let validation = self.builder.validate(&bundle);
        if !validation.valid {
            let reason = validation
                .error
                .unwrap_or_else(|| "bundle validation failed".to_string());
            self.fail_purchase(&purchase.purchase_id, &reason).await?;
            return Err(CoreError::TransactionBuild(reason));
        }

        self.storage
            .save_pending_bundle(&PendingBundle::new(bundle.clone(), &purchase.purchase_id))
            .await?;
        self.storage
            .attach_bundle(&purchase.purchase_id, &bundle.bundle_id)
            .await?;
        let purchase = self
            .storage
            .transition_purchase(
                &purchase.purchase_id,
                PurchaseStatus::Created,
                PurchaseStatus::TxBuilt,
                None,
            )
            .await?;

        info!(
            purchase_id = %purchase.purchase_id,
            bundle_id = %bundle.bundle_id,
            signatures_required = bundle.required_signatures.len(),
            "Built transaction bundle"
        );
        self.audit.record(
            ActorType::Wallet,
            "purchase_tx_built",
            json!({
                "purchase_id": purchase.purchase_id,
                "bundle_id": bundle.bundle_id,
            }),
        );

        Ok(BuildOutcome { purchase, bundle })
    }

    // ==================== submit ====================

    /// Submit a built bundle and drive the purchase to a settled state
    ///
    /// Simulates, broadcasts with the configured backoff, binds the ledger
    /// signature and awaits confirmation. Returns the purchase in its
    /// landed state; a purchase whose transaction the ledger rejected comes
    /// back `failed` with the reason recorded. Submitting an already
    /// settled bundle is a no-op that returns the existing record, and a
    /// signature that raced onto a different purchase resolves to that
    /// purchase the same way.
    ///
    /// `ConfirmationTimeout` leaves the purchase `tx_built` with its
    /// signature bound; the reconciliation sweep resolves it later from
    /// actual ledger state.
    pub async fn submit_transaction(
        &self,
        bundle_id: &str,
        user_signature: Option<&str>,
    ) -> CoreResult<Purchase> {
        let pending = self
            .storage
            .get_pending_bundle(bundle_id)
            .await?
            .ok_or_else(|| CoreError::not_found("bundle", bundle_id))?;
        let purchase = self
            .storage
            .get_purchase(&pending.purchase_id)
            .await?
            .ok_or_else(|| CoreError::not_found("purchase", &pending.purchase_id))?;

        match purchase.status {
            PurchaseStatus::TxBuilt => {}
            PurchaseStatus::Fulfilled => {
                debug!(purchase_id = %purchase.purchase_id, "Purchase already fulfilled");
                return Ok(purchase);
            }
            PurchaseStatus::Confirmed => {
                // A previous submit confirmed the signature but died before
                // the bookkeeping. Finish it.
                return self.complete_fulfillment(&purchase.purchase_id).await;
            }
            PurchaseStatus::Created => {
                // The bundle row exists, so the build finished its work but
                // the status flip never landed. Recover it.
                self.storage
                    .transition_purchase(
                        &purchase.purchase_id,
                        PurchaseStatus::Created,
                        PurchaseStatus::TxBuilt,
                        None,
                    )
                    .await?;
            }
            PurchaseStatus::Failed => {
                return Err(CoreError::InvalidState(format!(
                    "purchase {} already failed: {}",
                    purchase.purchase_id,
                    purchase.failure_reason.as_deref().unwrap_or("unknown")
                )));
            }
        }

        let simulation = self.builder.simulate(&pending.bundle).await?;
        if !simulation.success {
            let reason = simulation
                .error
                .unwrap_or_else(|| "simulation failed".to_string());
            self.fail_purchase(&purchase.purchase_id, &format!("simulation failed: {}", reason))
                .await?;
            return Err(CoreError::Simulation(reason));
        }

        let signature = self
            .broadcast_with_retry(&pending.bundle, user_signature, &purchase.purchase_id)
            .await?;

        let purchase = match self
            .storage
            .bind_signature(&purchase.purchase_id, &signature)
            .await
        {
            Ok(purchase) => purchase,
            Err(CoreError::DuplicateSignature { purchase_id }) => {
                // The signature already settled another purchase. Per the
                // uniqueness rule this is an idempotent no-op, not an error.
                info!(
                    signature = %signature,
                    owner = %purchase_id,
                    "Signature already bound, returning owning purchase"
                );
                return self
                    .storage
                    .get_purchase(&purchase_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("purchase", &purchase_id));
            }
            Err(e) => return Err(e),
        };

        match self.monitor.await_settlement(&signature).await {
            Ok(SignatureStatus::Errored(reason)) => {
                let failed = self
                    .fail_purchase(
                        &purchase.purchase_id,
                        &format!("ledger rejected transaction: {}", reason),
                    )
                    .await?;
                Ok(failed)
            }
            Ok(_) => self.complete_fulfillment(&purchase.purchase_id).await,
            Err(e @ CoreError::ConfirmationTimeout { .. }) => {
                warn!(
                    purchase_id = %purchase.purchase_id,
                    signature = %signature,
                    "Confirmation timed out, leaving purchase for reconciliation"
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Broadcast with the configured backoff curve
    ///
    /// Only transport-level errors are retried. Exhausting the budget fails
    /// the purchase and releases its hold. A validation error, a missing
    /// user signature, comes straight back and leaves the purchase
    /// `tx_built` so the caller can resubmit.
    async fn broadcast_with_retry(
        &self,
        bundle: &UnsignedBundle,
        user_signature: Option<&str>,
        purchase_id: &str,
    ) -> CoreResult<String> {
        let attempts = if self.retry.allows_retry() {
            self.max_broadcast_attempts.max(1)
        } else {
            1
        };

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.builder.submit(bundle, user_signature).await {
                Ok(outcome) => {
                    if attempt > 1 {
                        info!(
                            purchase_id = %purchase_id,
                            attempt,
                            "Broadcast succeeded after retry"
                        );
                    }
                    return Ok(outcome.signature);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        purchase_id = %purchase_id,
                        attempt,
                        error = %e,
                        "Broadcast attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.fail_purchase(
            purchase_id,
            &format!(
                "broadcast failed after {} attempts: {}",
                attempts, last_error
            ),
        )
        .await?;
        Err(CoreError::RetryExhausted {
            attempts,
            last_error,
        })
    }

    // ==================== settle ====================

    /// Drive a purchase with a confirmed signature to `fulfilled`
    ///
    /// Safe to call again after a partial run: an already fulfilled
    /// purchase comes back unchanged. The supply decrement and reservation
    /// consumption happen inside the storage settlement, never here.
    pub async fn complete_fulfillment(&self, purchase_id: &str) -> CoreResult<Purchase> {
        let purchase = self
            .storage
            .get_purchase(purchase_id)
            .await?
            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;

        match purchase.status {
            PurchaseStatus::Fulfilled => return Ok(purchase),
            PurchaseStatus::Confirmed => {}
            PurchaseStatus::TxBuilt => {
                match self
                    .storage
                    .transition_purchase(
                        purchase_id,
                        PurchaseStatus::TxBuilt,
                        PurchaseStatus::Confirmed,
                        None,
                    )
                    .await
                {
                    Ok(_) => {}
                    Err(CoreError::InvalidState(_)) => {
                        // Lost the race to a concurrent settle. Re-read and
                        // fall through if the winner finished the job.
                        let current = self
                            .storage
                            .get_purchase(purchase_id)
                            .await?
                            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
                        match current.status {
                            PurchaseStatus::Fulfilled => return Ok(current),
                            PurchaseStatus::Confirmed => {}
                            other => {
                                return Err(CoreError::InvalidState(format!(
                                    "purchase {} is {}, cannot fulfill",
                                    purchase_id, other
                                )))
                            }
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            other => {
                return Err(CoreError::InvalidState(format!(
                    "purchase {} is {}, cannot fulfill",
                    purchase_id, other
                )))
            }
        }

        // Paid purchases decrement supply here; a gift already decremented
        // its balance at claim time.
        let fulfilled = match self
            .storage
            .fulfill_purchase(purchase_id, !purchase.is_gift())
            .await
        {
            Ok(purchase) => purchase,
            Err(CoreError::InvalidState(_)) => {
                let current = self
                    .storage
                    .get_purchase(purchase_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
                if current.status == PurchaseStatus::Fulfilled {
                    current
                } else {
                    return Err(CoreError::InvalidState(format!(
                        "purchase {} is {}, cannot fulfill",
                        purchase_id, current.status
                    )));
                }
            }
            Err(e) => return Err(e),
        };

        if let Some(bundle_id) = &fulfilled.bundle_id {
            self.storage.delete_pending_bundle(bundle_id).await?;
        }

        info!(
            purchase_id = %fulfilled.purchase_id,
            trait_id = %fulfilled.trait_id,
            signature = fulfilled.tx_signature.as_deref().unwrap_or(""),
            "Purchase fulfilled"
        );
        self.audit.record(
            ActorType::System,
            "purchase_fulfilled",
            json!({
                "purchase_id": fulfilled.purchase_id,
                "trait_id": fulfilled.trait_id,
                "wallet_address": fulfilled.wallet_address,
                "tx_signature": fulfilled.tx_signature,
            }),
        );

        Ok(fulfilled)
    }

    /// Handle a confirmation report for a bound signature
    ///
    /// Re-reads actual ledger state rather than trusting the report. A
    /// signature whose purchase is already terminal returns the existing
    /// record unchanged, so duplicate confirmations are no-ops. A still
    /// unsettled signature leaves the purchase pending.
    pub async fn confirm_signature(&self, signature: &str) -> CoreResult<Purchase> {
        let purchase = self
            .storage
            .get_purchase_by_signature(signature)
            .await?
            .ok_or_else(|| CoreError::not_found("purchase for signature", signature))?;
        if purchase.status.is_terminal() {
            debug!(
                signature = %signature,
                purchase_id = %purchase.purchase_id,
                status = %purchase.status,
                "Duplicate confirmation for settled purchase"
            );
            return Ok(purchase);
        }

        let status = self.monitor.probe(signature).await?;
        if self.monitor.meets_settlement(&status) {
            return self.complete_fulfillment(&purchase.purchase_id).await;
        }
        match status {
            SignatureStatus::Errored(reason) => {
                self.fail_purchase(
                    &purchase.purchase_id,
                    &format!("ledger rejected transaction: {}", reason),
                )
                .await
            }
            _ => {
                debug!(
                    signature = %signature,
                    status = ?status,
                    "Signature not settled yet, leaving purchase pending"
                );
                Ok(purchase)
            }
        }
    }

    // ==================== fail ====================

    /// Fail a purchase and release everything it holds
    ///
    /// Cancels the reservation when it is still held, credits a claimed
    /// gift unit back and drops the pending bundle. Failing an already
    /// terminal purchase is a no-op returning the current row, so
    /// concurrent failure paths release resources exactly once.
    pub async fn fail_purchase(&self, purchase_id: &str, reason: &str) -> CoreResult<Purchase> {
        let purchase = self
            .storage
            .get_purchase(purchase_id)
            .await?
            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
        if purchase.status.is_terminal() {
            return Ok(purchase);
        }

        let failed = match self
            .storage
            .transition_purchase(
                purchase_id,
                purchase.status,
                PurchaseStatus::Failed,
                Some(reason),
            )
            .await
        {
            Ok(purchase) => purchase,
            Err(CoreError::InvalidState(_)) => {
                // Someone else moved the purchase first. Terminal means the
                // winner already did the release work.
                let current = self
                    .storage
                    .get_purchase(purchase_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("purchase", purchase_id))?;
                if current.status.is_terminal() {
                    return Ok(current);
                }
                return self.retry_fail(&current, reason).await;
            }
            Err(e) => return Err(e),
        };

        self.release_failed(&failed, reason).await?;
        Ok(failed)
    }

    /// One more transition attempt after losing a status race
    async fn retry_fail(&self, purchase: &Purchase, reason: &str) -> CoreResult<Purchase> {
        let failed = self
            .storage
            .transition_purchase(
                &purchase.purchase_id,
                purchase.status,
                PurchaseStatus::Failed,
                Some(reason),
            )
            .await?;
        self.release_failed(&failed, reason).await?;
        Ok(failed)
    }

    async fn release_failed(&self, failed: &Purchase, reason: &str) -> CoreResult<()> {
        match self.storage.cancel_reservation(&failed.reservation_id).await {
            Ok(_) => {}
            // A consumed or already expired hold has nothing left to release
            Err(CoreError::InvalidState(_)) | Err(CoreError::NotFound { .. }) => {}
            Err(e) => {
                warn!(
                    reservation_id = %failed.reservation_id,
                    error = %e,
                    "Failed to release reservation"
                );
            }
        }

        if failed.is_gift() {
            self.gift
                .credit(&failed.wallet_address, &failed.trait_id, 1)
                .await?;
        }

        if let Some(bundle_id) = &failed.bundle_id {
            self.storage.delete_pending_bundle(bundle_id).await?;
        }

        warn!(
            purchase_id = %failed.purchase_id,
            reason = %reason,
            "Purchase failed"
        );
        self.audit.record(
            ActorType::System,
            "purchase_failed",
            json!({
                "purchase_id": failed.purchase_id,
                "trait_id": failed.trait_id,
                "wallet_address": failed.wallet_address,
                "reason": reason,
            }),
        );
        Ok(())
    }

    // ==================== queries ====================

    /// Fetch a purchase by id
    pub async fn purchase_status(&self, purchase_id: &str) -> CoreResult<Purchase> {
        self.storage
            .get_purchase(purchase_id)
            .await?
            .ok_or_else(|| CoreError::not_found("purchase", purchase_id))
    }

    /// Fetch the purchase a ledger signature settled, if any
    pub async fn purchase_by_signature(&self, signature: &str) -> CoreResult<Option<Purchase>> {
        self.storage.get_purchase_by_signature(signature).await
    }

    /// Purchases still waiting on settlement, oldest first
    ///
    /// `stale_before` filters to rows whose last status change is at or
    /// before the cutoff. Pending purchases are reported, never failed
    /// here; only reconciliation against ledger state moves them.
    pub async fn list_pending(&self, stale_before: Option<Timestamp>) -> CoreResult<Vec<Purchase>> {
        self.storage.list_pending_purchases(stale_before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::test_external::{RecordingAuditSink, StaticOwnership};
    use crate::ledger::test_ledger::ScriptedLedger;
    use crate::ledger::{SignatureStatus, SimulationResult};
    use crate::monitor::ConfirmationMonitor;
    use crate::reservations::ReservationManager;
    use crate::signer::DelegateSigner;
    use crate::storage::MemoryStorage;
    use crate::types::{Reservation, ReservationStatus, TraitListing};

    const WALLET: &str = "wallet_buyer";
    const ASSET: &str = "asset_42";
    const TRAIT: &str = "hat_crown";

    struct Harness {
        storage: Arc<dyn CheckoutStorage>,
        ledger: Arc<ScriptedLedger>,
        ownership: Arc<StaticOwnership>,
        audit: Arc<RecordingAuditSink>,
        orchestrator: PurchaseOrchestrator,
        reservations: ReservationManager,
        gift: GiftLedger,
    }

    async fn harness() -> Harness {
        let storage: Arc<dyn CheckoutStorage> = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(ScriptedLedger::happy_path(WALLET, ASSET));
        let ownership = Arc::new(StaticOwnership::new());
        ownership.grant(WALLET, ASSET);
        let audit = Arc::new(RecordingAuditSink::new());

        let mut config = CoreConfig::development();
        config.confirmation.poll_interval_ms = 1;
        config.confirmation.max_polls = 5;

        let delegate = Arc::new(DelegateSigner::generate(&config.delegate.authority_address));
        let builder = TransactionBuilder::new(
            Arc::clone(&ledger) as Arc<dyn crate::ledger::LedgerClient>,
            delegate,
            config.metadata_base_uri.clone(),
        );
        let monitor = ConfirmationMonitor::new(
            Arc::clone(&ledger) as Arc<dyn crate::ledger::LedgerClient>,
            config.confirmation.clone(),
        );
        let orchestrator = PurchaseOrchestrator::new(
            Arc::clone(&storage),
            builder,
            monitor,
            Arc::clone(&ownership) as Arc<dyn OwnershipVerifier>,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            &config,
        );

        storage
            .upsert_listing(&TraitListing::limited(TRAIT, 5, 1_000_000))
            .await
            .unwrap();

        Harness {
            reservations: ReservationManager::new(Arc::clone(&storage), 600),
            gift: GiftLedger::new(Arc::clone(&storage)),
            storage,
            ledger,
            ownership,
            audit,
            orchestrator,
        }
    }

    async fn reserve(h: &Harness) -> String {
        h.reservations
            .reserve(TRAIT, WALLET, ASSET)
            .await
            .unwrap()
            .reservation()
            .reservation_id
            .clone()
    }

    #[tokio::test]
    async fn test_paid_checkout_reaches_fulfilled() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;

        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();
        assert_eq!(built.purchase.status, PurchaseStatus::TxBuilt);
        assert_eq!(built.purchase.price_amount, 1_000_000);
        assert_eq!(built.bundle.required_signatures, vec![WALLET.to_string()]);
        assert!(built.bundle.payment_instruction().is_some());

        let settled = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap();
        assert_eq!(settled.status, PurchaseStatus::Fulfilled);
        assert!(settled.tx_signature.is_some());

        // Supply dropped and the hold was consumed in the same settlement
        let listing = h.storage.get_listing(TRAIT).await.unwrap().unwrap();
        assert_eq!(listing.remaining_supply, 4);
        let reservation = h.storage.get_reservation(&reservation_id).await.unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Consumed);

        // The bundle row is gone once settled
        assert!(h
            .storage
            .get_pending_bundle(&built.bundle.bundle_id)
            .await
            .unwrap()
            .is_none());

        let actions = h.audit.actions();
        assert!(actions.contains(&"purchase_created".to_string()));
        assert!(actions.contains(&"purchase_tx_built".to_string()));
        assert!(actions.contains(&"purchase_fulfilled".to_string()));
    }

    #[tokio::test]
    async fn test_gift_checkout_skips_payment_and_decrements_balance() {
        let h = harness().await;
        h.gift.credit(WALLET, TRAIT, 2).await.unwrap();
        let reservation_id = reserve(&h).await;

        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();
        assert_eq!(built.purchase.price_amount, 0);
        assert!(built.purchase.is_gift());
        assert!(built.bundle.payment_instruction().is_none());
        assert!(built.bundle.update_instruction().is_some());
        assert!(built.bundle.required_signatures.is_empty());

        // Claimed at build time
        let balance = h.gift.balance(WALLET, TRAIT).await.unwrap();
        assert_eq!(balance.qty_available, 1);

        // No user signature needed for a gift
        let settled = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, None)
            .await
            .unwrap();
        assert_eq!(settled.status, PurchaseStatus::Fulfilled);

        // Gift settlement leaves paid supply untouched
        let listing = h.storage.get_listing(TRAIT).await.unwrap().unwrap();
        assert_eq!(listing.remaining_supply, 5);
    }

    #[tokio::test]
    async fn test_empty_gift_balance_falls_back_to_paid() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;

        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();
        assert!(!built.purchase.is_gift());
        assert_eq!(built.purchase.price_amount, 1_000_000);
        assert!(built.bundle.payment_instruction().is_some());
    }

    #[tokio::test]
    async fn test_ownership_failure_fails_purchase_before_ledger() {
        let h = harness().await;
        h.ownership.revoke(WALLET, ASSET);
        let reservation_id = reserve(&h).await;

        let err = h
            .orchestrator
            .build_transaction(&reservation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Ownership { .. }));

        // Nothing reached the ledger
        assert_eq!(h.ledger.broadcast_count(), 0);

        // The purchase failed and the hold was released
        let pending = h.orchestrator.list_pending(None).await.unwrap();
        assert!(pending.is_empty());
        let reservation = h.storage.get_reservation(&reservation_id).await.unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_failed_gift_purchase_credits_balance_back() {
        let h = harness().await;
        h.gift.credit(WALLET, TRAIT, 1).await.unwrap();
        h.ownership.revoke(WALLET, ASSET);
        let reservation_id = reserve(&h).await;

        let err = h
            .orchestrator
            .build_transaction(&reservation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Ownership { .. }));

        // The claimed unit came back
        let balance = h.gift.balance(WALLET, TRAIT).await.unwrap();
        assert_eq!(balance.qty_available, 1);
    }

    #[tokio::test]
    async fn test_expired_hold_rejected_at_build() {
        let h = harness().await;

        // A zero-TTL hold lapses the moment it exists
        let candidate = Reservation::new(TRAIT, WALLET, ASSET, 0);
        h.storage
            .create_reservation(&candidate, Timestamp::now())
            .await
            .unwrap();

        let err = h
            .orchestrator
            .build_transaction(&candidate.reservation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ReservationExpired(_)));
        assert!(h.orchestrator.list_pending(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consumed_hold_rejected_at_build() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        h.reservations.consume(&reservation_id).await.unwrap();

        let err = h
            .orchestrator
            .build_transaction(&reservation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_simulation_failure_fails_purchase_and_releases_hold() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        h.ledger
            .set_simulation(SimulationResult::failed_at(0, "insufficient funds"));
        let err = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Simulation(_)));

        let purchase = h
            .orchestrator
            .purchase_status(&built.purchase.purchase_id)
            .await
            .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Failed);
        assert!(purchase
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("insufficient funds"));

        let reservation = h.storage.get_reservation(&reservation_id).await.unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);

        // Failed purchases cannot be resubmitted; the bundle row is gone
        assert!(h
            .storage
            .get_pending_bundle(&built.bundle.bundle_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_broadcast_retries_until_success() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        // Two transport failures, then the third attempt lands
        h.ledger.fail_broadcasts(2);
        let settled = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap();
        assert_eq!(settled.status, PurchaseStatus::Fulfilled);
        assert_eq!(h.ledger.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_exhaustion_fails_purchase() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        // More failures than the three-attempt development budget
        h.ledger.fail_broadcasts(10);
        let err = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RetryExhausted { attempts: 3, .. }));

        let purchase = h
            .orchestrator
            .purchase_status(&built.purchase.purchase_id)
            .await
            .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Failed);
        let reservation = h.storage.get_reservation(&reservation_id).await.unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_user_signature_leaves_purchase_resubmittable() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        let err = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        // Still tx_built; a second submit with the signature succeeds
        let purchase = h
            .orchestrator
            .purchase_status(&built.purchase.purchase_id)
            .await
            .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::TxBuilt);

        let settled = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap();
        assert_eq!(settled.status, PurchaseStatus::Fulfilled);
    }

    #[tokio::test]
    async fn test_resubmit_of_fulfilled_purchase_is_noop() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        h.ledger.set_next_signature("sig123");
        let first = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap();
        assert_eq!(first.status, PurchaseStatus::Fulfilled);
        assert_eq!(first.tx_signature.as_deref(), Some("sig123"));

        // A duplicate confirmation for the same signature is a no-op
        // returning the record unchanged
        let replay = h.orchestrator.confirm_signature("sig123").await.unwrap();
        assert_eq!(replay.purchase_id, first.purchase_id);
        assert_eq!(replay.status, PurchaseStatus::Fulfilled);
        assert_eq!(replay.updated_at, first.updated_at);

        // Supply came off exactly once
        let listing = h.storage.get_listing(TRAIT).await.unwrap().unwrap();
        assert_eq!(listing.remaining_supply, 4);
    }

    #[tokio::test]
    async fn test_confirm_signature_settles_a_timed_out_purchase() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        h.ledger.set_next_signature("sig_late");
        h.ledger
            .script_status("sig_late", vec![SignatureStatus::NotObserved]);
        let err = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConfirmationTimeout { .. }));

        // The ledger catches up; a confirmation report now settles it
        h.ledger
            .script_status("sig_late", vec![SignatureStatus::Confirmed]);
        let settled = h.orchestrator.confirm_signature("sig_late").await.unwrap();
        assert_eq!(settled.status, PurchaseStatus::Fulfilled);

        let listing = h.storage.get_listing(TRAIT).await.unwrap().unwrap();
        assert_eq!(listing.remaining_supply, 4);
        let reservation = h.storage.get_reservation(&reservation_id).await.unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Consumed);
    }

    #[tokio::test]
    async fn test_ledger_rejection_returns_failed_purchase() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        h.ledger.set_next_signature("sig_err");
        h.ledger.script_status(
            "sig_err",
            vec![SignatureStatus::Errored("slippage exceeded".to_string())],
        );

        let settled = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap();
        assert_eq!(settled.status, PurchaseStatus::Failed);
        assert!(settled
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("slippage exceeded"));

        // Supply untouched, hold released
        let listing = h.storage.get_listing(TRAIT).await.unwrap().unwrap();
        assert_eq!(listing.remaining_supply, 5);
        let reservation = h.storage.get_reservation(&reservation_id).await.unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_leaves_purchase_pending() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;
        let built = h.orchestrator.build_transaction(&reservation_id).await.unwrap();

        h.ledger.set_next_signature("sig_slow");
        h.ledger
            .script_status("sig_slow", vec![SignatureStatus::NotObserved]);

        let err = h
            .orchestrator
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConfirmationTimeout { .. }));

        // Signature bound, status unchanged; reconciliation owns it now
        let purchase = h
            .orchestrator
            .purchase_status(&built.purchase.purchase_id)
            .await
            .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::TxBuilt);
        assert_eq!(purchase.tx_signature.as_deref(), Some("sig_slow"));

        // The bundle survives for the reconciliation pass
        assert!(h
            .storage
            .get_pending_bundle(&built.bundle.bundle_id)
            .await
            .unwrap()
            .is_some());

        let stale = h
            .orchestrator
            .list_pending(Some(Timestamp::now().plus_secs(1)))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].purchase_id, purchase.purchase_id);
    }

    #[tokio::test]
    async fn test_inactive_listing_rejected_before_purchase_row() {
        let h = harness().await;
        let reservation_id = reserve(&h).await;

        let mut listing = h.storage.get_listing(TRAIT).await.unwrap().unwrap();
        listing.active = false;
        h.storage.upsert_listing(&listing).await.unwrap();

        let err = h
            .orchestrator
            .build_transaction(&reservation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(h.orchestrator.list_pending(None).await.unwrap().is_empty());
    }
}
