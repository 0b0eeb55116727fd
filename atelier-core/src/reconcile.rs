//! Ledger-first reconciliation of stuck purchases
//!
//! A purchase can stall with its outcome unknown: confirmation polling
//! timed out, the process died between broadcast and bookkeeping, or a
//! buyer walked away before signing. Reconciliation resolves these rows
//! from actual ledger state instead of guessing. A purchase whose bound
//! signature settled on the ledger is fulfilled no matter how late the
//! answer arrives; only rows the ledger rejected, or rows that never
//! broadcast anything inside the grace window, are failed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CoreResult;
use crate::orchestrator::PurchaseOrchestrator;
use crate::storage::CheckoutStorage;
use crate::types::{PurchaseStatus, Timestamp};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Stale pending purchases examined
    pub examined: usize,
    /// Purchases whose transaction had settled and are now fulfilled
    pub fulfilled: usize,
    /// Purchases failed and released
    pub failed: usize,
    /// Purchases left pending for a later pass
    pub still_pending: usize,
    /// When the pass ran
    pub ran_at: Timestamp,
}

/// Resolves purchases stuck past the pending grace window
pub struct Reconciler {
    storage: Arc<dyn CheckoutStorage>,
    orchestrator: Arc<PurchaseOrchestrator>,
    pending_grace_secs: u64,
}

impl Reconciler {
    /// Create a reconciler over shared storage and the orchestrator
    pub fn new(
        storage: Arc<dyn CheckoutStorage>,
        orchestrator: Arc<PurchaseOrchestrator>,
        pending_grace_secs: u64,
    ) -> Self {
        Self {
            storage,
            orchestrator,
            pending_grace_secs,
        }
    }

    /// Run one reconciliation pass over every stale pending purchase
    ///
    /// A purchase with a bound signature is resolved through a ledger
    /// probe: settled means fulfilled, rejected means failed, anything
    /// else stays pending for the next pass. A purchase with no signature
    /// has nothing to probe; past the grace window it is failed and its
    /// hold released. Per-row errors are logged and counted, never abort
    /// the pass.
    pub async fn run(&self) -> CoreResult<ReconcileReport> {
        let now = Timestamp::now();
        let cutoff = now.minus_secs(self.pending_grace_secs);
        let stale = self.storage.list_pending_purchases(Some(cutoff)).await?;

        let mut report = ReconcileReport {
            examined: stale.len(),
            fulfilled: 0,
            failed: 0,
            still_pending: 0,
            ran_at: now,
        };

        for purchase in stale {
            match purchase.tx_signature.as_deref() {
                Some(signature) => {
                    match self.orchestrator.confirm_signature(signature).await {
                        Ok(resolved) => match resolved.status {
                            PurchaseStatus::Fulfilled => {
                                info!(
                                    purchase_id = %resolved.purchase_id,
                                    signature = %signature,
                                    "Reconciled stale purchase as fulfilled"
                                );
                                report.fulfilled += 1;
                            }
                            PurchaseStatus::Failed => {
                                report.failed += 1;
                            }
                            _ => {
                                debug!(
                                    purchase_id = %resolved.purchase_id,
                                    "Signature still unsettled, leaving purchase pending"
                                );
                                report.still_pending += 1;
                            }
                        },
                        Err(e) => {
                            warn!(
                                purchase_id = %purchase.purchase_id,
                                error = %e,
                                "Reconciliation probe failed"
                            );
                            report.still_pending += 1;
                        }
                    }
                }
                None => {
                    match self
                        .orchestrator
                        .fail_purchase(
                            &purchase.purchase_id,
                            "no transaction broadcast within the grace window",
                        )
                        .await
                    {
                        Ok(_) => report.failed += 1,
                        Err(e) => {
                            warn!(
                                purchase_id = %purchase.purchase_id,
                                error = %e,
                                "Failed to release abandoned purchase"
                            );
                            report.still_pending += 1;
                        }
                    }
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                fulfilled = report.fulfilled,
                failed = report.failed,
                still_pending = report.still_pending,
                "Reconciliation pass complete"
            );
        } else {
            debug!("Reconciliation pass found nothing stale");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::TransactionBuilder;
    use crate::config::CoreConfig;
    use crate::error::CoreError;
    use crate::external::test_external::{RecordingAuditSink, StaticOwnership};
    use crate::external::{AuditSink, OwnershipVerifier};
    use crate::ledger::test_ledger::ScriptedLedger;
    use crate::ledger::{LedgerClient, SignatureStatus};
    use crate::monitor::ConfirmationMonitor;
    use crate::reservations::ReservationManager;
    use crate::signer::DelegateSigner;
    use crate::storage::{CheckoutStorage, MemoryStorage};
    use crate::types::{ReservationStatus, TraitListing};

    const WALLET: &str = "wallet_buyer";
    const ASSET: &str = "asset_42";
    const TRAIT: &str = "hat_crown";

    struct Rig {
        storage: Arc<dyn CheckoutStorage>,
        ledger: Arc<ScriptedLedger>,
        orchestrator: Arc<PurchaseOrchestrator>,
        reservations: ReservationManager,
    }

    async fn rig() -> Rig {
        let storage: Arc<dyn CheckoutStorage> = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(ScriptedLedger::happy_path(WALLET, ASSET));
        let ownership = Arc::new(StaticOwnership::new());
        ownership.grant(WALLET, ASSET);

        let mut config = CoreConfig::development();
        config.confirmation.poll_interval_ms = 1;
        config.confirmation.max_polls = 3;

        let delegate = Arc::new(DelegateSigner::generate(&config.delegate.authority_address));
        let builder = TransactionBuilder::new(
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            delegate,
            config.metadata_base_uri.clone(),
        );
        let monitor = ConfirmationMonitor::new(
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            config.confirmation.clone(),
        );
        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            Arc::clone(&storage),
            builder,
            monitor,
            ownership as Arc<dyn OwnershipVerifier>,
            Arc::new(RecordingAuditSink::new()) as Arc<dyn AuditSink>,
            &config,
        ));

        storage
            .upsert_listing(&TraitListing::limited(TRAIT, 5, 1_000_000))
            .await
            .unwrap();

        Rig {
            reservations: ReservationManager::new(Arc::clone(&storage), 600),
            storage,
            ledger,
            orchestrator,
        }
    }

    impl Rig {
        fn reconciler(&self, grace_secs: u64) -> Reconciler {
            Reconciler::new(
                Arc::clone(&self.storage),
                Arc::clone(&self.orchestrator),
                grace_secs,
            )
        }

        /// Drive a purchase to tx_built with a bound signature that never
        /// settled, the state a confirmation timeout leaves behind
        async fn timed_out_purchase(&self, signature: &str) -> (String, String) {
            let reservation_id = self
                .reservations
                .reserve(TRAIT, WALLET, ASSET)
                .await
                .unwrap()
                .reservation()
                .reservation_id
                .clone();
            let built = self
                .orchestrator
                .build_transaction(&reservation_id)
                .await
                .unwrap();

            self.ledger.set_next_signature(signature);
            self.ledger
                .script_status(signature, vec![SignatureStatus::NotObserved]);
            let err = self
                .orchestrator
                .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::ConfirmationTimeout { .. }));

            (built.purchase.purchase_id.clone(), reservation_id)
        }
    }

    #[tokio::test]
    async fn test_settled_signature_reconciles_to_fulfilled() {
        let r = rig().await;
        let (purchase_id, reservation_id) = r.timed_out_purchase("sig_recon_1").await;

        // The ledger caught up after the poll budget ran out
        r.ledger
            .script_status("sig_recon_1", vec![SignatureStatus::Finalized]);

        let report = r.reconciler(0).run().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.fulfilled, 1);
        assert_eq!(report.failed, 0);

        let purchase = r.storage.get_purchase(&purchase_id).await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Fulfilled);
        let reservation = r
            .storage
            .get_reservation(&reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Consumed);
        let listing = r.storage.get_listing(TRAIT).await.unwrap().unwrap();
        assert_eq!(listing.remaining_supply, 4);
    }

    #[tokio::test]
    async fn test_rejected_signature_reconciles_to_failed() {
        let r = rig().await;
        let (purchase_id, reservation_id) = r.timed_out_purchase("sig_recon_2").await;

        r.ledger.script_status(
            "sig_recon_2",
            vec![SignatureStatus::Errored("blockhash expired".to_string())],
        );

        let report = r.reconciler(0).run().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.failed, 1);

        let purchase = r.storage.get_purchase(&purchase_id).await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Failed);
        assert!(purchase
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("blockhash expired"));

        // Hold released, supply untouched
        let reservation = r
            .storage
            .get_reservation(&reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);
        let listing = r.storage.get_listing(TRAIT).await.unwrap().unwrap();
        assert_eq!(listing.remaining_supply, 5);
    }

    #[tokio::test]
    async fn test_unsettled_signature_stays_pending() {
        let r = rig().await;
        let (purchase_id, _) = r.timed_out_purchase("sig_recon_3").await;

        // Still nothing on the ledger; never auto-failed
        let report = r.reconciler(0).run().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.still_pending, 1);
        assert_eq!(report.failed, 0);

        let purchase = r.storage.get_purchase(&purchase_id).await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::TxBuilt);
    }

    #[tokio::test]
    async fn test_purchase_without_signature_fails_past_grace() {
        let r = rig().await;
        let reservation_id = r
            .reservations
            .reserve(TRAIT, WALLET, ASSET)
            .await
            .unwrap()
            .reservation()
            .reservation_id
            .clone();
        let built = r
            .orchestrator
            .build_transaction(&reservation_id)
            .await
            .unwrap();

        // Built but never submitted; nothing to probe on the ledger
        let report = r.reconciler(0).run().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.failed, 1);

        let purchase = r
            .storage
            .get_purchase(&built.purchase.purchase_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Failed);
        let reservation = r
            .storage
            .get_reservation(&reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);

        // The abandoned bundle row is cleaned up with the purchase
        assert!(r
            .storage
            .get_pending_bundle(&built.bundle.bundle_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fresh_purchases_are_outside_scope() {
        let r = rig().await;
        let _ = r.timed_out_purchase("sig_recon_4").await;

        // A generous grace window keeps the fresh row out of the pass
        let report = r.reconciler(600).run().await.unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(report.still_pending, 0);
    }
}
