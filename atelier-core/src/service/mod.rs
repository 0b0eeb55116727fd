//! Checkout service layer
//!
//! Wires storage, the ledger client, the reservation manager, the
//! transaction builder and the purchase orchestrator into one facade.
//! The service owns the background runner for periodic sweeps and
//! reconciliation and records metrics around every operation.
//!
//! ```rust,ignore
//! use atelier_core::{CheckoutService, CheckoutServiceConfig};
//!
//! async fn example() -> atelier_core::CoreResult<()> {
//!     let storage = Arc::new(SledStorage::new(&StorageConfig::default())?);
//!     let service = CheckoutService::builder()
//!         .config(CheckoutServiceConfig::development())
//!         .storage(storage)
//!         .build()?;
//!     service.start().await?;
//!
//!     let hold = service.reserve_trait("hat_crown", "wallet", "asset").await?;
//!     let built = service.build_transaction(&hold.reservation().reservation_id).await?;
//!     let settled = service
//!         .submit_transaction(&built.bundle.bundle_id, Some("signature"))
//!         .await?;
//!     Ok(())
//! }
//! ```

mod builder;
mod runner;

pub use builder::CheckoutServiceBuilder;
pub use runner::{BackgroundRunner, RunnerHandle};

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::bundle::UnsignedBundle;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::gift::GiftLedger;
use crate::ledger::LedgerClient;
use crate::metrics::{CheckoutMetrics, MetricsSnapshot};
use crate::orchestrator::{BuildOutcome, PurchaseOrchestrator};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::reservations::ReservationManager;
use crate::storage::{CheckoutStorage, ReserveOutcome, StorageStats};
use crate::sweep::{CleanupSweep, SweepReport};
use crate::types::{GiftBalance, Purchase, PurchaseStatus, Reservation, Timestamp, TraitListing};

/// Service configuration
#[derive(Debug, Clone)]
pub struct CheckoutServiceConfig {
    /// Engine configuration
    pub core: CoreConfig,
    /// Seconds between cleanup sweeps
    pub sweep_interval_secs: u64,
    /// Seconds between reconciliation passes
    pub reconcile_interval_secs: u64,
    /// Whether `start` launches the background runner
    pub enable_background: bool,
}

impl Default for CheckoutServiceConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            sweep_interval_secs: 60,
            reconcile_interval_secs: 120,
            enable_background: true,
        }
    }
}

impl CheckoutServiceConfig {
    /// Development configuration: tight intervals, fast backoff
    pub fn development() -> Self {
        Self {
            core: CoreConfig::development(),
            sweep_interval_secs: 10,
            reconcile_interval_secs: 15,
            enable_background: true,
        }
    }

    /// Production configuration
    pub fn production() -> Self {
        Self {
            core: CoreConfig::from_env(),
            sweep_interval_secs: 60,
            reconcile_interval_secs: 300,
            enable_background: true,
        }
    }
}

/// Service lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Built but not started
    Initializing,
    /// Accepting operations
    Running,
    /// Operations refused, background work idle
    Paused,
    /// Shut down
    Stopped,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Combined service statistics
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    /// When `start` was called
    pub started_at: Option<Timestamp>,
    /// Row counts from storage
    pub storage: StorageStats,
    /// Flow counters and timings
    pub metrics: MetricsSnapshot,
}

/// The checkout engine behind one facade
pub struct CheckoutService {
    config: CheckoutServiceConfig,
    storage: Arc<dyn CheckoutStorage>,
    ledger: Arc<dyn LedgerClient>,
    reservations: Arc<ReservationManager>,
    gift: Arc<GiftLedger>,
    orchestrator: Arc<PurchaseOrchestrator>,
    sweep: Arc<CleanupSweep>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<CheckoutMetrics>,
    status: Arc<RwLock<ServiceStatus>>,
    started_at: Arc<RwLock<Option<Timestamp>>>,
    runner_handle: Arc<RwLock<Option<RunnerHandle>>>,
}

impl CheckoutService {
    /// Start building a service
    pub fn builder() -> CheckoutServiceBuilder {
        CheckoutServiceBuilder::new()
    }

    /// Current lifecycle status
    pub async fn status(&self) -> ServiceStatus {
        *self.status.read().await
    }

    async fn ensure_accepting(&self) -> CoreResult<()> {
        match self.status().await {
            ServiceStatus::Stopped => Err(CoreError::InvalidState(
                "service is stopped".to_string(),
            )),
            ServiceStatus::Paused => Err(CoreError::InvalidState(
                "service is paused".to_string(),
            )),
            _ => Ok(()),
        }
    }

    // ==================== reservations ====================

    /// Reserve one unit of a trait for a wallet/asset pair
    pub async fn reserve_trait(
        &self,
        trait_id: &str,
        wallet_address: &str,
        asset_id: &str,
    ) -> CoreResult<ReserveOutcome> {
        self.ensure_accepting().await?;
        self.metrics.hold_requested();

        match self
            .reservations
            .reserve(trait_id, wallet_address, asset_id)
            .await
        {
            Ok(outcome) => {
                self.metrics.hold_granted(outcome.is_reissued());
                Ok(outcome)
            }
            Err(e) => {
                if matches!(e, CoreError::OutOfStock { .. }) {
                    self.metrics.hold_rejected_out_of_stock();
                }
                Err(e)
            }
        }
    }

    /// Release a hold before settlement
    pub async fn cancel_reservation(&self, reservation_id: &str) -> CoreResult<Reservation> {
        let reservation = self.reservations.cancel(reservation_id).await?;
        self.metrics.hold_cancelled();
        Ok(reservation)
    }

    /// Fetch a hold
    pub async fn get_reservation(&self, reservation_id: &str) -> CoreResult<Reservation> {
        self.reservations.get(reservation_id).await
    }

    // ==================== purchases ====================

    /// Build the settlement bundle for an active reservation
    pub async fn build_transaction(&self, reservation_id: &str) -> CoreResult<BuildOutcome> {
        self.ensure_accepting().await?;
        let built = self.orchestrator.build_transaction(reservation_id).await?;
        self.metrics.purchase_started(built.purchase.is_gift());
        if built.purchase.is_gift() {
            self.metrics.gift_claimed();
        }
        Ok(built)
    }

    /// Submit a built bundle and drive the purchase to a settled state
    pub async fn submit_transaction(
        &self,
        bundle_id: &str,
        user_signature: Option<&str>,
    ) -> CoreResult<Purchase> {
        self.ensure_accepting().await?;
        self.metrics.broadcast_attempted();

        let started = Instant::now();
        let result = self
            .orchestrator
            .submit_transaction(bundle_id, user_signature)
            .await;
        self.metrics.observe_submit_duration(started.elapsed()).await;

        match &result {
            Ok(purchase) => match purchase.status {
                PurchaseStatus::Fulfilled => {
                    self.metrics.purchase_fulfilled(purchase.is_gift());
                    let settlement = purchase
                        .updated_at
                        .as_millis()
                        .saturating_sub(purchase.created_at.as_millis());
                    self.metrics
                        .observe_settlement_time(Duration::from_millis(settlement))
                        .await;
                }
                PurchaseStatus::Failed => {
                    self.metrics.purchase_failed(purchase.is_gift());
                }
                _ => {}
            },
            Err(CoreError::ConfirmationTimeout { .. }) => {
                self.metrics.confirmation_timed_out();
            }
            Err(_) => {}
        }

        result
    }

    /// Handle a confirmation report for a bound signature
    pub async fn confirm_signature(&self, signature: &str) -> CoreResult<Purchase> {
        self.orchestrator.confirm_signature(signature).await
    }

    /// Fetch a purchase
    pub async fn get_purchase(&self, purchase_id: &str) -> CoreResult<Purchase> {
        self.orchestrator.purchase_status(purchase_id).await
    }

    /// Fetch the purchase a signature settled, if any
    pub async fn get_purchase_by_signature(
        &self,
        signature: &str,
    ) -> CoreResult<Option<Purchase>> {
        self.orchestrator.purchase_by_signature(signature).await
    }

    /// Purchases still waiting on settlement
    ///
    /// With `stale_only`, restricts to rows older than the pending grace
    /// window, the set the next reconciliation pass will examine.
    pub async fn list_pending_purchases(&self, stale_only: bool) -> CoreResult<Vec<Purchase>> {
        let cutoff = if stale_only {
            Some(Timestamp::now().minus_secs(self.config.core.pending_grace_secs))
        } else {
            None
        };
        self.orchestrator.list_pending(cutoff).await
    }

    // ==================== gift balances ====================

    /// Current gift balance for a wallet and trait
    pub async fn gift_balance(&self, wallet_address: &str, trait_id: &str) -> CoreResult<GiftBalance> {
        self.gift.balance(wallet_address, trait_id).await
    }

    /// Grant gift units to a wallet
    pub async fn credit_gift(
        &self,
        wallet_address: &str,
        trait_id: &str,
        qty: u64,
    ) -> CoreResult<GiftBalance> {
        let balance = self.gift.credit(wallet_address, trait_id, qty).await?;
        self.metrics.gift_credited();
        Ok(balance)
    }

    // ==================== catalog ====================

    /// Create or replace a trait listing
    pub async fn upsert_listing(&self, listing: &TraitListing) -> CoreResult<()> {
        self.storage.upsert_listing(listing).await
    }

    /// Fetch a trait listing
    pub async fn get_listing(&self, trait_id: &str) -> CoreResult<TraitListing> {
        self.storage
            .get_listing(trait_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trait", trait_id))
    }

    /// All trait listings
    pub async fn list_listings(&self) -> CoreResult<Vec<TraitListing>> {
        self.storage.list_listings().await
    }

    // ==================== background work ====================

    /// Expire every lapsed hold now
    pub async fn run_sweep(&self) -> CoreResult<SweepReport> {
        let report = self.sweep.run().await?;
        self.metrics.sweep_completed(report.expired_count);
        Ok(report)
    }

    /// Run one reconciliation pass now
    pub async fn run_reconciliation(&self) -> CoreResult<ReconcileReport> {
        let report = self.reconciler.run().await?;
        self.metrics
            .reconcile_completed(report.fulfilled as u64, report.failed as u64);
        Ok(report)
    }

    // ==================== introspection ====================

    /// Combined statistics with gauges refreshed from storage
    pub async fn stats(&self) -> CoreResult<ServiceStats> {
        let storage_stats = self.storage.get_stats().await?;
        self.metrics
            .set_storage_state(
                storage_stats.active_reservations,
                storage_stats.pending_purchases,
            )
            .await;

        Ok(ServiceStats {
            started_at: *self.started_at.read().await,
            storage: storage_stats,
            metrics: self.metrics.snapshot().await,
        })
    }

    /// Prometheus text exposition of the flow counters
    pub async fn prometheus_metrics(&self) -> String {
        self.metrics.prometheus_export().await
    }

    /// Whether storage answers; readiness probe
    pub async fn ready(&self) -> CoreResult<()> {
        self.storage.get_stats().await?;
        Ok(())
    }

    /// The service configuration
    pub fn config(&self) -> &CheckoutServiceConfig {
        &self.config
    }

    /// Shared storage handle
    pub fn storage(&self) -> &Arc<dyn CheckoutStorage> {
        &self.storage
    }

    /// Shared ledger handle
    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// The metrics collector
    pub fn metrics(&self) -> &Arc<CheckoutMetrics> {
        &self.metrics
    }

    // ==================== lifecycle ====================

    /// Mark the service running and launch the background runner
    pub async fn start(&self) -> CoreResult<()> {
        info!("Starting checkout service");

        {
            let mut status = self.status.write().await;
            *status = ServiceStatus::Running;
        }
        {
            let mut started_at = self.started_at.write().await;
            *started_at = Some(Timestamp::now());
        }

        if self.config.enable_background {
            let runner = BackgroundRunner::new(
                Arc::clone(&self.storage),
                Arc::clone(&self.sweep),
                Arc::clone(&self.reconciler),
                Arc::clone(&self.metrics),
                self.config.sweep_interval_secs,
                self.config.reconcile_interval_secs,
            );
            let handle = runner.start().await;
            let mut runner_handle = self.runner_handle.write().await;
            *runner_handle = Some(handle);
        }

        info!("Checkout service started");
        Ok(())
    }

    /// Stop the background runner and refuse further operations
    pub async fn stop(&self) -> CoreResult<()> {
        info!("Stopping checkout service");

        {
            let mut runner_handle = self.runner_handle.write().await;
            if let Some(handle) = runner_handle.take() {
                handle.stop().await;
            }
        }
        {
            let mut status = self.status.write().await;
            *status = ServiceStatus::Stopped;
        }

        info!("Checkout service stopped");
        Ok(())
    }

    /// Pause operations; background work idles
    pub async fn pause(&self) -> CoreResult<()> {
        {
            let mut status = self.status.write().await;
            *status = ServiceStatus::Paused;
        }
        let runner_handle = self.runner_handle.read().await;
        if let Some(handle) = runner_handle.as_ref() {
            handle.pause().await;
        }
        info!("Checkout service paused");
        Ok(())
    }

    /// Resume a paused service
    pub async fn resume(&self) -> CoreResult<()> {
        {
            let mut status = self.status.write().await;
            *status = ServiceStatus::Running;
        }
        let runner_handle = self.runner_handle.read().await;
        if let Some(handle) = runner_handle.as_ref() {
            handle.resume().await;
        }
        info!("Checkout service resumed");
        Ok(())
    }

    /// Make a bundle's wire encoding available to callers
    ///
    /// The API hands this to wallets for signing.
    pub fn encode_bundle(&self, bundle: &UnsignedBundle) -> CoreResult<String> {
        bundle.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::test_external::StaticOwnership;
    use crate::ledger::test_ledger::ScriptedLedger;
    use crate::storage::MemoryStorage;
    use crate::types::ReservationStatus;

    const WALLET: &str = "wallet_buyer";
    const ASSET: &str = "asset_42";
    const TRAIT: &str = "hat_crown";

    async fn service() -> (CheckoutService, Arc<ScriptedLedger>) {
        let ledger = Arc::new(ScriptedLedger::happy_path(WALLET, ASSET));
        let ownership = Arc::new(StaticOwnership::new());
        ownership.grant(WALLET, ASSET);

        let mut config = CheckoutServiceConfig::development();
        config.core.confirmation.poll_interval_ms = 1;
        config.core.confirmation.max_polls = 5;
        config.enable_background = false;

        let service = CheckoutService::builder()
            .config(config)
            .storage(Arc::new(MemoryStorage::new()))
            .ledger(Arc::clone(&ledger) as Arc<dyn LedgerClient>)
            .ownership(ownership)
            .build()
            .unwrap();
        service
            .upsert_listing(&TraitListing::limited(TRAIT, 3, 500_000))
            .await
            .unwrap();
        service.start().await.unwrap();

        (service, ledger)
    }

    #[tokio::test]
    async fn test_full_checkout_through_facade() {
        let (service, _ledger) = service().await;

        let hold = service.reserve_trait(TRAIT, WALLET, ASSET).await.unwrap();
        let reservation_id = hold.reservation().reservation_id.clone();

        let built = service.build_transaction(&reservation_id).await.unwrap();
        let settled = service
            .submit_transaction(&built.bundle.bundle_id, Some("user_sig"))
            .await
            .unwrap();
        assert_eq!(settled.status, PurchaseStatus::Fulfilled);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.storage.fulfilled_purchases, 1);
        assert_eq!(stats.metrics.holds_requested, 1);
        assert_eq!(stats.metrics.purchases_fulfilled, 1);
        assert_eq!(stats.metrics.settlement_time.count, 1);
    }

    #[tokio::test]
    async fn test_stopped_service_refuses_operations() {
        let (service, _ledger) = service().await;
        service.stop().await.unwrap();

        let err = service
            .reserve_trait(TRAIT, WALLET, ASSET)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(service.status().await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (service, _ledger) = service().await;

        service.pause().await.unwrap();
        assert!(service.reserve_trait(TRAIT, WALLET, ASSET).await.is_err());

        service.resume().await.unwrap();
        assert!(service.reserve_trait(TRAIT, WALLET, ASSET).await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_through_facade_counts_metrics() {
        let (service, _ledger) = service().await;

        let report = service.run_sweep().await.unwrap();
        assert_eq!(report.expired_count, 0);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.metrics.sweep_runs, 1);
    }

    #[tokio::test]
    async fn test_out_of_stock_counted() {
        let (service, _ledger) = service().await;

        for i in 0..3 {
            service
                .reserve_trait(TRAIT, &format!("wallet_{}", i), ASSET)
                .await
                .unwrap();
        }
        let err = service
            .reserve_trait(TRAIT, "wallet_late", ASSET)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::OutOfStock { .. }));

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.metrics.holds_rejected_out_of_stock, 1);
        assert_eq!(stats.metrics.active_reservations, 3);
    }

    #[tokio::test]
    async fn test_cancel_releases_and_counts() {
        let (service, _ledger) = service().await;

        let hold = service.reserve_trait(TRAIT, WALLET, ASSET).await.unwrap();
        let reservation_id = hold.reservation().reservation_id.clone();
        let cancelled = service.cancel_reservation(&reservation_id).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.metrics.holds_cancelled, 1);
        assert_eq!(stats.storage.active_reservations, 0);
    }

    #[tokio::test]
    async fn test_gift_flow_through_facade() {
        let (service, _ledger) = service().await;

        service.credit_gift(WALLET, TRAIT, 1).await.unwrap();
        let hold = service.reserve_trait(TRAIT, WALLET, ASSET).await.unwrap();
        let built = service
            .build_transaction(&hold.reservation().reservation_id)
            .await
            .unwrap();
        assert!(built.purchase.is_gift());

        let settled = service
            .submit_transaction(&built.bundle.bundle_id, None)
            .await
            .unwrap();
        assert_eq!(settled.status, PurchaseStatus::Fulfilled);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.metrics.gift_claims, 1);
        assert_eq!(stats.metrics.purchases_fulfilled_gift, 1);
        let balance = service.gift_balance(WALLET, TRAIT).await.unwrap();
        assert_eq!(balance.qty_available, 0);
    }
}
