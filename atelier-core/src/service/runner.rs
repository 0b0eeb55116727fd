//! Background runner
//!
//! One spawned task drives the periodic work: cleanup sweeps over lapsed
//! holds and reconciliation of stale pending purchases. The handle pauses,
//! resumes and stops the task without touching the service itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::metrics::CheckoutMetrics;
use crate::reconcile::Reconciler;
use crate::storage::CheckoutStorage;
use crate::sweep::CleanupSweep;

/// Drives sweeps and reconciliation on their own timers
pub struct BackgroundRunner {
    storage: Arc<dyn CheckoutStorage>,
    sweep: Arc<CleanupSweep>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<CheckoutMetrics>,
    sweep_interval_secs: u64,
    reconcile_interval_secs: u64,
}

impl BackgroundRunner {
    pub fn new(
        storage: Arc<dyn CheckoutStorage>,
        sweep: Arc<CleanupSweep>,
        reconciler: Arc<Reconciler>,
        metrics: Arc<CheckoutMetrics>,
        sweep_interval_secs: u64,
        reconcile_interval_secs: u64,
    ) -> Self {
        Self {
            storage,
            sweep,
            reconciler,
            metrics,
            sweep_interval_secs: sweep_interval_secs.max(1),
            reconcile_interval_secs: reconcile_interval_secs.max(1),
        }
    }

    /// Spawn the background task and hand back its control handle
    pub async fn start(self) -> RunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(RwLock::new(true));

        let storage = self.storage;
        let sweep = self.sweep;
        let reconciler = self.reconciler;
        let metrics = self.metrics;
        let running_flag = Arc::clone(&running);
        let sweep_every = Duration::from_secs(self.sweep_interval_secs);
        let reconcile_every = Duration::from_secs(self.reconcile_interval_secs);

        tokio::spawn(async move {
            info!(
                sweep_interval_secs = sweep_every.as_secs(),
                reconcile_interval_secs = reconcile_every.as_secs(),
                "Background runner started"
            );

            let mut sweep_timer = interval(sweep_every);
            let mut reconcile_timer = interval(reconcile_every);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Background runner received shutdown signal");
                        break;
                    }
                    _ = sweep_timer.tick() => {
                        if !*running_flag.read().await {
                            continue;
                        }
                        Self::sweep_tick(&sweep, &storage, &metrics).await;
                    }
                    _ = reconcile_timer.tick() => {
                        if !*running_flag.read().await {
                            continue;
                        }
                        Self::reconcile_tick(&reconciler, &metrics).await;
                    }
                }
            }

            info!("Background runner stopped");
        });

        RunnerHandle {
            shutdown_tx,
            running,
        }
    }

    /// Expire lapsed holds, then refresh the storage gauges
    async fn sweep_tick(
        sweep: &Arc<CleanupSweep>,
        storage: &Arc<dyn CheckoutStorage>,
        metrics: &Arc<CheckoutMetrics>,
    ) {
        match sweep.run().await {
            Ok(report) => {
                metrics.sweep_completed(report.expired_count);
                if report.expired_count > 0 {
                    debug!(expired = report.expired_count, "Periodic sweep expired holds");
                }
            }
            Err(e) => {
                error!("Periodic sweep failed: {}", e);
            }
        }

        match storage.get_stats().await {
            Ok(stats) => {
                metrics
                    .set_storage_state(stats.active_reservations, stats.pending_purchases)
                    .await;
            }
            Err(e) => {
                error!("Storage stats refresh failed: {}", e);
            }
        }
    }

    /// Resolve stale pending purchases through the ledger
    async fn reconcile_tick(reconciler: &Arc<Reconciler>, metrics: &Arc<CheckoutMetrics>) {
        match reconciler.run().await {
            Ok(report) => {
                metrics.reconcile_completed(report.fulfilled as u64, report.failed as u64);
            }
            Err(e) => {
                error!("Periodic reconciliation failed: {}", e);
            }
        }
    }
}

/// Control handle for a spawned [`BackgroundRunner`]
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl RunnerHandle {
    /// Stop the background task
    pub async fn stop(self) {
        {
            let mut running = self.running.write().await;
            *running = false;
        }
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Keep the timers ticking but skip the work
    pub async fn pause(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// Resume after a pause
    pub async fn resume(&self) {
        let mut running = self.running.write().await;
        *running = true;
    }

    /// Whether ticks currently perform work
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::TransactionBuilder;
    use crate::config::CoreConfig;
    use crate::external::test_external::{RecordingAuditSink, StaticOwnership};
    use crate::ledger::test_ledger::ScriptedLedger;
    use crate::monitor::ConfirmationMonitor;
    use crate::orchestrator::PurchaseOrchestrator;
    use crate::signer::DelegateSigner;
    use crate::storage::MemoryStorage;
    use crate::types::{Reservation, ReservationStatus, Timestamp, TraitListing};

    fn runner_over(storage: Arc<dyn CheckoutStorage>) -> BackgroundRunner {
        let config = CoreConfig::development();
        let ledger: Arc<dyn crate::ledger::LedgerClient> = Arc::new(ScriptedLedger::new());
        let delegate = Arc::new(DelegateSigner::from_config(&config.delegate).unwrap());
        let builder = TransactionBuilder::new(
            Arc::clone(&ledger),
            delegate,
            config.metadata_base_uri.clone(),
        );
        let monitor = ConfirmationMonitor::new(Arc::clone(&ledger), config.confirmation.clone());
        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            Arc::clone(&storage),
            builder,
            monitor,
            Arc::new(StaticOwnership::new()),
            Arc::new(RecordingAuditSink::new()),
            &config,
        ));

        BackgroundRunner::new(
            Arc::clone(&storage),
            Arc::new(CleanupSweep::new(Arc::clone(&storage))),
            Arc::new(Reconciler::new(
                Arc::clone(&storage),
                orchestrator,
                config.pending_grace_secs,
            )),
            Arc::new(CheckoutMetrics::new()),
            60,
            60,
        )
    }

    #[tokio::test]
    async fn test_runner_handle_lifecycle() {
        let (shutdown_tx, _shutdown_rx) = mpsc::channel::<()>(1);
        let handle = RunnerHandle {
            shutdown_tx,
            running: Arc::new(RwLock::new(true)),
        };

        assert!(handle.is_running().await);
        handle.pause().await;
        assert!(!handle.is_running().await);
        handle.resume().await;
        assert!(handle.is_running().await);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_first_sweep_tick_expires_lapsed_hold() {
        let storage: Arc<dyn CheckoutStorage> = Arc::new(MemoryStorage::new());
        storage
            .upsert_listing(&TraitListing::limited("hat_crown", 5, 100))
            .await
            .unwrap();
        // Zero TTL, lapsed at birth
        let candidate = Reservation::new("hat_crown", "wallet", "asset", 0);
        let reservation_id = candidate.reservation_id.clone();
        storage
            .create_reservation(&candidate, Timestamp::now())
            .await
            .unwrap();

        let handle = runner_over(Arc::clone(&storage)).start().await;
        // The first interval tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let swept = storage
            .get_reservation(&reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(swept.status, ReservationStatus::Expired);
    }

    #[tokio::test]
    async fn test_paused_runner_skips_work() {
        let storage: Arc<dyn CheckoutStorage> = Arc::new(MemoryStorage::new());
        storage
            .upsert_listing(&TraitListing::limited("hat_crown", 5, 100))
            .await
            .unwrap();

        let handle = runner_over(Arc::clone(&storage)).start().await;
        handle.pause().await;

        let candidate = Reservation::new("hat_crown", "wallet", "asset", 0);
        let reservation_id = candidate.reservation_id.clone();
        storage
            .create_reservation(&candidate, Timestamp::now())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let untouched = storage
            .get_reservation(&reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.status, ReservationStatus::Reserved);
    }
}
