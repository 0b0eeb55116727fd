//! Service builder

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bundle::TransactionBuilder;
use crate::error::{CoreError, CoreResult};
use crate::external::{AuditSink, LedgerOwnershipVerifier, OwnershipVerifier, TracingAuditSink};
use crate::gift::GiftLedger;
use crate::ledger::{LedgerClient, RpcLedgerClient};
use crate::metrics::CheckoutMetrics;
use crate::monitor::ConfirmationMonitor;
use crate::orchestrator::PurchaseOrchestrator;
use crate::reconcile::Reconciler;
use crate::reservations::ReservationManager;
use crate::service::{CheckoutService, CheckoutServiceConfig, ServiceStatus};
use crate::signer::DelegateSigner;
use crate::storage::CheckoutStorage;
use crate::sweep::CleanupSweep;

/// Assembles a [`CheckoutService`] from parts
///
/// Storage is the one required piece. Everything else defaults from the
/// configuration: an RPC ledger client, a delegate signer, ledger-backed
/// ownership checks and tracing audit output.
pub struct CheckoutServiceBuilder {
    config: Option<CheckoutServiceConfig>,
    storage: Option<Arc<dyn CheckoutStorage>>,
    ledger: Option<Arc<dyn LedgerClient>>,
    delegate: Option<Arc<DelegateSigner>>,
    ownership: Option<Arc<dyn OwnershipVerifier>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl CheckoutServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            storage: None,
            ledger: None,
            delegate: None,
            ownership: None,
            audit: None,
        }
    }

    /// Service configuration; defaults to [`CheckoutServiceConfig::default`]
    pub fn config(mut self, config: CheckoutServiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Storage backend, required
    pub fn storage(mut self, storage: Arc<dyn CheckoutStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Ledger client; defaults to an RPC client over the configured endpoint
    pub fn ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Metadata-update authority; defaults from the delegate configuration
    pub fn delegate(mut self, delegate: Arc<DelegateSigner>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Ownership verifier; defaults to ledger-backed lookups
    pub fn ownership(mut self, ownership: Arc<dyn OwnershipVerifier>) -> Self {
        self.ownership = Some(ownership);
        self
    }

    /// Audit sink; defaults to structured log lines
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Assemble the service
    pub fn build(self) -> CoreResult<CheckoutService> {
        let config = self.config.unwrap_or_default();
        let storage = self
            .storage
            .ok_or_else(|| CoreError::Configuration("storage is required".to_string()))?;

        let ledger: Arc<dyn LedgerClient> = match self.ledger {
            Some(ledger) => ledger,
            None => Arc::new(RpcLedgerClient::new(config.core.ledger.clone())?),
        };
        let delegate = match self.delegate {
            Some(delegate) => delegate,
            None => Arc::new(DelegateSigner::from_config(&config.core.delegate)?),
        };
        let ownership: Arc<dyn OwnershipVerifier> = match self.ownership {
            Some(ownership) => ownership,
            None => Arc::new(LedgerOwnershipVerifier::new(Arc::clone(&ledger))),
        };
        let audit: Arc<dyn AuditSink> = match self.audit {
            Some(audit) => audit,
            None => Arc::new(TracingAuditSink),
        };

        let tx_builder = TransactionBuilder::new(
            Arc::clone(&ledger),
            delegate,
            config.core.metadata_base_uri.clone(),
        );
        let monitor = ConfirmationMonitor::new(Arc::clone(&ledger), config.core.confirmation.clone());
        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            Arc::clone(&storage),
            tx_builder,
            monitor,
            ownership,
            audit,
            &config.core,
        ));

        let reservations = Arc::new(ReservationManager::new(
            Arc::clone(&storage),
            config.core.reservation_ttl_secs,
        ));
        let gift = Arc::new(GiftLedger::new(Arc::clone(&storage)));
        let sweep = Arc::new(CleanupSweep::new(Arc::clone(&storage)));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&storage),
            Arc::clone(&orchestrator),
            config.core.pending_grace_secs,
        ));

        Ok(CheckoutService {
            config,
            storage,
            ledger,
            reservations,
            gift,
            orchestrator,
            sweep,
            reconciler,
            metrics: Arc::new(CheckoutMetrics::new()),
            status: Arc::new(RwLock::new(ServiceStatus::Initializing)),
            started_at: Arc::new(RwLock::new(None)),
            runner_handle: Arc::new(RwLock::new(None)),
        })
    }
}

impl Default for CheckoutServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_ledger::ScriptedLedger;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_builder_requires_storage() {
        let result = CheckoutServiceBuilder::new()
            .config(CheckoutServiceConfig::development())
            .build();
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_builder_with_storage() {
        let service = CheckoutServiceBuilder::new()
            .config(CheckoutServiceConfig::development())
            .storage(Arc::new(MemoryStorage::new()))
            .ledger(Arc::new(ScriptedLedger::new()) as Arc<dyn LedgerClient>)
            .build()
            .unwrap();
        assert_eq!(service.status().await, ServiceStatus::Initializing);
    }
}
