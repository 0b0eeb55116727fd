//! Atelier Core - Trait Checkout Engine
//!
//! This crate implements the checkout engine for trait customization items:
//! capacity-gated reservations, gift balances, atomic purchase bundles and
//! the settlement state machine that ties them together.
//!
//! # Architecture
//!
//! The engine consists of several components:
//!
//! - **Reservation Manager**: Issues time-boxed holds against listed supply
//! - **Gift Ledger**: Pre-granted balances claimed before the paid path
//! - **Transaction Builder**: Composes payment + metadata-update bundles
//! - **Purchase Orchestrator**: Drives purchases from creation to settlement
//! - **Confirmation Monitor**: Polls the ledger for signature settlement
//! - **Cleanup Sweep / Reconciler**: Background expiry and stale-purchase repair
//! - **Checkout Service**: One facade over all of the above plus metrics
//!
//! # Purchase Lifecycle
//!
//! ```text
//! created ──> tx_built ──> confirmed ──> fulfilled
//!    │            │            │
//!    └────────────┴────────────┴──────>  failed
//! ```
//!
//! A purchase that fails before settlement releases its hold and re-credits
//! any claimed gift balance. Duplicate settlement reports for a signature
//! are idempotent no-ops.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use atelier_core::{
//!     CheckoutService, CheckoutServiceConfig, SledStorage, StorageConfig,
//! };
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
//!     let built = service
//!         .build_transaction(&hold.reservation().reservation_id)
//!         .await?;
//!     let purchase = service
//!         .submit_transaction(&built.bundle.bundle_id, Some("user_signature"))
//!         .await?;
//!     println!("purchase {} is {}", purchase.purchase_id, purchase.status);
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod config;
pub mod error;
pub mod external;
pub mod gift;
pub mod ledger;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod reconcile;
pub mod reservations;
pub mod retry;
pub mod service;
pub mod signer;
pub mod storage;
pub mod sweep;
pub mod types;

pub use bundle::{
    Instruction, PendingBundle, SignedBundle, SubmitOutcome, TransactionBuilder, UnsignedBundle,
};
pub use config::{ConfirmationConfig, CoreConfig, DelegateConfig, LedgerRpcConfig};
pub use error::{CoreError, CoreResult};
pub use external::{
    ActorType, AuditSink, CatalogReader, LedgerOwnershipVerifier, OwnershipVerifier,
    StorageCatalogReader, TracingAuditSink,
};
pub use gift::GiftLedger;
pub use ledger::{LedgerClient, RpcLedgerClient, SignatureStatus};
pub use metrics::{CheckoutMetrics, MetricsSnapshot};
pub use monitor::ConfirmationMonitor;
pub use orchestrator::{BuildOutcome, PurchaseOrchestrator};
pub use reconcile::{ReconcileReport, Reconciler};
pub use reservations::ReservationManager;
pub use retry::RetryPolicy;
pub use service::{
    CheckoutService, CheckoutServiceBuilder, CheckoutServiceConfig, ServiceStats, ServiceStatus,
};
pub use signer::DelegateSigner;
pub use storage::{
    CheckoutStorage, MemoryStorage, ReserveOutcome, SledStorage, StorageConfig, StorageStats,
};
pub use sweep::{CleanupSweep, SweepReport};
pub use types::{
    Amount, GiftBalance, Purchase, PurchaseStatus, Reservation, ReservationStatus, Timestamp,
    TraitListing,
};
