//! Outward-facing seams
//!
//! Every collaborator outside this crate's control sits behind a trait so
//! tests can substitute scripted fakes. The ledger RPC seam lives in
//! `ledger`; this module holds the remaining three.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::CoreResult;
use crate::ledger::LedgerClient;
use crate::storage::CheckoutStorage;
use crate::types::TraitListing;

/// Answers whether a wallet currently owns an asset
#[async_trait]
pub trait OwnershipVerifier: Send + Sync {
    /// True when the ledger records `wallet_address` as the asset's owner
    async fn is_owner(&self, wallet_address: &str, asset_id: &str) -> CoreResult<bool>;
}

/// Ownership verdicts read from on-ledger account state
pub struct LedgerOwnershipVerifier {
    ledger: Arc<dyn LedgerClient>,
}

impl LedgerOwnershipVerifier {
    /// Create a verifier over the given ledger client
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl OwnershipVerifier for LedgerOwnershipVerifier {
    async fn is_owner(&self, wallet_address: &str, asset_id: &str) -> CoreResult<bool> {
        let state = self.ledger.get_account_state(asset_id).await?;
        Ok(match state {
            Some(account) => account.owner.as_deref() == Some(wallet_address),
            None => false,
        })
    }
}

/// Read access to the trait catalog
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Listing for a trait, `None` when the catalog has no such entry
    async fn get_trait(&self, trait_id: &str) -> CoreResult<Option<TraitListing>>;
}

/// Catalog reads served from the shared checkout store
///
/// The listing rows live next to the reservation and purchase rows so the
/// fulfillment-time supply decrement stays atomic with them.
pub struct StorageCatalogReader {
    storage: Arc<dyn CheckoutStorage>,
}

impl StorageCatalogReader {
    /// Create a reader over the given store
    pub fn new(storage: Arc<dyn CheckoutStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CatalogReader for StorageCatalogReader {
    async fn get_trait(&self, trait_id: &str) -> CoreResult<Option<TraitListing>> {
        self.storage.get_listing(trait_id).await
    }
}

/// Who performed an audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// An end-user wallet
    Wallet,
    /// The service itself (sweeps, reconciliation)
    System,
    /// An operator through the admin surface
    Admin,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::Wallet => write!(f, "wallet"),
            ActorType::System => write!(f, "system"),
            ActorType::Admin => write!(f, "admin"),
        }
    }
}

/// Fire-and-forget audit stream
///
/// Implementations must never fail the calling flow. A sink that cannot
/// record drops the event and moves on.
pub trait AuditSink: Send + Sync {
    /// Record one action
    fn record(&self, actor_type: ActorType, action: &str, payload: serde_json::Value);
}

/// Audit events as structured log lines on the `audit` target
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, actor_type: ActorType, action: &str, payload: serde_json::Value) {
        match serde_json::to_string(&payload) {
            Ok(payload) => {
                info!(
                    target: "audit",
                    actor = %actor_type,
                    action = %action,
                    payload = %payload,
                    "audit"
                );
            }
            Err(e) => {
                warn!(target: "audit", action = %action, error = %e, "Dropped unserializable audit payload");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_external {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Ownership verdicts from a fixed allow-set
    pub struct StaticOwnership {
        owned: Mutex<HashSet<(String, String)>>,
    }

    impl StaticOwnership {
        pub fn new() -> Self {
            Self {
                owned: Mutex::new(HashSet::new()),
            }
        }

        pub fn grant(&self, wallet_address: &str, asset_id: &str) {
            self.owned
                .lock()
                .unwrap()
                .insert((wallet_address.to_string(), asset_id.to_string()));
        }

        pub fn revoke(&self, wallet_address: &str, asset_id: &str) {
            self.owned
                .lock()
                .unwrap()
                .remove(&(wallet_address.to_string(), asset_id.to_string()));
        }
    }

    #[async_trait]
    impl OwnershipVerifier for StaticOwnership {
        async fn is_owner(&self, wallet_address: &str, asset_id: &str) -> CoreResult<bool> {
            Ok(self
                .owned
                .lock()
                .unwrap()
                .contains(&(wallet_address.to_string(), asset_id.to_string())))
        }
    }

    /// Captures audit events for assertions
    pub struct RecordingAuditSink {
        events: Mutex<Vec<(ActorType, String, serde_json::Value)>>,
    }

    impl RecordingAuditSink {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        pub fn actions(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(_, action, _)| action.clone())
                .collect()
        }
    }

    impl AuditSink for RecordingAuditSink {
        fn record(&self, actor_type: ActorType, action: &str, payload: serde_json::Value) {
            self.events
                .lock()
                .unwrap()
                .push((actor_type, action.to_string(), payload));
        }
    }
}
