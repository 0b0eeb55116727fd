//! Ledger RPC client
//!
//! The engine's only window onto the distributed ledger: broadcast a signed
//! bundle, dry-run it, poll a signature, read an account. The trait seam
//! exists so the state machine is testable against a scripted ledger; the
//! production implementation speaks JSON-RPC 2.0 over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::LedgerRpcConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{TxSignature, WalletAddress};

/// RPC error code for unknown signatures and accounts
const NOT_FOUND_CODE: i32 = -5;

/// Confirmation state of a broadcast signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// The ledger has never seen this signature
    NotObserved,
    /// Observed but below confirmed depth
    Processed,
    /// Confirmed depth reached
    Confirmed,
    /// Finalized, irreversible
    Finalized,
    /// Observed and failed with a ledger-level instruction error
    Errored(String),
}

impl SignatureStatus {
    /// Whether the configured settlement depth is reached
    pub fn is_settled(&self, require_finalized: bool) -> bool {
        match self {
            SignatureStatus::Finalized => true,
            SignatureStatus::Confirmed => !require_finalized,
            _ => false,
        }
    }

    /// Whether the ledger has seen the signature at all
    pub fn is_observed(&self) -> bool {
        !matches!(self, SignatureStatus::NotObserved)
    }
}

/// Per-instruction failure from a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionError {
    /// Index into the bundle's instruction list
    pub index: u32,
    /// Ledger error message, surfaced verbatim
    pub message: String,
}

/// Dry-run outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Whether the whole bundle would commit
    pub success: bool,
    /// Failures attributed to specific instructions
    #[serde(default)]
    pub instruction_errors: Vec<InstructionError>,
}

impl SimulationResult {
    /// A clean pass
    pub fn ok() -> Self {
        Self {
            success: true,
            instruction_errors: Vec::new(),
        }
    }

    /// A failure pinned to one instruction
    pub fn failed_at(index: u32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            instruction_errors: vec![InstructionError {
                index,
                message: message.into(),
            }],
        }
    }
}

/// Account state read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account address
    pub address: String,
    /// Owning wallet, when the account is an owned asset
    pub owner: Option<WalletAddress>,
    /// Current metadata pointer, when the account carries one
    pub metadata_uri: Option<String>,
}

/// Ledger operations the engine consumes
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Broadcast a signed bundle; returns the ledger signature
    async fn broadcast(&self, signed_tx: &str) -> CoreResult<TxSignature>;

    /// Dry-run an encoded bundle against current ledger state
    async fn simulate(&self, tx: &str) -> CoreResult<SimulationResult>;

    /// Confirmation state of a signature
    async fn get_signature_status(&self, signature: &str) -> CoreResult<SignatureStatus>;

    /// Read an account; `None` when the ledger does not know it
    async fn get_account_state(&self, address: &str) -> CoreResult<Option<AccountState>>;
}

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
    #[allow(dead_code)]
    id: u64,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Signature status as the ledger reports it
#[derive(Debug, Deserialize)]
struct SignatureStatusWire {
    /// "processed" | "confirmed" | "finalized"
    confirmation_status: Option<String>,
    /// Instruction error, when the transaction landed but failed
    error: Option<String>,
}

/// JSON-RPC ledger client
pub struct RpcLedgerClient {
    /// HTTP client
    client: Client,
    /// Connection configuration
    config: LedgerRpcConfig,
    /// Request ID counter
    request_id: std::sync::atomic::AtomicU64,
}

impl RpcLedgerClient {
    /// Create a client from configuration
    pub fn new(config: LedgerRpcConfig) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Rpc(e.to_string()))?;

        Ok(Self {
            client,
            config,
            request_id: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Make an RPC call
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> CoreResult<T> {
        let id = self
            .request_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("Ledger RPC call: {} id={}", method, id);

        let mut builder = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.config.auth_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::Rpc(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Rpc(format!("HTTP {} - {}", status, body)));
        }

        let rpc_response: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| CoreError::Rpc(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(CoreError::RpcResponse {
                code: error.code,
                message: error.message,
            });
        }

        rpc_response
            .result
            .ok_or_else(|| CoreError::Rpc("Empty response".to_string()))
    }

    /// Connectivity check
    pub async fn ping(&self) -> CoreResult<()> {
        let _: serde_json::Value = self.call("getHealth", serde_json::json!([])).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn broadcast(&self, signed_tx: &str) -> CoreResult<TxSignature> {
        let signature: String = self
            .call("broadcastTransaction", serde_json::json!([signed_tx]))
            .await
            .map_err(|e| match e {
                CoreError::Rpc(msg) => CoreError::Broadcast(msg),
                other => other,
            })?;

        info!(signature = %signature, "Broadcast transaction");
        Ok(signature)
    }

    async fn simulate(&self, tx: &str) -> CoreResult<SimulationResult> {
        self.call("simulateTransaction", serde_json::json!([tx]))
            .await
    }

    async fn get_signature_status(&self, signature: &str) -> CoreResult<SignatureStatus> {
        let wire: Option<SignatureStatusWire> = match self
            .call("getSignatureStatus", serde_json::json!([signature]))
            .await
        {
            Ok(wire) => wire,
            Err(CoreError::RpcResponse {
                code: NOT_FOUND_CODE,
                ..
            }) => None,
            Err(e) => return Err(e),
        };

        let status = match wire {
            None => SignatureStatus::NotObserved,
            Some(w) => {
                if let Some(err) = w.error {
                    SignatureStatus::Errored(err)
                } else {
                    match w.confirmation_status.as_deref() {
                        Some("finalized") => SignatureStatus::Finalized,
                        Some("confirmed") => SignatureStatus::Confirmed,
                        Some("processed") => SignatureStatus::Processed,
                        _ => SignatureStatus::NotObserved,
                    }
                }
            }
        };

        Ok(status)
    }

    async fn get_account_state(&self, address: &str) -> CoreResult<Option<AccountState>> {
        match self
            .call("getAccountState", serde_json::json!([address]))
            .await
        {
            Ok(state) => Ok(Some(state)),
            Err(CoreError::RpcResponse {
                code: NOT_FOUND_CODE,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_ledger::ScriptedLedger;
    use super::*;

    #[test]
    fn test_signature_status_settlement() {
        assert!(SignatureStatus::Confirmed.is_settled(false));
        assert!(!SignatureStatus::Confirmed.is_settled(true));
        assert!(SignatureStatus::Finalized.is_settled(true));
        assert!(!SignatureStatus::Processed.is_settled(false));
        assert!(!SignatureStatus::NotObserved.is_settled(false));
        assert!(!SignatureStatus::Errored("x".to_string()).is_settled(false));
    }

    #[test]
    fn test_simulation_result_helpers() {
        let ok = SimulationResult::ok();
        assert!(ok.success);
        assert!(ok.instruction_errors.is_empty());

        let failed = SimulationResult::failed_at(1, "insufficient funds");
        assert!(!failed.success);
        assert_eq!(failed.instruction_errors[0].index, 1);
    }

    #[tokio::test]
    async fn test_scripted_broadcast_failures() {
        let ledger = ScriptedLedger::new();
        ledger.fail_broadcasts(2);

        assert!(ledger.broadcast("tx1").await.is_err());
        assert!(ledger.broadcast("tx1").await.is_err());
        let sig = ledger.broadcast("tx1").await.unwrap();
        assert!(sig.starts_with("sig_"));
        assert_eq!(ledger.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_status_sequence() {
        let ledger = ScriptedLedger::new();
        ledger.script_status(
            "sig123",
            vec![
                SignatureStatus::NotObserved,
                SignatureStatus::Processed,
                SignatureStatus::Confirmed,
            ],
        );

        assert_eq!(
            ledger.get_signature_status("sig123").await.unwrap(),
            SignatureStatus::NotObserved
        );
        assert_eq!(
            ledger.get_signature_status("sig123").await.unwrap(),
            SignatureStatus::Processed
        );
        assert_eq!(
            ledger.get_signature_status("sig123").await.unwrap(),
            SignatureStatus::Confirmed
        );
        // final status repeats
        assert_eq!(
            ledger.get_signature_status("sig123").await.unwrap(),
            SignatureStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_scripted_account_state() {
        let ledger = ScriptedLedger::happy_path("wallet_a", "asset_1");
        let state = ledger.get_account_state("asset_1").await.unwrap().unwrap();
        assert_eq!(state.owner.as_deref(), Some("wallet_a"));
        assert!(ledger.get_account_state("asset_2").await.unwrap().is_none());

        ledger.remove_account("asset_1");
        assert!(ledger.get_account_state("asset_1").await.unwrap().is_none());
    }
}
