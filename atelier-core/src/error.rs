//! Engine error types
//!
//! One taxonomy for the whole checkout flow. The API layer maps each
//! variant to a distinct status code and machine-readable code so callers
//! can tell "no longer available" apart from "network error, retry".

use thiserror::Error;

use crate::types::{PurchaseId, PurchaseTransitionError};

/// Checkout engine error
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or inconsistent caller input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Capacity exhausted for a limited-supply trait
    #[error("Trait {trait_id} is out of stock")]
    OutOfStock { trait_id: String },

    /// The hold lapsed before settlement; caller must re-reserve
    #[error("Reservation {0} has expired")]
    ReservationExpired(String),

    /// Wallet no longer owns the target asset
    #[error("Wallet {wallet} does not own asset {asset}")]
    Ownership { wallet: String, asset: String },

    /// Bundle missing a required instruction; fatal to the attempt
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    /// Ledger dry run rejected the bundle
    #[error("Simulation failed: {0}")]
    Simulation(String),

    /// Network/RPC failure while broadcasting; retryable with backoff
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    /// Final ledger state unknown; routed to reconciliation, never auto-failed
    #[error("Confirmation timeout after {attempts} attempts for signature {signature}")]
    ConfirmationTimeout { signature: String, attempts: u32 },

    /// The signature already settled a purchase; resolved as a no-op
    #[error("Signature already settles purchase {purchase_id}")]
    DuplicateSignature { purchase_id: PurchaseId },

    /// Broadcast retries exhausted
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Row lookup miss
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Ledger RPC transport error
    #[error("Ledger RPC request failed: {0}")]
    Rpc(String),

    /// Ledger RPC error payload
    #[error("Ledger RPC error: {message}")]
    RpcResponse { code: i32, message: String },

    /// Delegate signing error
    #[error("Delegate signing failed: {0}")]
    Signer(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Rejected state-machine move
    #[error("State transition error: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Row-miss helper
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether a retry with backoff may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Broadcast(_) | Self::Rpc(_))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Rpc(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for CoreError {
    fn from(e: hex::FromHexError) -> Self {
        CoreError::Serialization(format!("Hex decode error: {}", e))
    }
}

impl From<PurchaseTransitionError> for CoreError {
    fn from(e: PurchaseTransitionError) -> Self {
        CoreError::InvalidState(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::Broadcast("connection reset".to_string()).is_retryable());
        assert!(CoreError::Rpc("timeout".to_string()).is_retryable());
        assert!(!CoreError::OutOfStock {
            trait_id: "hat_crown".to_string()
        }
        .is_retryable());
        assert!(!CoreError::Simulation("payment leg rejected".to_string()).is_retryable());
    }

    #[test]
    fn test_display_carries_detail() {
        let err = CoreError::ConfirmationTimeout {
            signature: "sig123".to_string(),
            attempts: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains("sig123"));
        assert!(msg.contains("20"));
    }
}
