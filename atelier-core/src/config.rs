//! Engine configuration
//!
//! Connection settings for the ledger RPC endpoint plus the checkout
//! tunables (reservation TTL, pending grace window, broadcast retry policy).
//! Supports loading from environment variables with ATELIER_ prefix.

use serde::{Deserialize, Serialize};
use std::env;

use crate::retry::RetryPolicy;

/// Ledger RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRpcConfig {
    /// RPC endpoint URL
    pub url: String,
    /// Bearer token, when the endpoint requires one
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for LedgerRpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8899".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

impl LedgerRpcConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - ATELIER_LEDGER_RPC_URL: RPC endpoint URL
    /// - ATELIER_LEDGER_RPC_TOKEN: bearer token (optional)
    /// - ATELIER_LEDGER_RPC_TIMEOUT: request timeout in seconds
    pub fn from_env() -> Self {
        Self {
            url: env::var("ATELIER_LEDGER_RPC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8899".to_string()),
            auth_token: env::var("ATELIER_LEDGER_RPC_TOKEN").ok(),
            timeout_secs: env::var("ATELIER_LEDGER_RPC_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Point at a specific endpoint
    pub fn endpoint(url: &str) -> Self {
        Self {
            url: url.to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }

    /// Attach a bearer token
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }
}

/// Confirmation polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Polls before giving the purchase to reconciliation
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Require finalized depth rather than confirmed
    #[serde(default)]
    pub require_finalized: bool,
}

fn default_poll_interval() -> u64 {
    500
}

fn default_max_polls() -> u32 {
    60
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_polls: 60,
            require_finalized: false,
        }
    }
}

/// Delegate authority configuration
///
/// The server-held credential that authorizes asset metadata updates.
/// End-user keys are never held here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateConfig {
    /// On-ledger address of the delegate authority
    pub authority_address: String,
    /// Hex-encoded ed25519 seed; generated at startup when absent (dev only)
    pub secret_key_hex: Option<String>,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            authority_address: "delegate_authority".to_string(),
            secret_key_hex: None,
        }
    }
}

/// Checkout engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Ledger RPC connection
    pub ledger: LedgerRpcConfig,
    /// Confirmation polling
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Delegate authority for metadata updates
    #[serde(default)]
    pub delegate: DelegateConfig,
    /// Treasury wallet receiving payment legs
    pub treasury_wallet: String,
    /// Base URI the metadata pointer update is derived from
    #[serde(default = "default_metadata_base_uri")]
    pub metadata_base_uri: String,
    /// Reservation TTL in seconds; one constant for all traits
    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_secs: u64,
    /// Age after which an unsettled purchase is surfaced for reconciliation
    #[serde(default = "default_pending_grace")]
    pub pending_grace_secs: u64,
    /// Broadcast backoff curve
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Broadcast attempt budget (first try included)
    #[serde(default = "default_max_broadcast_attempts")]
    pub max_broadcast_attempts: u32,
}

fn default_metadata_base_uri() -> String {
    "https://assets.atelier.local/metadata".to_string()
}

fn default_reservation_ttl() -> u64 {
    600
}

fn default_pending_grace() -> u64 {
    900
}

fn default_max_broadcast_attempts() -> u32 {
    4
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerRpcConfig::default(),
            confirmation: ConfirmationConfig::default(),
            delegate: DelegateConfig::default(),
            treasury_wallet: "treasury".to_string(),
            metadata_base_uri: default_metadata_base_uri(),
            reservation_ttl_secs: 600,
            pending_grace_secs: 900,
            retry: RetryPolicy::default(),
            max_broadcast_attempts: 4,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - ATELIER_TREASURY_WALLET: treasury address
    /// - ATELIER_DELEGATE_AUTHORITY: delegate authority address
    /// - ATELIER_DELEGATE_SECRET: hex ed25519 seed for the delegate key
    /// - ATELIER_METADATA_BASE_URI: metadata pointer base
    /// - ATELIER_RESERVATION_TTL: reservation TTL in seconds
    /// - ATELIER_PENDING_GRACE: pending grace window in seconds
    /// - ATELIER_MAX_BROADCAST_ATTEMPTS: broadcast attempt budget
    ///
    /// Also reads the ledger RPC config from its own env vars.
    pub fn from_env() -> Self {
        Self {
            ledger: LedgerRpcConfig::from_env(),
            confirmation: ConfirmationConfig::default(),
            delegate: DelegateConfig {
                authority_address: env::var("ATELIER_DELEGATE_AUTHORITY")
                    .unwrap_or_else(|_| "delegate_authority".to_string()),
                secret_key_hex: env::var("ATELIER_DELEGATE_SECRET").ok(),
            },
            treasury_wallet: env::var("ATELIER_TREASURY_WALLET")
                .unwrap_or_else(|_| "treasury".to_string()),
            metadata_base_uri: env::var("ATELIER_METADATA_BASE_URI")
                .unwrap_or_else(|_| default_metadata_base_uri()),
            reservation_ttl_secs: env::var("ATELIER_RESERVATION_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
            pending_grace_secs: env::var("ATELIER_PENDING_GRACE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(900),
            retry: RetryPolicy::default(),
            max_broadcast_attempts: env::var("ATELIER_MAX_BROADCAST_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        }
    }

    /// Development configuration: short TTLs, tight polling, fast backoff
    pub fn development() -> Self {
        Self {
            ledger: LedgerRpcConfig::default(),
            confirmation: ConfirmationConfig {
                poll_interval_ms: 50,
                max_polls: 20,
                require_finalized: false,
            },
            delegate: DelegateConfig::default(),
            treasury_wallet: "treasury_dev".to_string(),
            metadata_base_uri: default_metadata_base_uri(),
            reservation_ttl_secs: 60,
            pending_grace_secs: 120,
            retry: RetryPolicy::Fixed { delay_secs: 0 },
            max_broadcast_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_rpc_defaults() {
        let config = LedgerRpcConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8899");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_ledger_rpc_with_token() {
        let config = LedgerRpcConfig::endpoint("http://ledger:9000").with_token("secret");
        assert_eq!(config.url, "http://ledger:9000");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_core_config_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.reservation_ttl_secs, 600);
        assert_eq!(config.pending_grace_secs, 900);
        assert_eq!(config.max_broadcast_attempts, 4);
        assert!(!config.confirmation.require_finalized);
    }

    #[test]
    fn test_development_config() {
        let config = CoreConfig::development();
        assert_eq!(config.reservation_ttl_secs, 60);
        assert_eq!(config.retry, RetryPolicy::Fixed { delay_secs: 0 });
    }

    #[test]
    fn test_config_serde_defaults() {
        let json = r#"{"ledger": {"url": "http://x:1"}, "treasury_wallet": "t"}"#;
        let config: CoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ledger.timeout_secs, 30);
        assert_eq!(config.reservation_ttl_secs, 600);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
