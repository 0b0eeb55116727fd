//! API Client
//!
//! HTTP client for communicating with the atelier checkout API.
//!
//! Response types mirror the API's JSON. Timestamps arrive as RFC 3339
//! strings and prices as base-10 strings; both stay strings here.

use crate::error::{CliError, CliResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Atelier API client
pub struct AtelierClient {
    /// HTTP client
    client: Client,
    /// Base URL
    base_url: String,
}

impl AtelierClient {
    /// Create a new client
    pub fn new(base_url: impl Into<String>) -> CliResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CliError::connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Create with custom timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout_secs: u64) -> CliResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CliError::connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Get health status
    pub async fn health(&self) -> CliResult<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Get service statistics
    pub async fn stats(&self) -> CliResult<StatsResponse> {
        let url = format!("{}/stats", self.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Expire lapsed holds
    pub async fn sweep(&self) -> CliResult<SweepResponse> {
        let url = format!("{}/admin/sweep", self.base_url);
        let response = self.client.post(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Re-check stale pending purchases against the ledger
    pub async fn reconcile(&self) -> CliResult<ReconcileResponse> {
        let url = format!("{}/admin/reconcile", self.base_url);
        let response = self.client.post(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Fetch a purchase by id
    pub async fn get_purchase(&self, purchase_id: &str) -> CliResult<PurchaseResponse> {
        let url = format!("{}/purchases/{}", self.base_url, purchase_id);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Create or replace a trait listing
    pub async fn upsert_trait(&self, request: UpsertTraitRequest) -> CliResult<TraitResponse> {
        let url = format!("{}/admin/traits", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Fetch a trait listing
    pub async fn get_trait(&self, trait_id: &str) -> CliResult<TraitResponse> {
        let url = format!("{}/traits/{}", self.base_url, trait_id);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// List the trait catalog
    pub async fn list_traits(&self) -> CliResult<TraitListResponse> {
        let url = format!("{}/traits", self.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Credit gift redemptions to a wallet
    pub async fn credit_gift(
        &self,
        request: CreditGiftBalanceRequest,
    ) -> CliResult<GiftBalanceResponse> {
        let url = format!("{}/admin/gift-balances", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }

    /// Fetch a wallet's gift balance for a trait
    pub async fn gift_balance(
        &self,
        wallet_address: &str,
        trait_id: &str,
    ) -> CliResult<GiftBalanceResponse> {
        let url = format!(
            "{}/gift-balances/{}/{}",
            self.base_url, wallet_address, trait_id
        );
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(CliError::api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }
}

// ============================================
// Request/Response Types
// ============================================

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Stats response; the metrics snapshot passes through untyped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Unix milliseconds when the service started
    pub started_at: Option<u64>,
    pub storage: StorageStatsDto,
    pub metrics: serde_json::Value,
}

/// Storage row counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatsDto {
    pub total_listings: u64,
    pub active_listings: u64,
    pub total_reservations: u64,
    pub active_reservations: u64,
    pub total_purchases: u64,
    pub pending_purchases: u64,
    pub fulfilled_purchases: u64,
    pub failed_purchases: u64,
    pub gift_balances: u64,
    pub pending_bundles: u64,
}

/// Sweep outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub expired_count: u64,
    pub ran_at: String,
}

/// Reconciliation pass outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub examined: u64,
    pub fulfilled: u64,
    pub failed: u64,
    pub still_pending: u64,
    pub ran_at: String,
}

/// Purchase row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub purchase_id: String,
    pub wallet_address: String,
    pub asset_id: String,
    pub trait_id: String,
    pub price_amount: String,
    pub token_id: Option<String>,
    pub status: String,
    pub tx_signature: Option<String>,
    pub reservation_id: String,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Upsert trait request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertTraitRequest {
    pub trait_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<u64>,
    pub price_amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    pub active: bool,
}

/// Trait listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitResponse {
    pub trait_id: String,
    pub total_supply: Option<u64>,
    pub remaining_supply: u64,
    pub price_amount: String,
    pub token_id: Option<String>,
    pub active: bool,
}

/// Trait catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitListResponse {
    pub items: Vec<TraitResponse>,
    pub total: u64,
}

/// Credit gift balance request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditGiftBalanceRequest {
    pub wallet_address: String,
    pub trait_id: String,
    pub qty: u64,
}

/// Gift balance row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftBalanceResponse {
    pub wallet_address: String,
    pub trait_id: String,
    pub qty_available: u64,
    pub updated_at: String,
}
