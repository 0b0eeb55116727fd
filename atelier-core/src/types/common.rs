//! Shared base types
//!
//! Id aliases, the millisecond timestamp used for all expiry arithmetic,
//! and the amount type for prices.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Monetary amount in the smallest currency unit.
///
/// 128-bit so token prices never hit a fixed-width overflow; floating point
/// is never used for money anywhere in this crate.
pub type Amount = u128;

/// Trait catalog identifier
pub type TraitId = String;

/// Reservation row identifier
pub type ReservationId = String;

/// Purchase row identifier
pub type PurchaseId = String;

/// Unsigned bundle identifier
pub type BundleId = String;

/// Ledger wallet address
pub type WalletAddress = String;

/// Ledger asset identifier
pub type AssetId = String;

/// Ledger transaction signature
pub type TxSignature = String;

/// Generate a fresh row id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Timestamp in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Construct from milliseconds
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// As milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// This timestamp plus a number of seconds
    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(1000)))
    }

    /// This timestamp minus a number of seconds, clamped at zero
    pub fn minus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs.saturating_mul(1000)))
    }

    /// Whether this timestamp lies at or before `now`
    pub fn is_past(&self, now: Timestamp) -> bool {
        self.0 <= now.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
