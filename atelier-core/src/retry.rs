//! Broadcast retry policy
//!
//! The backoff curve for transient broadcast failures. The curve is a
//! tunable deployment parameter, not a contract; the orchestrator reads it
//! from configuration and gives up into `RetryExhausted` once the attempt
//! budget is spent.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff curve between broadcast attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Single attempt, no retry
    None,
    /// Fixed delay between retries
    Fixed { delay_secs: u64 },
    /// Exponential backoff
    Exponential {
        initial_delay_secs: u64,
        max_delay_secs: u64,
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_secs: 1,
            max_delay_secs: 30,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt number (first retry is attempt 2)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Fixed { delay_secs } => Duration::from_secs(*delay_secs),
            RetryPolicy::Exponential {
                initial_delay_secs,
                max_delay_secs,
                multiplier,
            } => {
                let delay =
                    (*initial_delay_secs as f64) * multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay = delay.min(*max_delay_secs as f64);
                Duration::from_secs_f64(delay.max(0.0))
            }
        }
    }

    /// Whether any retry happens at all
    pub fn allows_retry(&self) -> bool {
        !matches!(self, RetryPolicy::None)
    }
}
