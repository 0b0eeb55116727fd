//! Confirmation polling
//!
//! Bounded wait for a broadcast signature to settle. Polling stops early
//! when the ledger reports the transaction errored; exhausting the poll
//! budget yields `ConfirmationTimeout`, which the caller treats as
//! "outcome unknown", never as failure.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ConfirmationConfig;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{LedgerClient, SignatureStatus};

/// Polls a signature until it settles, errors or the budget runs out
pub struct ConfirmationMonitor {
    /// Ledger RPC seam
    ledger: Arc<dyn LedgerClient>,
    /// Poll cadence and budget
    config: ConfirmationConfig,
}

impl ConfirmationMonitor {
    /// Create a monitor
    pub fn new(ledger: Arc<dyn LedgerClient>, config: ConfirmationConfig) -> Self {
        Self { ledger, config }
    }

    /// Wait for the signature to reach a settled or errored state
    ///
    /// Returns the terminal status the ledger reported. Transport errors
    /// on individual polls are tolerated; only the poll budget bounds the
    /// wait.
    pub async fn await_settlement(&self, signature: &str) -> CoreResult<SignatureStatus> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        for attempt in 1..=self.config.max_polls {
            match self.ledger.get_signature_status(signature).await {
                Ok(status) => {
                    debug!(
                        signature = %signature,
                        attempt,
                        status = ?status,
                        "Polled signature status"
                    );

                    if status.is_settled(self.config.require_finalized) {
                        info!(
                            signature = %signature,
                            attempt,
                            "Transaction settled"
                        );
                        return Ok(status);
                    }

                    if let SignatureStatus::Errored(reason) = status {
                        warn!(
                            signature = %signature,
                            reason = %reason,
                            "Ledger rejected transaction"
                        );
                        return Ok(SignatureStatus::Errored(reason));
                    }
                }
                Err(e) => {
                    // Transient RPC trouble; the signature may still settle
                    warn!(
                        signature = %signature,
                        attempt,
                        error = %e,
                        "Status poll failed"
                    );
                }
            }

            if attempt < self.config.max_polls {
                tokio::time::sleep(poll_interval).await;
            }
        }

        Err(CoreError::ConfirmationTimeout {
            signature: signature.to_string(),
            attempts: self.config.max_polls,
        })
    }

    /// Single status probe without waiting
    pub async fn probe(&self, signature: &str) -> CoreResult<SignatureStatus> {
        self.ledger.get_signature_status(signature).await
    }

    /// Whether a status meets the configured settlement bar
    pub fn meets_settlement(&self, status: &SignatureStatus) -> bool {
        status.is_settled(self.config.require_finalized)
    }
}
