//! Atomic transaction bundle
//!
//! One ledger transaction carrying both the payment leg and the asset
//! metadata-update leg. The ledger commits or rejects the transaction as a
//! unit; that is the entire atomicity story. Splitting the legs into two
//! transactions would reopen the window where payment lands without the
//! asset changing (or the reverse), so the builder refuses to produce such
//! bundles and `validate` refuses to pass them.
//!
//! # Wire encoding
//!
//! Bundles travel to the ledger as `base64(JSON bytes)`. Serialization goes
//! through `serde_json::to_vec` on typed structs so 128-bit amounts stay on
//! the typed path.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::ledger::{LedgerClient, SignatureStatus};
use crate::signer::DelegateSigner;
use crate::types::{new_id, Amount, AssetId, BundleId, Timestamp, TxSignature, WalletAddress};

/// A single ledger instruction
///
/// Closed tagged union: `validate` matches it exhaustively, so a new
/// category cannot slip past the completeness check unnoticed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    /// Native currency transfer
    NativeTransfer {
        from: WalletAddress,
        to: WalletAddress,
        amount: Amount,
    },
    /// Fungible token transfer
    TokenTransfer {
        from: WalletAddress,
        to: WalletAddress,
        token_id: String,
        amount: Amount,
    },
    /// Rewrite of an asset's metadata pointer, delegate-authorized
    MetadataPointerUpdate {
        asset_id: AssetId,
        new_uri: String,
        authority: String,
    },
}

impl Instruction {
    /// Whether this is the payment leg
    pub fn is_payment(&self) -> bool {
        match self {
            Instruction::NativeTransfer { .. } | Instruction::TokenTransfer { .. } => true,
            Instruction::MetadataPointerUpdate { .. } => false,
        }
    }

    /// Whether this is the metadata-update leg
    pub fn is_update(&self) -> bool {
        matches!(self, Instruction::MetadataPointerUpdate { .. })
    }
}

/// Signature applied by the server-held delegate authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateSignature {
    /// Authority address
    pub signer: String,
    /// Hex ed25519 signature over the bundle digest
    pub signature: String,
}

/// Signature supplied by the end-user wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSignature {
    /// Wallet address
    pub signer: WalletAddress,
    /// Wallet signature material
    pub signature: String,
}

/// Unsigned instruction bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedBundle {
    /// Bundle id
    pub bundle_id: BundleId,
    /// Instruction list; payment leg first when present
    pub instructions: Vec<Instruction>,
    /// Settlement amount the payment leg moves; zero for gift bundles
    pub payment_amount: Amount,
    /// Wallets that must still sign (payment leg authority)
    pub required_signatures: Vec<WalletAddress>,
    /// Signatures the server already applied (update leg authority)
    pub delegate_signatures: Vec<DelegateSignature>,
    /// Build time
    pub created_at: Timestamp,
}

impl UnsignedBundle {
    /// SHA-256 over the bundle identity and instruction list
    ///
    /// Signatures are excluded: both signer classes sign this digest.
    pub fn digest(&self) -> CoreResult<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(self.bundle_id.as_bytes());
        hasher.update(serde_json::to_vec(&self.instructions)?);
        hasher.update(self.payment_amount.to_be_bytes());
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        Ok(digest)
    }

    /// The payment leg, when present
    pub fn payment_instruction(&self) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.is_payment())
    }

    /// The metadata-update leg, when present
    pub fn update_instruction(&self) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.is_update())
    }

    /// Index of the payment leg in the instruction list
    pub fn payment_index(&self) -> Option<u32> {
        self.instructions
            .iter()
            .position(|i| i.is_payment())
            .map(|i| i as u32)
    }

    /// Index of the update leg in the instruction list
    pub fn update_index(&self) -> Option<u32> {
        self.instructions
            .iter()
            .position(|i| i.is_update())
            .map(|i| i as u32)
    }

    /// Whether the payment leg is expected at all
    pub fn expects_payment(&self) -> bool {
        self.payment_amount > 0
    }

    /// Wire encoding for simulation (no user signatures yet)
    pub fn encode(&self) -> CoreResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Bundle with the user signature appended, ready to broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBundle {
    /// The unsigned bundle
    pub bundle: UnsignedBundle,
    /// End-user signatures
    pub user_signatures: Vec<UserSignature>,
}

impl SignedBundle {
    /// Wire encoding for broadcast
    pub fn encode(&self) -> CoreResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// A built bundle parked in storage until the wallet submits it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBundle {
    /// Bundle id, the storage key
    pub bundle_id: BundleId,
    /// Purchase the bundle settles
    pub purchase_id: String,
    /// The bundle itself
    pub bundle: UnsignedBundle,
    /// When the bundle was parked
    pub created_at: Timestamp,
}

impl PendingBundle {
    /// Park a freshly built bundle
    pub fn new(bundle: UnsignedBundle, purchase_id: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle.bundle_id.clone(),
            purchase_id: purchase_id.into(),
            bundle,
            created_at: Timestamp::now(),
        }
    }
}

/// Completeness verdict from `validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleValidation {
    /// Whole-bundle verdict
    pub valid: bool,
    /// A payment instruction is present
    pub has_payment_instruction: bool,
    /// A metadata-update instruction is present
    pub has_update_instruction: bool,
    /// Specific rejection reason, when invalid
    pub error: Option<String>,
}

/// Dry-run outcome with per-leg attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSimulation {
    /// Whole-bundle verdict
    pub success: bool,
    /// The payment leg passed
    pub payment_executed: bool,
    /// The update leg passed
    pub update_executed: bool,
    /// Ledger error text, surfaced verbatim
    pub error: Option<String>,
}

/// Broadcast outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    /// Ledger signature identifying the transaction
    pub signature: TxSignature,
    /// The payment leg was part of the broadcast bundle
    pub payment_executed: bool,
    /// The update leg was part of the broadcast bundle
    pub update_executed: bool,
}

/// Composes, validates, dry-runs and broadcasts instruction bundles
pub struct TransactionBuilder {
    /// Ledger RPC seam
    ledger: Arc<dyn LedgerClient>,
    /// Metadata-update authority
    delegate: Arc<DelegateSigner>,
    /// Base the new metadata pointer is derived from
    metadata_base_uri: String,
}

impl TransactionBuilder {
    /// Create a builder
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        delegate: Arc<DelegateSigner>,
        metadata_base_uri: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            delegate,
            metadata_base_uri: metadata_base_uri.into(),
        }
    }

    /// Compose the payment + metadata-update bundle
    ///
    /// A zero `payment_amount` produces a gift bundle: no payment leg, no
    /// required user signature, the update leg alone.
    pub fn build(
        &self,
        wallet_address: &str,
        asset_id: &str,
        trait_id: &str,
        payment_amount: Amount,
        token_id: Option<&str>,
        treasury_wallet: &str,
    ) -> CoreResult<UnsignedBundle> {
        if wallet_address.is_empty() || asset_id.is_empty() || trait_id.is_empty() {
            return Err(CoreError::Validation(
                "wallet, asset and trait are required".to_string(),
            ));
        }
        if payment_amount > 0 && treasury_wallet.is_empty() {
            return Err(CoreError::TransactionBuild(
                "paid bundle without a treasury wallet".to_string(),
            ));
        }

        let mut instructions = Vec::with_capacity(2);

        if payment_amount > 0 {
            let payment = match token_id {
                None => Instruction::NativeTransfer {
                    from: wallet_address.to_string(),
                    to: treasury_wallet.to_string(),
                    amount: payment_amount,
                },
                Some(token) => Instruction::TokenTransfer {
                    from: wallet_address.to_string(),
                    to: treasury_wallet.to_string(),
                    token_id: token.to_string(),
                    amount: payment_amount,
                },
            };
            instructions.push(payment);
        }

        instructions.push(Instruction::MetadataPointerUpdate {
            asset_id: asset_id.to_string(),
            new_uri: self.metadata_uri(asset_id, trait_id),
            authority: self.delegate.authority_address.clone(),
        });

        let required_signatures = if payment_amount > 0 {
            vec![wallet_address.to_string()]
        } else {
            Vec::new()
        };

        let mut bundle = UnsignedBundle {
            bundle_id: new_id(),
            instructions,
            payment_amount,
            required_signatures,
            delegate_signatures: Vec::new(),
            created_at: Timestamp::now(),
        };

        let digest = bundle.digest()?;
        bundle.delegate_signatures.push(DelegateSignature {
            signer: self.delegate.authority_address.clone(),
            signature: self.delegate.sign_update(&digest),
        });

        debug!(
            bundle_id = %bundle.bundle_id,
            instructions = bundle.instructions.len(),
            payment_amount = %payment_amount,
            "Built transaction bundle"
        );

        Ok(bundle)
    }

    /// Completeness check, exhaustive over the instruction enum
    pub fn validate(&self, bundle: &UnsignedBundle) -> BundleValidation {
        let has_payment = bundle.payment_instruction().is_some();
        let has_update = bundle.update_instruction().is_some();

        let error = if bundle.instructions.is_empty() {
            Some("bundle has no instructions".to_string())
        } else if !has_update {
            Some("bundle is missing the metadata-update instruction".to_string())
        } else if bundle.expects_payment() && !has_payment {
            Some("bundle is missing the payment instruction".to_string())
        } else if !bundle.expects_payment() && has_payment {
            Some("zero-price bundle carries a payment instruction".to_string())
        } else if bundle.delegate_signatures.is_empty() {
            Some("bundle is missing the delegate signature".to_string())
        } else {
            None
        };

        BundleValidation {
            valid: error.is_none(),
            has_payment_instruction: has_payment,
            has_update_instruction: has_update,
            error,
        }
    }

    /// Dry-run the bundle against current ledger state
    pub async fn simulate(&self, bundle: &UnsignedBundle) -> CoreResult<BundleSimulation> {
        let encoded = bundle.encode()?;
        let result = self.ledger.simulate(&encoded).await?;

        let failed_indices: Vec<u32> =
            result.instruction_errors.iter().map(|e| e.index).collect();
        let leg_ok = |index: Option<u32>| match index {
            None => false,
            Some(i) => !failed_indices.contains(&i),
        };

        let error = if result.instruction_errors.is_empty() {
            None
        } else {
            Some(
                result
                    .instruction_errors
                    .iter()
                    .map(|e| format!("instruction {}: {}", e.index, e.message))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        Ok(BundleSimulation {
            success: result.success,
            payment_executed: leg_ok(bundle.payment_index()),
            update_executed: leg_ok(bundle.update_index()),
            error,
        })
    }

    /// Append the user signature and broadcast
    ///
    /// The signature is required exactly when the bundle declares a
    /// required signer (the paid path); gift bundles broadcast with the
    /// delegate signature alone. Errors surface verbatim; the caller owns
    /// retry and confirmation.
    pub async fn submit(
        &self,
        bundle: &UnsignedBundle,
        user_signature: Option<&str>,
    ) -> CoreResult<SubmitOutcome> {
        let user_signatures = match (bundle.required_signatures.first(), user_signature) {
            (Some(signer), Some(signature)) => vec![UserSignature {
                signer: signer.clone(),
                signature: signature.to_string(),
            }],
            (Some(_), None) => {
                return Err(CoreError::Validation(
                    "user signature required for the payment leg".to_string(),
                ))
            }
            (None, _) => Vec::new(),
        };

        let signed = SignedBundle {
            bundle: bundle.clone(),
            user_signatures,
        };

        let signature = self.ledger.broadcast(&signed.encode()?).await?;

        info!(
            bundle_id = %bundle.bundle_id,
            signature = %signature,
            "Submitted transaction bundle"
        );

        Ok(SubmitOutcome {
            signature,
            payment_executed: bundle.payment_instruction().is_some(),
            update_executed: bundle.update_instruction().is_some(),
        })
    }

    /// Confirmation state of a broadcast signature
    pub async fn status(&self, signature: &str) -> CoreResult<SignatureStatus> {
        self.ledger.get_signature_status(signature).await
    }

    /// The metadata pointer a fulfilled trait resolves to
    pub fn metadata_uri(&self, asset_id: &str, trait_id: &str) -> String {
        format!("{}/{}/{}", self.metadata_base_uri, asset_id, trait_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_ledger::ScriptedLedger;
    use crate::ledger::SimulationResult;

    fn test_builder() -> (Arc<ScriptedLedger>, TransactionBuilder) {
        let ledger = Arc::new(ScriptedLedger::new());
        let delegate = Arc::new(DelegateSigner::generate("delegate_dev"));
        let builder = TransactionBuilder::new(
            ledger.clone(),
            delegate,
            "https://assets.test/metadata",
        );
        (ledger, builder)
    }

    #[test]
    fn test_build_paid_native_bundle() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 1_000_000, None, "treasury")
            .unwrap();

        assert_eq!(bundle.instructions.len(), 2);
        assert!(matches!(
            bundle.payment_instruction(),
            Some(Instruction::NativeTransfer { amount: 1_000_000, .. })
        ));
        assert_eq!(bundle.required_signatures, vec!["wallet_a".to_string()]);
        assert_eq!(bundle.delegate_signatures.len(), 1);
        assert_eq!(bundle.payment_index(), Some(0));
        assert_eq!(bundle.update_index(), Some(1));
    }

    #[test]
    fn test_build_paid_token_bundle() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build(
                "wallet_a",
                "asset_1",
                "hat_crown",
                250,
                Some("tok_credits"),
                "treasury",
            )
            .unwrap();

        match bundle.payment_instruction() {
            Some(Instruction::TokenTransfer { token_id, amount, .. }) => {
                assert_eq!(token_id, "tok_credits");
                assert_eq!(*amount, 250);
            }
            other => panic!("unexpected payment instruction: {:?}", other),
        }
    }

    #[test]
    fn test_build_gift_bundle_has_no_payment_leg() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 0, None, "treasury")
            .unwrap();

        assert_eq!(bundle.instructions.len(), 1);
        assert!(bundle.payment_instruction().is_none());
        assert!(bundle.update_instruction().is_some());
        assert!(bundle.required_signatures.is_empty());
        assert!(builder.validate(&bundle).valid);
    }

    #[test]
    fn test_update_uri_derivation() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 10, None, "treasury")
            .unwrap();
        match bundle.update_instruction() {
            Some(Instruction::MetadataPointerUpdate { new_uri, authority, .. }) => {
                assert_eq!(new_uri, "https://assets.test/metadata/asset_1/hat_crown");
                assert_eq!(authority, "delegate_dev");
            }
            other => panic!("unexpected update instruction: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_missing_update() {
        let (_, builder) = test_builder();
        let mut bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();
        bundle.instructions.retain(|i| i.is_payment());

        let result = builder.validate(&bundle);
        assert!(!result.valid);
        assert!(result.has_payment_instruction);
        assert!(!result.has_update_instruction);
        assert!(result.error.as_deref().unwrap().contains("metadata-update"));
    }

    #[test]
    fn test_validate_rejects_missing_payment() {
        let (_, builder) = test_builder();
        let mut bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();
        bundle.instructions.retain(|i| i.is_update());

        let result = builder.validate(&bundle);
        assert!(!result.valid);
        assert!(!result.has_payment_instruction);
        assert!(result.has_update_instruction);
        assert!(result.error.as_deref().unwrap().contains("payment"));
    }

    #[test]
    fn test_validate_rejects_empty_bundle() {
        let (_, builder) = test_builder();
        let mut bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();
        bundle.instructions.clear();

        let result = builder.validate(&bundle);
        assert!(!result.valid);
        assert!(result.error.as_deref().unwrap().contains("no instructions"));
    }

    #[test]
    fn test_validate_accepts_complete_bundle() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();

        let result = builder.validate(&bundle);
        assert!(result.valid);
        assert!(result.has_payment_instruction);
        assert!(result.has_update_instruction);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_digest_excludes_signatures() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();
        let digest = bundle.digest().unwrap();

        let mut stripped = bundle.clone();
        stripped.delegate_signatures.clear();
        assert_eq!(stripped.digest().unwrap(), digest);
    }

    #[test]
    fn test_delegate_signature_verifies() {
        let ledger: Arc<ScriptedLedger> = Arc::new(ScriptedLedger::new());
        let delegate = Arc::new(DelegateSigner::generate("delegate_dev"));
        let builder =
            TransactionBuilder::new(ledger, delegate.clone(), "https://assets.test/metadata");

        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();
        let digest = bundle.digest().unwrap();
        let sig = &bundle.delegate_signatures[0];
        assert!(delegate.verify_update(&digest, &sig.signature).is_ok());
    }

    #[test]
    fn test_encode_roundtrip() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", u64::MAX as Amount * 3, None, "treasury")
            .unwrap();

        let encoded = bundle.encode().unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        let back: UnsignedBundle = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, bundle);
        assert_eq!(back.payment_amount, u64::MAX as Amount * 3);
    }

    #[tokio::test]
    async fn test_simulate_attributes_failing_leg() {
        let (ledger, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();

        ledger.set_simulation(SimulationResult::failed_at(0, "insufficient funds"));
        let sim = builder.simulate(&bundle).await.unwrap();
        assert!(!sim.success);
        assert!(!sim.payment_executed);
        assert!(sim.update_executed);
        assert!(sim.error.as_deref().unwrap().contains("insufficient funds"));
    }

    #[tokio::test]
    async fn test_simulate_success() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();

        let sim = builder.simulate(&bundle).await.unwrap();
        assert!(sim.success);
        assert!(sim.payment_executed);
        assert!(sim.update_executed);
        assert!(sim.error.is_none());
    }

    #[tokio::test]
    async fn test_submit_requires_user_signature_for_paid_bundle() {
        let (_, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 100, None, "treasury")
            .unwrap();

        let err = builder.submit(&bundle, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_submit_gift_bundle_without_signature() {
        let (ledger, builder) = test_builder();
        let bundle = builder
            .build("wallet_a", "asset_1", "hat_crown", 0, None, "treasury")
            .unwrap();

        let outcome = builder.submit(&bundle, None).await.unwrap();
        assert!(!outcome.payment_executed);
        assert!(outcome.update_executed);
        assert_eq!(ledger.broadcast_count(), 1);
    }
}
