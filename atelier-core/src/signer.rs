//! Delegate authority signing
//!
//! Ed25519 signing for the metadata-update leg. The delegate key is held
//! server-side and authorizes pointer rewrites on assets the server does not
//! own; end-user keys are never handled here. Signatures are made over the
//! bundle digest under a domain separation tag.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

use crate::config::DelegateConfig;
use crate::error::{CoreError, CoreResult};

/// Domain tag for metadata-update authorization
pub const METADATA_UPDATE_DOMAIN: &[u8] = b"atelier:MetadataUpdate:v1\0";

/// Server-held delegate authority key
#[derive(Clone)]
pub struct DelegateSigner {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    /// On-ledger address of the authority
    pub authority_address: String,
}

impl DelegateSigner {
    /// Generate a fresh key (development use)
    pub fn generate(authority_address: impl Into<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            authority_address: authority_address.into(),
        }
    }

    /// Load from a hex-encoded 32-byte seed
    pub fn from_hex(authority_address: impl Into<String>, hex_str: &str) -> CoreResult<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CoreError::Signer(format!("Invalid hex seed: {}", e)))?;
        if bytes.len() != 32 {
            return Err(CoreError::Signer(format!(
                "Invalid key length: expected 32, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        let signing_key = SigningKey::from_bytes(&arr);
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
            authority_address: authority_address.into(),
        })
    }

    /// Build from configuration; absent seed generates a fresh dev key
    pub fn from_config(config: &DelegateConfig) -> CoreResult<Self> {
        match &config.secret_key_hex {
            Some(seed) => Self::from_hex(&config.authority_address, seed),
            None => Ok(Self::generate(&config.authority_address)),
        }
    }

    /// Public key as hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }

    /// Sign a bundle digest; returns the hex signature
    pub fn sign_update(&self, bundle_digest: &[u8; 32]) -> String {
        let mut input = Vec::with_capacity(METADATA_UPDATE_DOMAIN.len() + bundle_digest.len());
        input.extend_from_slice(METADATA_UPDATE_DOMAIN);
        input.extend_from_slice(bundle_digest);
        hex::encode(self.signing_key.sign(&input).to_bytes())
    }

    /// Verify a hex signature over a bundle digest
    pub fn verify_update(&self, bundle_digest: &[u8; 32], signature_hex: &str) -> CoreResult<()> {
        let sig_bytes = hex::decode(signature_hex)
            .map_err(|e| CoreError::Signer(format!("Invalid hex signature: {}", e)))?;
        if sig_bytes.len() != 64 {
            return Err(CoreError::Signer(format!(
                "Invalid signature length: expected 64, got {}",
                sig_bytes.len()
            )));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&sig_bytes);
        let signature = Signature::from_bytes(&arr);

        let mut input = Vec::with_capacity(METADATA_UPDATE_DOMAIN.len() + bundle_digest.len());
        input.extend_from_slice(METADATA_UPDATE_DOMAIN);
        input.extend_from_slice(bundle_digest);

        self.verifying_key
            .verify(&input, &signature)
            .map_err(|e| CoreError::Signer(format!("Verification failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = DelegateSigner::generate("delegate_dev");
        let digest = [0x42; 32];

        let sig = signer.sign_update(&digest);
        assert!(signer.verify_update(&digest, &sig).is_ok());
    }

    #[test]
    fn test_tampered_digest_rejected() {
        let signer = DelegateSigner::generate("delegate_dev");
        let sig = signer.sign_update(&[0x42; 32]);
        assert!(signer.verify_update(&[0x43; 32], &sig).is_err());
    }

    #[test]
    fn test_from_hex_roundtrip() {
        let seed = [7u8; 32];
        let signer = DelegateSigner::from_hex("delegate_dev", &hex::encode(seed)).unwrap();
        let again = DelegateSigner::from_hex("delegate_dev", &hex::encode(seed)).unwrap();
        assert_eq!(signer.public_key_hex(), again.public_key_hex());
    }

    #[test]
    fn test_bad_seed_length() {
        assert!(DelegateSigner::from_hex("d", "abcd").is_err());
    }
}
