//! Custody of the server attestation key.
//!
//! The signer only ever sees the key through [`TypedDataSigner`], which takes a
//! finished EIP-712 signing hash. Request data never reaches the key holder.

use std::str::FromStr;

use alloy::{
    primitives::{Address, Signature, B256},
    signers::{aws::AwsSigner, local::PrivateKeySigner, Signer},
};
use aws_sdk_kms::Client as KmsClient;

use crate::types::{AttestationError, AttestationResult};

/// A key holder able to sign a 32-byte EIP-712 digest
#[async_trait::async_trait]
pub trait TypedDataSigner: Send + Sync {
    /// Address of the signing key, as seen by the on-chain verifier
    fn address(&self) -> Address;

    /// Signs a prehashed EIP-712 digest
    async fn sign_hash(&self, hash: B256) -> AttestationResult<Signature>;
}

/// secp256k1 key held in process memory
pub struct LocalKeySigner {
    inner: PrivateKeySigner,
}

impl LocalKeySigner {
    /// Loads a key from its `0x` hex encoding
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::KeyUnavailable` if the key cannot be parsed
    pub fn from_hex(private_key: &str) -> AttestationResult<Self> {
        let inner = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| AttestationError::KeyUnavailable(format!("Invalid private key: {e}")))?;

        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl TypedDataSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_hash(&self, hash: B256) -> AttestationResult<Signature> {
        Signer::sign_hash(&self.inner, &hash)
            .await
            .map_err(|e| AttestationError::SigningFailure(e.to_string()))
    }
}

/// secp256k1 key that never leaves AWS KMS (`ECC_SECG_P256K1`)
pub struct KmsKeySigner {
    inner: AwsSigner,
}

impl KmsKeySigner {
    /// Connects to the KMS key and fetches its public key to derive the address
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::KeyUnavailable` if the key cannot be described
    pub async fn new(kms_client: KmsClient, key_id: String) -> AttestationResult<Self> {
        let inner = AwsSigner::new(kms_client, key_id.clone(), None)
            .await
            .map_err(|e| AttestationError::KeyUnavailable(format!("KMS key {key_id}: {e}")))?;

        tracing::info!("KMS attestation key {key_id} loaded ({})", inner.address());

        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl TypedDataSigner for KmsKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_hash(&self, hash: B256) -> AttestationResult<Signature> {
        Signer::sign_hash(&self.inner, &hash)
            .await
            .map_err(|e| AttestationError::SigningFailure(format!("KMS sign failed: {e}")))
    }
}
