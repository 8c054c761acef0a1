//! EIP-712 attestation signer.
//!
//! The `Attest` struct layout and the domain are part of the wire contract with
//! the on-chain `HumanPassVerifier`; changing field order or types breaks every
//! signature.

use std::{borrow::Cow, sync::Arc};

use alloy::{
    primitives::{Address, B256, U256},
    sol,
    sol_types::{Eip712Domain, SolStruct},
};
use chrono::{DateTime, Utc};

use crate::{
    field::{ProofBinding, ProofCommitments},
    key::TypedDataSigner,
    types::{AttestationError, AttestationResult},
};

/// EIP-712 domain name
pub const ATTESTATION_DOMAIN_NAME: &str = "HumanPassAttestation";

/// EIP-712 domain version
pub const ATTESTATION_DOMAIN_VERSION: &str = "1";

/// How long a server signature stays valid (3 hours)
pub const ATTESTATION_VALIDITY_SECS: i64 = 3 * 60 * 60;

sol! {
    /// Attestation consumed by the on-chain verifier
    #[derive(Debug, PartialEq, Eq)]
    struct Attest {
        address account;
        bytes32 nullifier_hash;
        bytes32 merkle_root;
        bytes32 proof_hash_keccak256;
        bytes32 proof_hash_sha256;
        uint8 verification_level;
        bytes32 action_hash;
        bytes32 signal_hash;
        uint256 server_deadline;
        uint256 server_nonce;
    }
}

/// Everything needed to sign one attestation
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    /// Proof data bound into the attestation
    pub binding: ProofBinding<'a>,
    /// Target EVM chain id in decimal
    pub chain_id: &'a str,
    /// Caller-chosen nonce, embedded verbatim
    pub nonce: U256,
}

/// Domain and message of an attestation, ready to hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedAttestation {
    pub domain: Eip712Domain,
    pub message: Attest,
}

impl TypedAttestation {
    /// The EIP-712 digest handed to the key holder
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }

    /// Canonical type string, `Attest(address account,...)`
    #[must_use]
    pub fn encode_type() -> Cow<'static, str> {
        Attest::eip712_encode_type()
    }
}

/// A signed attestation
#[derive(Debug, Clone)]
pub struct SignedAttestation {
    pub typed: TypedAttestation,
    /// 65-byte `r || s || v` signature as `0x` hex
    pub signature: String,
}

/// Signs attestations for one verifying contract with one server key
pub struct AttestationSigner {
    key: Arc<dyn TypedDataSigner>,
    verifying_contract: Address,
}

impl AttestationSigner {
    /// Creates a signer bound to the deployment's verifier contract
    #[must_use]
    pub fn new(key: Arc<dyn TypedDataSigner>, verifying_contract: Address) -> Self {
        Self {
            key,
            verifying_contract,
        }
    }

    /// Address the on-chain verifier must trust
    #[must_use]
    pub fn signer_address(&self) -> Address {
        self.key.address()
    }

    /// Builds the typed data as it would be signed at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidInput` if the chain id or a proof field is malformed
    pub fn typed_data(
        &self,
        request: &SignRequest<'_>,
        now: DateTime<Utc>,
    ) -> AttestationResult<TypedAttestation> {
        let chain_id = U256::from_str_radix(request.chain_id, 10).map_err(|e| {
            AttestationError::InvalidInput(format!("Invalid chain id {}: {e}", request.chain_id))
        })?;

        let commitments = ProofCommitments::bind(&request.binding)?;
        let server_deadline = U256::from(now.timestamp() + ATTESTATION_VALIDITY_SECS);

        Ok(TypedAttestation {
            domain: Eip712Domain::new(
                Some(Cow::Borrowed(ATTESTATION_DOMAIN_NAME)),
                Some(Cow::Borrowed(ATTESTATION_DOMAIN_VERSION)),
                Some(chain_id),
                Some(self.verifying_contract),
                None,
            ),
            message: Attest {
                account: commitments.account,
                nullifier_hash: commitments.nullifier_hash,
                merkle_root: commitments.merkle_root,
                proof_hash_keccak256: commitments.proof_hash_keccak256,
                proof_hash_sha256: commitments.proof_hash_sha256,
                verification_level: commitments.verification_level.as_u8(),
                action_hash: commitments.action_hash,
                signal_hash: commitments.signal_hash,
                server_deadline,
                server_nonce: request.nonce,
            },
        })
    }

    /// Signs an attestation valid for three hours from now.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidInput` for malformed input and
    /// `AttestationError::SigningFailure` if the key holder fails
    pub async fn sign(&self, request: &SignRequest<'_>) -> AttestationResult<SignedAttestation> {
        self.sign_at(request, Utc::now()).await
    }

    /// Signs an attestation as of `now`.
    ///
    /// # Errors
    ///
    /// See [`AttestationSigner::sign`]
    pub async fn sign_at(
        &self,
        request: &SignRequest<'_>,
        now: DateTime<Utc>,
    ) -> AttestationResult<SignedAttestation> {
        let typed = self.typed_data(request, now)?;
        let signature = self.key.sign_hash(typed.signing_hash()).await?;

        tracing::debug!(
            account = %typed.message.account,
            chain_id = request.chain_id,
            server_nonce = %typed.message.server_nonce,
            server_deadline = %typed.message.server_deadline,
            "Signed attestation"
        );

        Ok(SignedAttestation {
            typed,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }
}

/// A fresh server nonce: unix seconds in the high bits, 64 random bits below.
///
/// Strictly increasing across seconds and collision-resistant within one.
#[must_use]
pub fn fresh_nonce(now: DateTime<Utc>) -> U256 {
    let seconds = u64::try_from(now.timestamp()).unwrap_or_default();
    (U256::from(seconds) << 64) | U256::from(rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use alloy::primitives::Signature;
    use chrono::TimeZone;

    use super::*;
    use crate::{field::keccak256_hex, key::LocalKeySigner};

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const VERIFIER: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    const ACCOUNT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const NULLIFIER: &str = "0x1359a81e3a42dc1c34786cbefbcc672a3d730510dba7a3be9941b207b0cf52fa";
    const ROOT: &str = "0x2a7c09e8af01f39a87d89e9f0a9ba66fbf6fb304cc643051dd4ea24c4e9f7e8d";

    struct FailingKey;

    #[async_trait::async_trait]
    impl TypedDataSigner for FailingKey {
        fn address(&self) -> Address {
            Address::ZERO
        }

        async fn sign_hash(&self, _hash: B256) -> AttestationResult<Signature> {
            Err(AttestationError::SigningFailure("key offline".to_string()))
        }
    }

    fn signer() -> AttestationSigner {
        AttestationSigner::new(
            Arc::new(LocalKeySigner::from_hex(DEV_KEY).unwrap()),
            Address::from_str(VERIFIER).unwrap(),
        )
    }

    fn request<'a>(signal: &'a str, chain_id: &'a str, level: &'a str) -> SignRequest<'a> {
        SignRequest {
            binding: ProofBinding {
                account: ACCOUNT,
                nullifier_hash: NULLIFIER,
                merkle_root: ROOT,
                proof: "0x0102",
                verification_level: level,
                action: "verify-ownership",
                signal_hash: signal,
            },
            chain_id,
            nonce: U256::from(1_700_000_000_u64),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_encode_type_layout() {
        assert_eq!(
            TypedAttestation::encode_type(),
            "Attest(address account,bytes32 nullifier_hash,bytes32 merkle_root,\
             bytes32 proof_hash_keccak256,bytes32 proof_hash_sha256,uint8 verification_level,\
             bytes32 action_hash,bytes32 signal_hash,uint256 server_deadline,uint256 server_nonce)"
        );
    }

    #[test]
    fn test_domain_fields() {
        let signal = keccak256_hex(b"signal");
        let typed = signer()
            .typed_data(&request(&signal, "480", "orb"), fixed_now())
            .unwrap();

        assert_eq!(typed.domain.name.as_deref(), Some(ATTESTATION_DOMAIN_NAME));
        assert_eq!(typed.domain.version.as_deref(), Some("1"));
        assert_eq!(typed.domain.chain_id, Some(U256::from(480)));
        assert_eq!(
            typed.domain.verifying_contract,
            Some(Address::from_str(VERIFIER).unwrap())
        );
        assert_eq!(typed.domain.salt, None);
    }

    #[test]
    fn test_deadline_and_nonce() {
        let signal = keccak256_hex(b"signal");
        let typed = signer()
            .typed_data(&request(&signal, "480", "orb"), fixed_now())
            .unwrap();

        assert_eq!(
            typed.message.server_deadline,
            U256::from(1_700_000_000_u64 + 3 * 3600)
        );
        assert_eq!(typed.message.server_nonce, U256::from(1_700_000_000_u64));
        assert_eq!(typed.message.verification_level, 2);
    }

    #[test]
    fn test_typed_data_is_reproducible_for_same_second() {
        let signal = keccak256_hex(b"signal");
        let signer = signer();
        let first = signer
            .typed_data(&request(&signal, "480", "device"), fixed_now())
            .unwrap();
        let second = signer
            .typed_data(&request(&signal, "480", "device"), fixed_now())
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.signing_hash(), second.signing_hash());
    }

    #[test]
    fn test_chain_id_changes_digest() {
        let signal = keccak256_hex(b"signal");
        let signer = signer();
        let world_chain = signer
            .typed_data(&request(&signal, "480", "orb"), fixed_now())
            .unwrap();
        let base = signer
            .typed_data(&request(&signal, "8453", "orb"), fixed_now())
            .unwrap();

        assert_eq!(world_chain.message, base.message);
        assert_ne!(world_chain.signing_hash(), base.signing_hash());
    }

    #[test]
    fn test_rejects_non_evm_chain() {
        let signal = keccak256_hex(b"signal");
        let result = signer().typed_data(&request(&signal, "solana", "orb"), fixed_now());
        assert!(matches!(result, Err(AttestationError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_signature_recovers_to_server_key() {
        let signal = keccak256_hex(b"signal");
        let signer = signer();
        let signed = signer
            .sign_at(&request(&signal, "480", "orb"), fixed_now())
            .await
            .unwrap();

        assert_eq!(signed.signature.len(), 2 + 65 * 2);
        let bytes = hex::decode(signed.signature.trim_start_matches("0x")).unwrap();
        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        let recovered = signature
            .recover_address_from_prehash(&signed.typed.signing_hash())
            .unwrap();
        assert_eq!(recovered, signer.signer_address());
    }

    #[tokio::test]
    async fn test_signing_failure_is_propagated() {
        let signal = keccak256_hex(b"signal");
        let signer = AttestationSigner::new(Arc::new(FailingKey), Address::ZERO);
        let result = signer.sign(&request(&signal, "480", "orb")).await;
        assert!(matches!(result, Err(AttestationError::SigningFailure(_))));
    }

    #[test]
    fn test_fresh_nonce_orders_by_second() {
        let earlier = fresh_nonce(fixed_now());
        let later = fresh_nonce(Utc.timestamp_opt(1_700_000_001, 0).unwrap());
        assert!(later > earlier);
        assert_eq!(earlier >> 64, U256::from(1_700_000_000_u64));
    }
}
