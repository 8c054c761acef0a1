//! HumanPass attestation signing
//!
//! Turns a World ID proof that was verified off-chain into an EIP-712 `Attest`
//! signature that any EVM chain can check without re-running the proof.
//!
//! # Components
//! - `field`: hash commitments over proof, action and signal strings
//! - `signer`: typed-data construction and signing with the server key
//! - `key`: custody of the server key (local secp256k1 key or AWS KMS)

/// Hash commitments for proof fields
pub mod field;

/// Server key custody
pub mod key;

/// EIP-712 attestation signer
pub mod signer;

/// Error types
pub mod types;

pub use field::{
    hash_str_to_field, hash_to_field, keccak256_hex, parse_verification_level, sha256_hex,
    FieldHash, ProofBinding, ProofCommitments, VerificationLevel,
};
pub use key::{KmsKeySigner, LocalKeySigner, TypedDataSigner};
pub use signer::{
    fresh_nonce, Attest, AttestationSigner, SignRequest, SignedAttestation, TypedAttestation,
    ATTESTATION_DOMAIN_NAME, ATTESTATION_DOMAIN_VERSION, ATTESTATION_VALIDITY_SECS,
};
pub use types::{AttestationError, AttestationResult};
