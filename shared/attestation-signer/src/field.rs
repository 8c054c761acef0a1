//! Hash commitments over World ID proof data.
//!
//! Two hash families live here and must not be mixed up:
//! - field hashes (`hash_to_field`) are `keccak256 >> 8` so the result fits the
//!   BN254 scalar field; they are the public inputs of the World ID verifier.
//! - content hashes (`keccak256_hex`, `sha256_hex`) are plain digests used as
//!   tamper-evidence commitments inside the attestation.

use std::str::FromStr;

use alloy::primitives::{keccak256, Address, B256, U256};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, EnumString};

use crate::types::{AttestationError, AttestationResult};

/// A keccak256 hash reduced into the proof system's field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHash {
    /// Numeric value, always below `2^248`
    pub value: U256,
    /// `0x` followed by 64 lowercase hex digits
    pub digest: String,
}

/// Hashes raw bytes into a field element.
///
/// The top byte of the keccak256 digest is dropped so the value stays inside
/// the field modulus.
#[must_use]
pub fn hash_to_field(input: &[u8]) -> FieldHash {
    let value: U256 = U256::from_be_bytes(keccak256(input).0) >> 8usize;
    let digest = format!("0x{}", hex::encode(value.to_be_bytes::<32>()));

    FieldHash { value, digest }
}

/// Hashes a string into a field element.
///
/// `0x`-prefixed strings are hex and hashed as the bytes they encode, with an
/// odd digit count padded by a leading zero. Anything else is hashed as its
/// UTF-8 bytes. This matches how the mini-app computes the same value.
///
/// # Errors
///
/// Returns `AttestationError::InvalidInput` for a `0x` string with non-hex digits
pub fn hash_str_to_field(input: &str) -> AttestationResult<FieldHash> {
    let Some(digits) = input.strip_prefix("0x") else {
        return Ok(hash_to_field(input.as_bytes()));
    };

    let bytes = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))
    } else {
        hex::decode(digits)
    }
    .map_err(|e| AttestationError::InvalidInput(format!("Invalid hex string {input:?}: {e}")))?;

    Ok(hash_to_field(&bytes))
}

/// Plain keccak256 content hash as `0x` hex
#[must_use]
pub fn keccak256_hex(input: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(input)))
}

/// Plain sha256 content hash as `0x` hex
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    format!("0x{}", hex::encode(Sha256::digest(input)))
}

/// Trust tier of the World ID credential behind a proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum VerificationLevel {
    /// Phone-bound device credential
    Device = 1,
    /// Orb biometric credential
    Orb = 2,
}

impl VerificationLevel {
    /// Numeric encoding used inside the attestation
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Parses the HTTP encoding of a verification level into its attestation value.
///
/// # Errors
///
/// Returns `AttestationError::InvalidInput` for anything other than `device` or `orb`
pub fn parse_verification_level(level: &str) -> AttestationResult<u8> {
    VerificationLevel::from_str(level)
        .map(VerificationLevel::as_u8)
        .map_err(|_| AttestationError::InvalidInput(format!("Invalid verification level: {level}")))
}

/// Borrowed proof data as it arrives over HTTP or sits in storage
#[derive(Debug, Clone, Copy)]
pub struct ProofBinding<'a> {
    /// Wallet being attested
    pub account: &'a str,
    /// Proof nullifier hash
    pub nullifier_hash: &'a str,
    /// World ID merkle root
    pub merkle_root: &'a str,
    /// Packed proof
    pub proof: &'a str,
    /// `device` or `orb`
    pub verification_level: &'a str,
    /// World ID action string
    pub action: &'a str,
    /// Signal commitment stored on the request
    pub signal_hash: &'a str,
}

/// Every attestation field except the server deadline and nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofCommitments {
    pub account: Address,
    pub nullifier_hash: B256,
    pub merkle_root: B256,
    pub proof_hash_keccak256: B256,
    pub proof_hash_sha256: B256,
    pub verification_level: VerificationLevel,
    pub action_hash: B256,
    pub signal_hash: B256,
}

impl ProofCommitments {
    /// Derives the commitments from proof data. Pure and deterministic.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidInput` if the account is not an address,
    /// a 32-byte field is malformed, or the verification level is unknown
    pub fn bind(binding: &ProofBinding<'_>) -> AttestationResult<Self> {
        let verification_level = VerificationLevel::from_str(binding.verification_level)
            .map_err(|_| {
                AttestationError::InvalidInput(format!(
                    "Invalid verification level: {}",
                    binding.verification_level
                ))
            })?;

        Ok(Self {
            account: Address::from_str(binding.account).map_err(|e| {
                AttestationError::InvalidInput(format!("Invalid account address: {e}"))
            })?,
            nullifier_hash: parse_bytes32("nullifier_hash", binding.nullifier_hash)?,
            merkle_root: parse_bytes32("merkle_root", binding.merkle_root)?,
            proof_hash_keccak256: keccak256(binding.proof.as_bytes()),
            proof_hash_sha256: B256::from_slice(&Sha256::digest(binding.proof.as_bytes())),
            verification_level,
            action_hash: keccak256(binding.action.as_bytes()),
            signal_hash: parse_bytes32("signal_hash", binding.signal_hash)?,
        })
    }
}

fn parse_bytes32(field: &str, value: &str) -> AttestationResult<B256> {
    B256::from_str(value)
        .map_err(|e| AttestationError::InvalidInput(format!("Invalid {field}: {e}")))
}
