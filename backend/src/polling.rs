//! Polling handshake between the dApp and the mini-app.
//!
//! The dApp only knows the request id. It polls until the mini-app has
//! submitted a proof, then receives the signed attestation. Polling never
//! signs: the payload is rebuilt from what `submit_proof` stored, so repeated
//! polls return identical bytes.

use alloy::primitives::B256;
use attestation_signer::{ProofBinding, ProofCommitments};
use backend_storage::wallet_verify_request::WalletVerifyRequest;
use schemars::JsonSchema;
use serde::Serialize;

use crate::registry::{RegistryError, RequestRegistry, VERIFY_OWNERSHIP_ACTION};

/// Attestation fields plus the server signature, as submitted on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ServerPayload {
    /// Attested wallet, checksummed
    pub account: String,
    pub nullifier_hash: String,
    pub merkle_root: String,
    pub proof_hash_keccak256: String,
    pub proof_hash_sha256: String,
    /// 1 = device, 2 = orb
    pub verification_level: u8,
    pub action_hash: String,
    pub signal_hash: String,
    /// Unix seconds, decimal
    pub server_deadline: String,
    /// Decimal uint256
    pub server_nonce: String,
    /// 65-byte `r || s || v` signature
    pub server_sig: String,
}

/// State of a request as seen by a poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No proof submitted yet
    Pending,
    /// Attestation available
    Signed {
        payload: ServerPayload,
        chain_id: String,
    },
}

fn hex32(value: &B256) -> String {
    format!("0x{}", hex::encode(value))
}

/// Rebuilds the payload of a signed request, `None` while pending
///
/// # Errors
///
/// Returns `RegistryError::Attestation` if stored proof fields no longer bind
pub fn server_payload(
    request: &WalletVerifyRequest,
) -> Result<Option<ServerPayload>, RegistryError> {
    let Some(attestation) = request.attestation() else {
        return Ok(None);
    };

    let commitments = ProofCommitments::bind(&ProofBinding {
        account: &request.address,
        nullifier_hash: attestation.nullifier_hash,
        merkle_root: attestation.merkle_root,
        proof: attestation.proof,
        verification_level: attestation.verification_level,
        action: VERIFY_OWNERSHIP_ACTION,
        signal_hash: &request.signal,
    })?;

    Ok(Some(ServerPayload {
        account: commitments.account.to_checksum(None),
        nullifier_hash: hex32(&commitments.nullifier_hash),
        merkle_root: hex32(&commitments.merkle_root),
        proof_hash_keccak256: hex32(&commitments.proof_hash_keccak256),
        proof_hash_sha256: hex32(&commitments.proof_hash_sha256),
        verification_level: commitments.verification_level.as_u8(),
        action_hash: hex32(&commitments.action_hash),
        signal_hash: hex32(&commitments.signal_hash),
        server_deadline: attestation.server_deadline.to_string(),
        server_nonce: attestation.server_nonce.to_string(),
        server_sig: attestation.server_sig.to_string(),
    }))
}

/// Polls one request.
///
/// # Errors
///
/// `RegistryError::NotFound` for unknown ids, distinct from `Pending`
pub async fn poll(
    registry: &RequestRegistry,
    request_id: &str,
) -> Result<PollOutcome, RegistryError> {
    let request = registry.get_by_id(request_id).await?;

    Ok(match server_payload(&request)? {
        Some(payload) => PollOutcome::Signed {
            payload,
            chain_id: request.chain,
        },
        None => PollOutcome::Pending,
    })
}
