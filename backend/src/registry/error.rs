use attestation_signer::AttestationError;
use backend_storage::wallet_verify_request::WalletVerifyRequestStorageError;
use thiserror::Error;

use crate::world_id::error::WorldIdError;

/// Errors from the wallet verify request registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Missing or malformed chain, address or proof field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown request id, or a code with no pending request
    #[error("Wallet verify request not found")]
    NotFound,

    /// The World App username does not exist
    #[error("World username not found: {0}")]
    UsernameNotFound(String),

    /// The developer portal rejected the proof; the request stays pending
    #[error("Proof rejected: {0}")]
    ProofRejected(String),

    /// Every generated code collided with a pending request
    #[error("No free verification code")]
    CodeSpaceExhausted,

    /// Signing the attestation failed
    #[error(transparent)]
    Attestation(#[from] AttestationError),

    /// The request table failed
    #[error(transparent)]
    Storage(#[from] WalletVerifyRequestStorageError),

    /// An upstream World ID service failed
    #[error(transparent)]
    WorldId(#[from] WorldIdError),
}
