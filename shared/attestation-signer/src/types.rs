//! Error types for attestation binding and signing.

use thiserror::Error;

/// Errors that can occur while binding proof fields or signing an attestation
#[derive(Debug, Error)]
pub enum AttestationError {
    /// A proof field, address or chain id could not be parsed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The server key could not be loaded
    #[error("Server key unavailable: {0}")]
    KeyUnavailable(String),

    /// The key holder failed to produce a signature
    #[error("Failed to sign attestation: {0}")]
    SigningFailure(String),
}

/// Result type for attestation operations
pub type AttestationResult<T, E = AttestationError> = Result<T, E>;
