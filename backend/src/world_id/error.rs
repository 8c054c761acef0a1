use thiserror::Error;

/// Errors from the World ID developer portal and username service
#[derive(Debug, Error)]
pub enum WorldIdError {
    /// The developer portal rejected the proof
    #[error("Proof rejected ({code}): {detail}")]
    ProofRejected {
        /// Portal error code, e.g. `invalid_proof`
        code: String,
        /// Human-readable reason returned to the client
        detail: String,
    },

    /// No World App user has this username
    #[error("World username not found: {0}")]
    UsernameNotFound(String),

    /// Transport failure talking to an upstream
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest_middleware::Error),

    /// The HTTP client could not be built or the body could not be read
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Unexpected status or body from an upstream
    #[error("Unexpected upstream response: {0}")]
    InvalidResponse(String),
}
