use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use super::{error::WorldIdError, request::http_client};

/// Proof fields as the developer portal expects them.
///
/// [Cloud verification](https://docs.world.org/world-id/reference/api#verify-proof)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofVerificationRequest {
    pub nullifier_hash: String,
    pub merkle_root: String,
    pub proof: String,
    /// `orb` or `device`
    pub verification_level: String,
    /// Action the proof was generated for
    pub action: String,
    /// Field-reduced hash of the signal
    pub signal_hash: String,
}

/// Error body returned by the developer portal for rejected proofs
#[derive(Debug, Deserialize)]
struct PortalErrorResponse {
    code: String,
    detail: String,
    #[serde(default)]
    attribute: Option<String>,
}

/// Checks World ID proofs before the server signs for them
#[async_trait::async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Returns `Ok(())` if the proof is valid for our app, the action and the signal
    async fn verify(&self, request: &ProofVerificationRequest) -> Result<(), WorldIdError>;
}

/// Verifies proofs with `POST {portal}/api/v2/verify/{app_id}`
pub struct DeveloperPortalVerifier {
    http_client: ClientWithMiddleware,
    verify_url: String,
}

impl DeveloperPortalVerifier {
    /// Creates a verifier for one World ID app
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(portal_url: &str, app_id: &str) -> Result<Self, WorldIdError> {
        Ok(Self {
            http_client: http_client()?,
            verify_url: format!("{}/api/v2/verify/{app_id}", portal_url.trim_end_matches('/')),
        })
    }
}

#[async_trait::async_trait]
impl ProofVerifier for DeveloperPortalVerifier {
    async fn verify(&self, request: &ProofVerificationRequest) -> Result<(), WorldIdError> {
        let response = self
            .http_client
            .post(&self.verify_url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                nullifier_hash = %request.nullifier_hash,
                "Proof verified by developer portal"
            );
            return Ok(());
        }

        let body = response.text().await?;

        match serde_json::from_str::<PortalErrorResponse>(&body) {
            Ok(error) if status.is_client_error() => {
                tracing::info!(
                    code = %error.code,
                    attribute = ?error.attribute,
                    "Proof rejected by developer portal"
                );
                Err(WorldIdError::ProofRejected {
                    code: error.code,
                    detail: error.detail,
                })
            }
            _ => Err(WorldIdError::InvalidResponse(format!(
                "Status {status}: {body}"
            ))),
        }
    }
}

/// Accepts every proof. Development only.
pub struct SkipVerification;

#[async_trait::async_trait]
impl ProofVerifier for SkipVerification {
    async fn verify(&self, request: &ProofVerificationRequest) -> Result<(), WorldIdError> {
        tracing::warn!(
            nullifier_hash = %request.nullifier_hash,
            "Proof verification disabled, trusting submitted proof"
        );
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use tokio::sync::Mutex;

    use super::{ProofVerificationRequest, ProofVerifier, WorldIdError};

    /// Records every request and optionally rejects them
    #[derive(Default)]
    pub struct MockProofVerifier {
        rejection: Option<(String, String)>,
        requests: Mutex<Vec<ProofVerificationRequest>>,
    }

    impl MockProofVerifier {
        /// A verifier that accepts every proof
        #[must_use]
        pub fn accepting() -> Self {
            Self::default()
        }

        /// A verifier that rejects every proof with `code` and `detail`
        #[must_use]
        pub fn rejecting(code: &str, detail: &str) -> Self {
            Self {
                rejection: Some((code.to_string(), detail.to_string())),
                requests: Mutex::default(),
            }
        }

        /// Requests seen so far
        pub async fn requests(&self) -> Vec<ProofVerificationRequest> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl ProofVerifier for MockProofVerifier {
        async fn verify(&self, request: &ProofVerificationRequest) -> Result<(), WorldIdError> {
            self.requests.lock().await.push(request.clone());

            match &self.rejection {
                Some((code, detail)) => Err(WorldIdError::ProofRejected {
                    code: code.clone(),
                    detail: detail.clone(),
                }),
                None => Ok(()),
            }
        }
    }
}
