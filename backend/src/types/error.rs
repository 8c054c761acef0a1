//! Universal error handling for the API

use aide::OperationOutput;
use attestation_signer::AttestationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use backend_storage::wallet_verify_request::WalletVerifyRequestStorageError;
use schemars::JsonSchema;
use serde::Serialize;

use crate::{registry::RegistryError, world_id::error::WorldIdError};

/// API error response envelope
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    /// Whether the client should retry the request
    pub allow_retry: bool,
    /// Error details
    error: ErrorBody,
}

/// Error body containing code and message
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Application error type that wraps the API error response
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    inner: ApiErrorResponse,
}

impl AppError {
    /// Create a new application error
    #[must_use]
    pub fn new(
        status: StatusCode,
        code: impl Into<String>,
        msg: impl Into<String>,
        retry: bool,
    ) -> Self {
        Self {
            status,
            inner: ApiErrorResponse {
                allow_retry: retry,
                error: ErrorBody {
                    code: code.into(),
                    message: msg.into(),
                },
            },
        }
    }

    /// A 400 for a failed field validation, the code names the failure
    #[must_use]
    pub fn validation_from_str(field: &str, code: &str) -> Self {
        let message = if field.is_empty() {
            "Request validation failed".to_string()
        } else {
            format!("Invalid field: {field}")
        };
        Self::new(StatusCode::BAD_REQUEST, code, message, false)
    }

    /// The generic 400 returned for unknown or already used requests
    #[must_use]
    pub fn invalid_request() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Invalid request",
            false,
        )
    }

    /// HTTP status of the error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code
    #[must_use]
    pub fn code(&self) -> &str {
        &self.inner.error.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.status.as_u16() {
            400..=499 => tracing::warn!(
                "Client error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            500..=599 => tracing::error!(
                "Server error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            _ => {}
        }

        (self.status, Json(self.inner)).into_response()
    }
}

/// Convert registry errors to application errors
impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidInput(msg) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_request", msg, false)
            }
            RegistryError::NotFound => Self::new(
                StatusCode::BAD_REQUEST,
                "invalid_request_id",
                "Invalid requestId",
                false,
            ),
            RegistryError::UsernameNotFound(username) => {
                tracing::debug!("World username not found: {username}");
                Self::new(
                    StatusCode::BAD_REQUEST,
                    "world_username_not_found",
                    "World username not found",
                    false,
                )
            }
            RegistryError::ProofRejected(msg) => {
                Self::new(StatusCode::BAD_REQUEST, "proof_rejected", msg, false)
            }
            RegistryError::CodeSpaceExhausted => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "code_unavailable",
                "Could not allocate a verification code",
                true,
            ),
            RegistryError::Attestation(err) => err.into(),
            RegistryError::Storage(err) => err.into(),
            RegistryError::WorldId(err) => err.into(),
        }
    }
}

/// Convert signer errors to application errors
impl From<AttestationError> for AppError {
    fn from(err: AttestationError) -> Self {
        match err {
            AttestationError::InvalidInput(msg) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_request", msg, false)
            }
            AttestationError::KeyUnavailable(msg) | AttestationError::SigningFailure(msg) => {
                tracing::error!("Attestation signing failed: {msg}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "signing_failure",
                    "Failed to sign attestation",
                    true,
                )
            }
        }
    }
}

/// Convert storage errors to application errors
impl From<WalletVerifyRequestStorageError> for AppError {
    fn from(err: WalletVerifyRequestStorageError) -> Self {
        tracing::error!("Wallet verify request storage error: {err}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
            true,
        )
    }
}

/// Convert World ID collaborator errors to application errors
impl From<WorldIdError> for AppError {
    fn from(err: WorldIdError) -> Self {
        match err {
            WorldIdError::ProofRejected { detail, .. } => {
                Self::new(StatusCode::BAD_REQUEST, "proof_rejected", detail, false)
            }
            WorldIdError::UsernameNotFound(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "world_username_not_found",
                "World username not found",
                false,
            ),
            other => {
                tracing::error!("World ID upstream error: {other}");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "World ID service temporarily unavailable",
                    true,
                )
            }
        }
    }
}

impl OperationOutput for AppError {
    type Inner = ApiErrorResponse;

    fn operation_response(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Option<aide::openapi::Response> {
        Json::<ApiErrorResponse>::operation_response(ctx, operation)
    }
}
