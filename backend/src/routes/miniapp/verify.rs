use std::sync::Arc;

use axum::{http::StatusCode, Extension, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    middleware::AuthenticatedUser,
    polling::{poll, PollOutcome, ServerPayload},
    registry::{
        NewRequest, ProofSubmission, RegistryError, RequestRegistry, CHAIN_ID_REGEX,
        EVM_ADDRESS_REGEX,
    },
    types::{AppError, ValidatedJson, ValidatedQuery},
};

/// Request to start a wallet verification
#[derive(Debug, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    /// Wallet address to be verified
    #[validate(regex(path = *EVM_ADDRESS_REGEX, message = "invalid_address"))]
    pub address: String,
    /// World App username of the wallet owner, with or without `@`
    #[serde(default)]
    pub world_username: Option<String>,
    /// EIP-155 chain id in decimal
    #[validate(regex(path = *CHAIN_ID_REGEX, message = "invalid_chain_id"))]
    pub chain_id: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequestResponse {
    pub request_id: String,
    /// Six digit code the user types into the mini-app
    pub code: String,
}

/// Look up a pending request by code or id
#[derive(Debug, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GetWalletRequestQuery {
    #[serde(default)]
    #[validate(length(min = 1, message = "invalid_request"))]
    pub code: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "invalid_request"))]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetWalletRequestResponse {
    pub request_id: String,
    pub chain_id: String,
    pub address: String,
    /// Signal the proof must be generated for
    pub signal: String,
}

/// Proof generated by the mini-app for a request
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SubmitProofRequest {
    /// Request id
    #[validate(length(min = 1, message = "invalid_request_id"))]
    pub id: String,
    #[validate(length(min = 1, message = "invalid_merkle_root"))]
    pub merkle_root: String,
    #[validate(length(min = 1, message = "invalid_nullifier_hash"))]
    pub nullifier_hash: String,
    #[validate(length(min = 1, message = "invalid_proof"))]
    pub proof: String,
    /// `orb` or `device`
    #[validate(length(min = 1, message = "invalid_verification_level"))]
    pub verification_level: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SubmitProofResponse {
    pub success: bool,
    /// Reason the proof was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PollingQuery {
    #[validate(length(min = 1, message = "invalid_request_id"))]
    pub request_id: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollingResponse {
    /// Whether the attestation is available
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_payload: Option<ServerPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// Request wallet verification
///
/// Called by the dApp. Creates a pending request for the wallet and returns
/// the request id to poll and the code the user enters in the mini-app.
///
/// # Errors
///
/// - `400 BAD_REQUEST` - Invalid address or chain id, unknown World username
/// - `500 INTERNAL_SERVER_ERROR` - Storage failure
pub async fn create_request(
    Extension(registry): Extension<Arc<RequestRegistry>>,
    ValidatedJson(payload): ValidatedJson<CreateWalletRequest>,
) -> Result<Json<CreateWalletRequestResponse>, AppError> {
    let created = registry
        .create_request(NewRequest {
            chain_id: payload.chain_id,
            address: payload.address,
            world_username: payload.world_username,
            world_address: None,
        })
        .await?;

    Ok(Json(CreateWalletRequestResponse {
        request_id: created.request_id,
        code: created.code,
    }))
}

/// Get a pending wallet verification request
///
/// Resolves the code the user typed (or a request id) into the request the
/// mini-app must prove for. Verified requests no longer resolve.
///
/// # Errors
///
/// - `400 BAD_REQUEST` - Neither code nor requestId, or no pending request
/// - `401 UNAUTHORIZED` - Missing or invalid session
pub async fn get_request(
    _user: AuthenticatedUser,
    Extension(registry): Extension<Arc<RequestRegistry>>,
    ValidatedQuery(query): ValidatedQuery<GetWalletRequestQuery>,
) -> Result<Json<GetWalletRequestResponse>, AppError> {
    let lookup = match (query.code, query.request_id) {
        (Some(code), _) => registry.get_by_code(&code).await,
        (None, Some(request_id)) => registry.get_pending_by_id(&request_id).await,
        (None, None) => return Err(AppError::invalid_request()),
    };

    let request = lookup.map_err(|err| match err {
        RegistryError::NotFound => AppError::invalid_request(),
        other => other.into(),
    })?;

    Ok(Json(GetWalletRequestResponse {
        request_id: request.id,
        chain_id: request.chain,
        address: request.address,
        signal: request.signal,
    }))
}

/// Submit a World ID proof for a request
///
/// Verifies the proof, signs the attestation and stores both. A rejected
/// proof answers `{success: false, message}` and leaves the request pending.
///
/// # Errors
///
/// - `400 BAD_REQUEST` - Unknown request id or malformed proof fields
/// - `401 UNAUTHORIZED` - Missing or invalid session
/// - `500 INTERNAL_SERVER_ERROR` - Signing or storage failure
pub async fn submit_proof(
    user: AuthenticatedUser,
    Extension(registry): Extension<Arc<RequestRegistry>>,
    ValidatedJson(payload): ValidatedJson<SubmitProofRequest>,
) -> Result<(StatusCode, Json<SubmitProofResponse>), AppError> {
    let result = registry
        .submit_proof(
            &payload.id,
            ProofSubmission {
                merkle_root: payload.merkle_root,
                nullifier_hash: payload.nullifier_hash,
                proof: payload.proof,
                verification_level: payload.verification_level,
            },
            &user.world_address,
        )
        .await;

    match result {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(SubmitProofResponse {
                success: true,
                message: None,
            }),
        )),
        Err(RegistryError::ProofRejected(message)) => Ok((
            StatusCode::BAD_REQUEST,
            Json(SubmitProofResponse {
                success: false,
                message: Some(message),
            }),
        )),
        Err(err) => Err(err.into()),
    }
}

/// Poll wallet verification status
///
/// Public. Returns `{done: false}` until a proof is submitted, then the
/// signed attestation. Never re-signs, so repeated polls are identical.
///
/// # Errors
///
/// - `400 BAD_REQUEST` - Unknown request id
pub async fn polling(
    Extension(registry): Extension<Arc<RequestRegistry>>,
    ValidatedQuery(query): ValidatedQuery<PollingQuery>,
) -> Result<Json<PollingResponse>, AppError> {
    let response = match poll(&registry, &query.request_id).await? {
        PollOutcome::Pending => PollingResponse {
            done: false,
            server_payload: None,
            chain_id: None,
        },
        PollOutcome::Signed { payload, chain_id } => PollingResponse {
            done: true,
            server_payload: Some(payload),
            chain_id: Some(chain_id),
        },
    };

    Ok(Json(response))
}
