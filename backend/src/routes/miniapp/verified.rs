use std::sync::Arc;

use axum::{extract::Path, Extension, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    middleware::AuthenticatedUser,
    registry::{RegistryError, RequestRegistry},
    types::AppError,
};

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedWalletItem {
    pub request_id: String,
    /// Redacted wallet address, e.g. `0x70...79C8`
    pub address: String,
    pub chains: Vec<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct VerifiedWalletListResponse {
    pub list: Vec<VerifiedWalletItem>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerifiedRequestPath {
    pub request_id: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedRequestResponse {
    pub request_id: String,
    pub chain_id: String,
    pub address: String,
}

/// List verified wallets
///
/// Wallets the signed-in World App user has verified, grouped by address.
///
/// # Errors
///
/// - `401 UNAUTHORIZED` - Missing or invalid session
pub async fn list(
    user: AuthenticatedUser,
    Extension(registry): Extension<Arc<RequestRegistry>>,
) -> Result<Json<VerifiedWalletListResponse>, AppError> {
    let list = registry
        .list_verified(&user.world_address)
        .await?
        .into_iter()
        .map(|wallet| VerifiedWalletItem {
            request_id: wallet.request_id,
            address: wallet.address,
            chains: wallet.chains,
        })
        .collect();

    Ok(Json(VerifiedWalletListResponse { list }))
}

/// Get a request by id
///
/// Used by the mini-app result screen, in any state.
///
/// # Errors
///
/// - `400 BAD_REQUEST` - Unknown request id
/// - `401 UNAUTHORIZED` - Missing or invalid session
pub async fn get_request(
    _user: AuthenticatedUser,
    Extension(registry): Extension<Arc<RequestRegistry>>,
    Path(path): Path<VerifiedRequestPath>,
) -> Result<Json<VerifiedRequestResponse>, AppError> {
    let request = registry
        .get_by_id(&path.request_id)
        .await
        .map_err(|err| match err {
            RegistryError::NotFound => AppError::invalid_request(),
            other => other.into(),
        })?;

    Ok(Json(VerifiedRequestResponse {
        request_id: request.id,
        chain_id: request.chain,
        address: request.address,
    }))
}
