use std::sync::Arc;

use aide::axum::{routing::get, ApiRouter};
use axum::{Extension, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    registry::{RequestRegistry, EVM_ADDRESS_REGEX},
    types::{AppError, ValidatedQuery},
};

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct WalletCheckQuery {
    /// Wallet address, matched exactly as submitted
    #[validate(regex(path = *EVM_ADDRESS_REGEX, message = "invalid_address"))]
    pub address: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletCheckResponse {
    pub verified: bool,
    /// RFC 3339 time of the latest attestation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
}

/// Check whether a wallet was verified
///
/// # Errors
///
/// - `400 BAD_REQUEST` - Malformed address
pub async fn wallet_check(
    Extension(registry): Extension<Arc<RequestRegistry>>,
    ValidatedQuery(query): ValidatedQuery<WalletCheckQuery>,
) -> Result<Json<WalletCheckResponse>, AppError> {
    let verified_at = registry.verified_at(&query.address).await?;

    Ok(Json(WalletCheckResponse {
        verified: verified_at.is_some(),
        verified_at: verified_at.map(|at| at.to_rfc3339()),
    }))
}

pub fn handler() -> ApiRouter {
    ApiRouter::new().api_route("/public/wallet/check", get(wallet_check))
}
