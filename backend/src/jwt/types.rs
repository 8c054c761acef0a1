use serde::{Deserialize, Serialize};

/// Claims of a mini-app session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// World App wallet address of the user
    pub address: String,
    /// World App username
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    /// Expiry (unix seconds), absent on tokens that never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl SessionClaims {
    /// Claims for `address` with no expiry
    #[must_use]
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: None,
            profile_picture_url: None,
            exp: None,
        }
    }
}
