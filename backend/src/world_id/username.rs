use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use super::{error::WorldIdError, request::http_client};

/// Characters a World App username may contain
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("Invalid regex"));

/// A World App user as returned by the username service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldUser {
    pub username: String,
    /// World App wallet address
    pub address: String,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Resolves World App usernames to wallet addresses
#[async_trait::async_trait]
pub trait UsernameResolver: Send + Sync {
    /// Looks up `username` (without the leading `@`)
    async fn resolve(&self, username: &str) -> Result<WorldUser, WorldIdError>;
}

/// Client for `GET {base}/api/v1/{username}`
pub struct WorldUsernameClient {
    http_client: ClientWithMiddleware,
    base_url: String,
}

impl WorldUsernameClient {
    /// Creates a client for the username service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self, WorldIdError> {
        Ok(Self {
            http_client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl UsernameResolver for WorldUsernameClient {
    async fn resolve(&self, username: &str) -> Result<WorldUser, WorldIdError> {
        // The name becomes a path segment of the upstream URL
        if !USERNAME_REGEX.is_match(username) || username.chars().all(|c| c == '.') {
            return Err(WorldIdError::UsernameNotFound(username.to_string()));
        }

        let response = self
            .http_client
            .get(format!("{}/api/v1/{username}", self.base_url))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<WorldUser>().await?),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                Err(WorldIdError::UsernameNotFound(username.to_string()))
            }
            status => Err(WorldIdError::InvalidResponse(format!(
                "Username service returned {status}"
            ))),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::HashMap;

    use super::{UsernameResolver, WorldIdError, WorldUser};

    /// Fixed username table
    #[derive(Default)]
    pub struct MockUsernameResolver {
        users: HashMap<String, String>,
    }

    impl MockUsernameResolver {
        /// Registers `username` with `address`
        #[must_use]
        pub fn with_user(mut self, username: &str, address: &str) -> Self {
            self.users.insert(username.to_string(), address.to_string());
            self
        }
    }

    #[async_trait::async_trait]
    impl UsernameResolver for MockUsernameResolver {
        async fn resolve(&self, username: &str) -> Result<WorldUser, WorldIdError> {
            self.users
                .get(username)
                .map(|address| WorldUser {
                    username: username.to_string(),
                    address: address.clone(),
                    profile_picture_url: None,
                })
                .ok_or_else(|| WorldIdError::UsernameNotFound(username.to_string()))
        }
    }
}
