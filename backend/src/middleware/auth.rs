use std::sync::Arc;

use aide::OperationIo;
use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
        HeaderMap, StatusCode,
    },
};

use crate::{
    jwt::{SessionClaims, SessionVerifier},
    types::{AppError, Environment},
};

/// Cookie set by the mini-app login flow
pub const SESSION_COOKIE: &str = "ja";

/// Authenticated mini-app user extracted from the session token
#[derive(Debug, Clone, OperationIo)]
pub struct AuthenticatedUser {
    /// World App wallet address of the user
    pub world_address: String,
}

impl From<SessionClaims> for AuthenticatedUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            world_address: claims.address,
        }
    }
}

/// Reads the session token from the `ja` cookie, falling back to a Bearer header
fn session_token(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            pair.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    })
}

/// Axum extractor for the authenticated user
///
/// Validates the session token with the `SessionVerifier` from the request
/// extensions and returns 401 for missing or invalid tokens:
/// ```ignore
/// async fn protected_handler(user: AuthenticatedUser) -> Result<impl IntoResponse, AppError> {
///     Ok(user.world_address)
/// }
/// ```
///
/// In development, `DISABLE_AUTH=true` skips validation and uses the token
/// itself as the world address.
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized - Authentication required",
                false,
            )
        })?;

        let disable_auth = parts
            .extensions
            .get::<Environment>()
            .is_some_and(Environment::disable_auth);
        if disable_auth {
            return Ok(Self {
                world_address: token.to_string(),
            });
        }

        let verifier = parts
            .extensions
            .get::<Arc<SessionVerifier>>()
            .ok_or_else(|| {
                tracing::error!("SessionVerifier missing from request extensions");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                    false,
                )
            })?;

        let claims = verifier.validate(token).map_err(|_| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid token",
                false,
            )
        })?;

        Ok(claims.into())
    }
}
