//! Mini-app session tokens.
//!
//! Sessions are HS256 JWTs minted by the mini-app login flow with the shared
//! `JWT_SECRET`. This service only validates them. The `address` claim is the
//! World App wallet of the signed-in user and becomes the submitter address of
//! a proof.

pub mod error;
mod types;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

pub use types::SessionClaims;

use error::JwtError;

/// Validates session tokens signed with the shared secret
#[derive(Clone)]
pub struct SessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    /// Creates a verifier for tokens signed with `secret`
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Login tokens carry no registered claims; `exp` is still checked when present
        validation.required_spec_claims.clear();

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validates a compact token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::ValidationError` for a bad signature, a wrong algorithm,
    /// an expired token or a payload without an address
    pub fn validate(&self, token: &str) -> Result<SessionClaims, JwtError> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| {
                tracing::debug!("Session token rejected: {err}");
                JwtError::ValidationError
            })?
            .claims;

        if claims.address.trim().is_empty() {
            return Err(JwtError::ValidationError);
        }

        Ok(claims)
    }
}

/// Signs a session token the way the login flow does
///
/// # Errors
///
/// Returns `JwtError::EncodingError` if the claims cannot be encoded
#[cfg(any(test, feature = "test-utils"))]
pub fn issue_session_token(secret: &str, claims: &SessionClaims) -> Result<String, JwtError> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    Ok(encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

#[cfg(test)]
mod tests;
