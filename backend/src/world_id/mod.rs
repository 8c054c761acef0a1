//! World ID collaborators.
//!
//! The developer portal checks that a proof was produced for our app, action
//! and signal before the server signs an attestation for it. The username
//! service maps a World App username to the user's wallet address.
//!
//! # Components
//! - `error`: failures of either upstream
//! - `verifier`: proof verification against the developer portal
//! - `username`: World App username lookup
//! - `request`: shared traced HTTP client (internal)

pub mod error;
pub mod username;
pub mod verifier;

/// HTTP client construction shared by both upstreams.
mod request;

pub use username::{UsernameResolver, WorldUser, WorldUsernameClient};
pub use verifier::{
    DeveloperPortalVerifier, ProofVerificationRequest, ProofVerifier, SkipVerification,
};
