//! HumanPass backend service

#![deny(clippy::all, clippy::pedantic, clippy::nursery, dead_code)]

/// Mini-app session tokens
pub mod jwt;

/// Request extractors for authentication
pub mod middleware;

/// Attestation polling for the dApp
pub mod polling;

/// Wallet verify request lifecycle
pub mod registry;

/// HTTP routes
pub mod routes;

/// Server wiring
pub mod server;

/// Configuration, errors and extractors
pub mod types;

/// World ID developer portal and username service
pub mod world_id;
