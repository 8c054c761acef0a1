use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use super::error::WorldIdError;

/// Default timeout for upstream requests
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of idle connections to maintain per host
const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 10;

/// Builds a pooled HTTP client that propagates the current trace
///
/// # Errors
///
/// Returns `WorldIdError::HttpError` if the TLS backend cannot be initialised
pub fn http_client() -> Result<ClientWithMiddleware, WorldIdError> {
    let reqwest_client = Client::builder()
        .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
        .user_agent(format!("humanpass-backend/{}", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(ClientBuilder::new(reqwest_client)
        .with(TracingMiddleware::default())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_initialization() {
        assert!(http_client().is_ok());
    }
}
