use std::sync::Arc;

use alloy::primitives::Address;
use attestation_signer::{AttestationSigner, LocalKeySigner};
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request},
    response::Response,
    Extension, Router,
};
use backend::{
    jwt::{issue_session_token, SessionClaims, SessionVerifier},
    registry::RequestRegistry,
    routes,
    types::Environment,
    world_id::{username::mock::MockUsernameResolver, verifier::mock::MockProofVerifier},
};
use backend_storage::wallet_verify_request::mock::InMemoryWalletVerifyRequestStore;
use tower::ServiceExt;

/// Well-known development key (anvil account 0)
pub const SERVER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const SERVER_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const VERIFIER_CONTRACT: Address = Address::repeat_byte(0x42);
pub const JWT_SECRET: &str = "humanpass-test-secret";

pub const WALLET: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const WORLD_USERNAME: &str = "alice";
pub const WORLD_ADDRESS: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";

/// Setup test environment variables with all the required configuration
pub fn setup_test_env() {
    // Load test environment variables
    dotenvy::from_path(".env.example").ok();

    // Initialize tracing for tests
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

/// Router over in-memory storage and mocked World ID upstreams
pub struct TestSetup {
    pub router: Router,
    pub environment: Environment,
    pub store: Arc<InMemoryWalletVerifyRequestStore>,
    pub verifier: Arc<MockProofVerifier>,
    pub signer: Arc<AttestationSigner>,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_verifier(MockProofVerifier::accepting())
    }

    pub fn with_verifier(verifier: MockProofVerifier) -> Self {
        setup_test_env();

        let environment = Environment::Development {
            disable_auth: false,
            disable_proof_verification: false,
        };

        let store = Arc::new(InMemoryWalletVerifyRequestStore::new());
        let verifier = Arc::new(verifier);
        let key = LocalKeySigner::from_hex(SERVER_KEY).expect("Invalid test key");
        let signer = Arc::new(AttestationSigner::new(Arc::new(key), VERIFIER_CONTRACT));
        let usernames =
            Arc::new(MockUsernameResolver::default().with_user(WORLD_USERNAME, WORLD_ADDRESS));

        let registry = Arc::new(RequestRegistry::new(
            store.clone(),
            signer.clone(),
            verifier.clone(),
            usernames,
        ));

        let router = routes::handler()
            .layer(Extension(environment.clone()))
            .layer(Extension(registry))
            .layer(Extension(Arc::new(SessionVerifier::new(JWT_SECRET))))
            .into();

        Self {
            router,
            environment,
            store,
            verifier,
            signer,
        }
    }

    /// Session token for a World App user
    pub fn session_token(world_address: &str) -> String {
        issue_session_token(JWT_SECRET, &SessionClaims::for_address(world_address))
            .expect("Failed to issue session token")
    }

    pub async fn send_post_request(
        &self,
        route: &str,
        payload: serde_json::Value,
        token: Option<&str>,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let mut builder = Request::builder()
            .uri(route)
            .method("POST")
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(payload.to_string()))?;

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn send_get_request(
        &self,
        route: &str,
        token: Option<&str>,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let mut builder = Request::builder().uri(route).method("GET");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn parse_response_body(
        &self,
        response: Response,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        use http_body_util::BodyExt;

        let body = response.into_body().collect().await?.to_bytes();
        let json = serde_json::from_slice(&body)?;
        Ok(json)
    }

    /// Creates a request for `WALLET` on `chain_id` and returns `(request_id, code)`
    pub async fn create_request(&self, chain_id: &str) -> (String, String) {
        let response = self
            .send_post_request(
                "/miniapp/verify/wallet/request",
                serde_json::json!({ "address": WALLET, "chainId": chain_id }),
                None,
            )
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), http::StatusCode::OK);

        let body = self
            .parse_response_body(response)
            .await
            .expect("Failed to parse response");
        (
            body["requestId"].as_str().unwrap().to_string(),
            body["code"].as_str().unwrap().to_string(),
        )
    }
}

/// Proof fields as the mini-app submits them
pub fn proof_submission(request_id: &str, verification_level: &str) -> serde_json::Value {
    serde_json::json!({
        "id": request_id,
        "merkle_root": "0x2a7c09e8af01f39a87d89e9f0a9ba66fbf6fb304cc643051dd4ea24c4e9f7e8d",
        "nullifier_hash": "0x1359a81e3a42dc1c34786cbefbcc672a3d730510dba7a3be9941b207b0cf52fa",
        "proof": format!("0x{}", "1".repeat(512)),
        "verification_level": verification_level,
    })
}
