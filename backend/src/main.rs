use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Context;
use attestation_signer::{AttestationSigner, KmsKeySigner, LocalKeySigner, TypedDataSigner};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_kms::Client as KmsClient;
use backend_storage::wallet_verify_request::WalletVerifyRequestStorage;

use backend::{
    jwt::SessionVerifier,
    registry::RequestRegistry,
    server,
    types::{Environment, ServerSignerConfig},
    world_id::{
        DeveloperPortalVerifier, ProofVerifier, SkipVerification, WorldUsernameClient,
    },
};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = Environment::from_env();

    // Configure logging format based on environment
    // Use JSON format for staging/production (Datadog), regular format for development
    match environment {
        Environment::Production | Environment::Staging => {
            fmt()
                .json()
                .with_env_filter(EnvFilter::from_default_env())
                .init();
        }
        Environment::Development { .. } => {
            fmt().with_env_filter(EnvFilter::from_default_env()).init();
        }
    }

    let aws_config = environment.aws_config().await;

    let dynamodb_client = Arc::new(DynamoDbClient::new(&aws_config));
    let store = Arc::new(WalletVerifyRequestStorage::new(
        dynamodb_client,
        environment.wallet_verify_request_table_name(),
        environment.wallet_verify_request_address_index_name(),
        environment.wallet_verify_request_world_address_index_name(),
    ));

    let key: Arc<dyn TypedDataSigner> = match environment.server_signer() {
        ServerSignerConfig::Kms(key_id) => Arc::new(
            KmsKeySigner::new(KmsClient::new(&aws_config), key_id)
                .await
                .context("Failed to load the KMS server key")?,
        ),
        ServerSignerConfig::PrivateKey(private_key) => Arc::new(
            LocalKeySigner::from_hex(&private_key).context("Invalid SERVER_SIGNER_PRIVATE_KEY")?,
        ),
    };

    let verifying_contract: Address = environment
        .verifier_contract_address()
        .parse()
        .context("Invalid VERIFIER_CONTRACT_ADDRESS")?;

    let signer = Arc::new(AttestationSigner::new(key, verifying_contract));
    tracing::info!(
        signer = %signer.signer_address(),
        contract = %verifying_contract,
        "Attestation signer ready"
    );

    let verifier: Arc<dyn ProofVerifier> = if environment.verify_proofs() {
        Arc::new(DeveloperPortalVerifier::new(
            &environment.developer_portal_url(),
            &environment.world_app_id(),
        )?)
    } else {
        tracing::warn!("⚠️ Proof verification is disabled");
        Arc::new(SkipVerification)
    };

    let usernames = Arc::new(WorldUsernameClient::new(&environment.username_api_url())?);

    let registry = Arc::new(RequestRegistry::new(store, signer, verifier, usernames));
    let session_verifier = Arc::new(SessionVerifier::new(&environment.jwt_secret()));

    server::start(environment, registry, session_verifier).await
}
