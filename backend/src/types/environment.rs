//! Environment configuration for different deployment stages

use std::env;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};

/// Default World ID developer portal
const DEFAULT_DEVELOPER_PORTAL_URL: &str = "https://developer.worldcoin.org";

/// Default World App username service
const DEFAULT_USERNAME_API_URL: &str = "https://usernames.worldcoin.org";

/// Where the attestation server key lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSignerConfig {
    /// AWS KMS `ECC_SECG_P256K1` key id or ARN
    Kms(String),
    /// Hex-encoded secp256k1 private key
    PrivateKey(String),
}

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development {
        /// Use the bearer token as the world address instead of validating it
        disable_auth: bool,
        /// Trust submitted proofs without asking the developer portal
        disable_proof_verification: bool,
    },
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development {
                disable_auth: env_flag("DISABLE_AUTH"),
                disable_proof_verification: env_flag("DISABLE_PROOF_VERIFICATION"),
            },
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// `DynamoDB` table holding wallet verify requests
    ///
    /// # Panics
    ///
    /// Panics if `DYNAMODB_WALLET_VERIFY_REQUEST_TABLE_NAME` is not set outside development
    #[must_use]
    pub fn wallet_verify_request_table_name(&self) -> String {
        self.required_or_default(
            "DYNAMODB_WALLET_VERIFY_REQUEST_TABLE_NAME",
            "humanpass-wallet-verify-requests",
        )
    }

    /// GSI keyed by the wallet address
    #[must_use]
    pub fn wallet_verify_request_address_index_name(&self) -> String {
        self.required_or_default(
            "DYNAMODB_WALLET_VERIFY_REQUEST_ADDRESS_INDEX_NAME",
            "address-index",
        )
    }

    /// GSI keyed by the submitter's World App address
    #[must_use]
    pub fn wallet_verify_request_world_address_index_name(&self) -> String {
        self.required_or_default(
            "DYNAMODB_WALLET_VERIFY_REQUEST_WORLD_ADDRESS_INDEX_NAME",
            "world-address-index",
        )
    }

    /// Server signing key configuration. KMS wins when both are set.
    ///
    /// # Panics
    ///
    /// Panics if neither `SERVER_SIGNER_KMS_KEY_ID` nor `SERVER_SIGNER_PRIVATE_KEY` is set,
    /// or if a raw private key is configured in production
    #[must_use]
    pub fn server_signer(&self) -> ServerSignerConfig {
        if let Ok(key_id) = env::var("SERVER_SIGNER_KMS_KEY_ID") {
            return ServerSignerConfig::Kms(key_id);
        }

        let private_key = env::var("SERVER_SIGNER_PRIVATE_KEY").expect(
            "SERVER_SIGNER_KMS_KEY_ID or SERVER_SIGNER_PRIVATE_KEY environment variable is not set",
        );

        assert!(
            !matches!(self, Self::Production),
            "SERVER_SIGNER_PRIVATE_KEY is not allowed in production"
        );

        ServerSignerConfig::PrivateKey(private_key)
    }

    /// Address of the on-chain `HumanPassVerifier`, the EIP-712 verifying contract
    ///
    /// # Panics
    ///
    /// Panics if `VERIFIER_CONTRACT_ADDRESS` is not set
    #[must_use]
    pub fn verifier_contract_address(&self) -> String {
        env::var("VERIFIER_CONTRACT_ADDRESS")
            .expect("VERIFIER_CONTRACT_ADDRESS environment variable is not set")
    }

    /// World ID app id
    ///
    /// # Panics
    ///
    /// Panics if `WORLD_APP_ID` is not set outside development
    #[must_use]
    pub fn world_app_id(&self) -> String {
        self.required_or_default("WORLD_APP_ID", "app_staging_humanpass")
    }

    /// Base URL of the World ID developer portal
    #[must_use]
    pub fn developer_portal_url(&self) -> String {
        env::var("WORLD_DEVELOPER_PORTAL_URL")
            .unwrap_or_else(|_| DEFAULT_DEVELOPER_PORTAL_URL.to_string())
    }

    /// Base URL of the World App username service
    #[must_use]
    pub fn username_api_url(&self) -> String {
        env::var("WORLD_USERNAME_API_URL")
            .unwrap_or_else(|_| DEFAULT_USERNAME_API_URL.to_string())
    }

    /// HS256 secret for mini-app session tokens
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set outside development
    #[must_use]
    pub fn jwt_secret(&self) -> String {
        self.required_or_default("JWT_SECRET", "humanpass-development-secret")
    }

    /// Whether submitted proofs are checked with the developer portal
    #[must_use]
    pub const fn verify_proofs(&self) -> bool {
        !matches!(
            self,
            Self::Development {
                disable_proof_verification: true,
                ..
            }
        )
    }

    /// Whether session token validation is skipped
    #[must_use]
    pub const fn disable_auth(&self) -> bool {
        matches!(
            self,
            Self::Development {
                disable_auth: true,
                ..
            }
        )
    }

    /// Whether to show API docs
    #[must_use]
    pub const fn show_api_docs(&self) -> bool {
        matches!(self, Self::Development { .. } | Self::Staging)
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub const fn override_aws_endpoint_url(&self) -> Option<&str> {
        match self {
            Self::Production | Self::Staging => None,
            Self::Development { .. } => Some("http://localhost:4566"),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    fn required_or_default(&self, name: &str, development_default: &str) -> String {
        match self {
            Self::Production | Self::Staging => {
                env::var(name).unwrap_or_else(|_| panic!("{name} environment variable is not set"))
            }
            Self::Development { .. } => {
                env::var(name).unwrap_or_else(|_| development_default.to_string())
            }
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|val| val.trim().eq_ignore_ascii_case("true"))
}
