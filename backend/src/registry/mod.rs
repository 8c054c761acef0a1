//! Wallet verify request registry.
//!
//! Owns the lifecycle of a request: creation with a short code, lookup by code
//! or id, and proof submission. A submission is verified upstream and signed
//! before anything is written, then proof and signature land in one atomic
//! update, so a request is either pending or fully signed.

mod error;

use std::sync::{Arc, LazyLock};

use attestation_signer::{
    fresh_nonce, hash_str_to_field, keccak256_hex, AttestationSigner, ProofBinding,
    ProofCommitments, SignRequest,
};
use backend_storage::wallet_verify_request::{
    AttestationUpdate, WalletVerifyRequest, WalletVerifyRequestCreate,
    WalletVerifyRequestStorageError, WalletVerifyRequestStore,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;

pub use error::RegistryError;

use crate::world_id::{
    error::WorldIdError, ProofVerificationRequest, ProofVerifier, UsernameResolver,
};

/// World ID action every wallet ownership proof is generated for
pub const VERIFY_OWNERSHIP_ACTION: &str = "verify-ownership";

/// Attempts at finding a code no pending request uses
const MAX_CODE_ATTEMPTS: usize = 5;

/// `0x` followed by 20 hex bytes
pub static EVM_ADDRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Invalid regex"));

/// Decimal EIP-155 chain id
pub static CHAIN_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]{0,19}$").expect("Invalid regex"));

/// Input of `create_request`
#[derive(Debug, Clone, Default)]
pub struct NewRequest {
    pub chain_id: String,
    pub address: String,
    /// World App username, with or without the leading `@`
    pub world_username: Option<String>,
    /// World App address, when the caller already knows it
    pub world_address: Option<String>,
}

/// Identifiers handed back to the dApp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRequest {
    pub request_id: String,
    pub code: String,
}

/// Proof fields submitted by the mini-app
#[derive(Debug, Clone)]
pub struct ProofSubmission {
    pub merkle_root: String,
    pub nullifier_hash: String,
    pub proof: String,
    pub verification_level: String,
}

/// One verified wallet of a World App user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedWallet {
    /// First signed request for the wallet
    pub request_id: String,
    /// Redacted wallet address
    pub address: String,
    /// Every chain the wallet was attested for
    pub chains: Vec<String>,
}

/// Registry over the request store, the signer and the World ID collaborators
pub struct RequestRegistry {
    store: Arc<dyn WalletVerifyRequestStore>,
    signer: Arc<AttestationSigner>,
    verifier: Arc<dyn ProofVerifier>,
    usernames: Arc<dyn UsernameResolver>,
}

impl RequestRegistry {
    #[must_use]
    pub fn new(
        store: Arc<dyn WalletVerifyRequestStore>,
        signer: Arc<AttestationSigner>,
        verifier: Arc<dyn ProofVerifier>,
        usernames: Arc<dyn UsernameResolver>,
    ) -> Self {
        Self {
            store,
            signer,
            verifier,
            usernames,
        }
    }

    /// Creates a pending request and allocates its code.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a malformed chain id or address
    /// - `UsernameNotFound` if the World App username does not resolve
    /// - `CodeSpaceExhausted` if no free code was found
    pub async fn create_request(
        &self,
        request: NewRequest,
    ) -> Result<CreatedRequest, RegistryError> {
        validate_chain_id(&request.chain_id)?;
        validate_address(&request.address)?;

        let world_username = request
            .world_username
            .as_deref()
            .map(|name| name.trim().trim_start_matches('@'))
            .filter(|name| !name.is_empty())
            .map(ToString::to_string);

        let world_address = match (request.world_address, &world_username) {
            (Some(address), _) => Some(address),
            (None, Some(username)) => Some(
                self.usernames
                    .resolve(username)
                    .await
                    .map_err(|err| match err {
                        WorldIdError::UsernameNotFound(name) => {
                            RegistryError::UsernameNotFound(name)
                        }
                        other => other.into(),
                    })?
                    .address,
            ),
            (None, None) => None,
        };

        let signal = compute_signal(world_address.as_deref(), &request.address);

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let create = WalletVerifyRequestCreate {
                code: generate_code(),
                chain: request.chain_id.clone(),
                address: request.address.clone(),
                world_username: world_username.clone(),
                world_address: world_address.clone(),
                signal: signal.clone(),
            };

            match self.store.create(create).await {
                Ok(record) => {
                    tracing::info!(
                        request_id = %record.id,
                        chain = %record.chain,
                        "Created wallet verify request"
                    );
                    return Ok(CreatedRequest {
                        request_id: record.id,
                        code: record.code,
                    });
                }
                Err(WalletVerifyRequestStorageError::CodeTaken) => {
                    tracing::debug!("Verification code collision, attempt {attempt}");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::CodeSpaceExhausted)
    }

    /// Pending request holding `code`.
    ///
    /// # Errors
    ///
    /// `NotFound` once the request is verified or if no request uses the code
    pub async fn get_by_code(&self, code: &str) -> Result<WalletVerifyRequest, RegistryError> {
        self.store
            .get_pending_by_code(code)
            .await?
            .ok_or(RegistryError::NotFound)
    }

    /// Request by id, in any state.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids
    pub async fn get_by_id(&self, id: &str) -> Result<WalletVerifyRequest, RegistryError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(RegistryError::NotFound)
    }

    /// Request by id, only while no proof was submitted.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or already verified ids
    pub async fn get_pending_by_id(&self, id: &str) -> Result<WalletVerifyRequest, RegistryError> {
        self.get_by_id(id)
            .await
            .and_then(|request| {
                if request.is_verified {
                    Err(RegistryError::NotFound)
                } else {
                    Ok(request)
                }
            })
    }

    /// Verifies a proof, signs the attestation and stores both in one write.
    ///
    /// Re-submission overwrites the previous proof and signature.
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown ids
    /// - `InvalidInput` for malformed proof fields or verification level
    /// - `ProofRejected` if the developer portal rejects the proof
    /// - `Attestation` if signing fails; nothing is written
    pub async fn submit_proof(
        &self,
        id: &str,
        submission: ProofSubmission,
        submitter_world_address: &str,
    ) -> Result<WalletVerifyRequest, RegistryError> {
        let request = self.get_by_id(id).await?;

        let binding = ProofBinding {
            account: &request.address,
            nullifier_hash: &submission.nullifier_hash,
            merkle_root: &submission.merkle_root,
            proof: &submission.proof,
            verification_level: &submission.verification_level,
            action: VERIFY_OWNERSHIP_ACTION,
            signal_hash: &request.signal,
        };

        // Reject malformed fields before calling upstream
        ProofCommitments::bind(&binding)
            .map_err(|err| RegistryError::InvalidInput(err.to_string()))?;

        let signal_hash = hash_str_to_field(&request.signal)
            .map_err(|err| RegistryError::InvalidInput(err.to_string()))?
            .digest;

        self.verifier
            .verify(&ProofVerificationRequest {
                nullifier_hash: submission.nullifier_hash.clone(),
                merkle_root: submission.merkle_root.clone(),
                proof: submission.proof.clone(),
                verification_level: submission.verification_level.clone(),
                action: VERIFY_OWNERSHIP_ACTION.to_string(),
                signal_hash,
            })
            .await
            .map_err(|err| match err {
                WorldIdError::ProofRejected { detail, .. } => RegistryError::ProofRejected(detail),
                other => other.into(),
            })?;

        let now = Utc::now();
        let signed = self
            .signer
            .sign_at(
                &SignRequest {
                    binding,
                    chain_id: &request.chain,
                    nonce: fresh_nonce(now),
                },
                now,
            )
            .await?;

        let update = AttestationUpdate {
            world_address: submitter_world_address.to_string(),
            merkle_root: submission.merkle_root,
            nullifier_hash: submission.nullifier_hash,
            proof: submission.proof,
            verification_level: submission.verification_level,
            server_nonce: signed.typed.message.server_nonce.to_string(),
            server_deadline: signed.typed.message.server_deadline.to_string(),
            server_sig: signed.signature,
        };

        let stored = self
            .store
            .record_attestation(id, update)
            .await
            .map_err(|err| match err {
                WalletVerifyRequestStorageError::NotFound => RegistryError::NotFound,
                other => other.into(),
            })?;

        tracing::info!(request_id = %stored.id, "Wallet verify request signed");

        Ok(stored)
    }

    /// Most recent signing time of any request for `address`, if one was signed
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails
    pub async fn verified_at(
        &self,
        address: &str,
    ) -> Result<Option<DateTime<Utc>>, RegistryError> {
        let requests = self.store.get_by_address(address).await?;

        Ok(requests
            .iter()
            .filter(|request| request.attestation().is_some())
            .map(|request| request.updated_at)
            .max()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }

    /// Signed wallets of a World App user, grouped by wallet address
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails
    pub async fn list_verified(
        &self,
        world_address: &str,
    ) -> Result<Vec<VerifiedWallet>, RegistryError> {
        let mut requests: Vec<_> = self
            .store
            .get_by_world_address(world_address)
            .await?
            .into_iter()
            .filter(|request| request.attestation().is_some())
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut grouped: Vec<(String, VerifiedWallet)> = Vec::new();
        for request in requests {
            match grouped.iter_mut().find(|(address, _)| *address == request.address) {
                Some((_, wallet)) => {
                    if !wallet.chains.contains(&request.chain) {
                        wallet.chains.push(request.chain);
                    }
                }
                None => grouped.push((
                    request.address.clone(),
                    VerifiedWallet {
                        request_id: request.id,
                        address: redact_address(&request.address),
                        chains: vec![request.chain],
                    },
                )),
            }
        }

        Ok(grouped.into_iter().map(|(_, wallet)| wallet).collect())
    }
}

/// `keccak256(world_address ++ address)` as `0x` hex; an unknown world address is empty
#[must_use]
pub fn compute_signal(world_address: Option<&str>, address: &str) -> String {
    let preimage = format!("{}{address}", world_address.unwrap_or_default());
    keccak256_hex(preimage.as_bytes())
}

/// Random six digit code, leading zeros allowed
#[must_use]
pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// `0x12...cdef` style redaction used when listing wallets
#[must_use]
pub fn redact_address(address: &str) -> String {
    match (address.get(..4), address.len().checked_sub(4).and_then(|i| address.get(i..))) {
        (Some(head), Some(tail)) if address.len() > 8 => format!("{head}...{tail}"),
        _ => address.to_string(),
    }
}

fn validate_chain_id(chain_id: &str) -> Result<(), RegistryError> {
    if CHAIN_ID_REGEX.is_match(chain_id) {
        Ok(())
    } else {
        Err(RegistryError::InvalidInput(format!(
            "Invalid chain id: {chain_id:?}"
        )))
    }
}

fn validate_address(address: &str) -> Result<(), RegistryError> {
    if EVM_ADDRESS_REGEX.is_match(address) {
        Ok(())
    } else {
        Err(RegistryError::InvalidInput(format!(
            "Invalid address: {address:?}"
        )))
    }
}
