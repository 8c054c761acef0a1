//! Wallet verify request storage module for `DynamoDB` operations
//!
//! One item per request. The wallet `address` and the submitter's
//! `world_address` are served by global secondary indexes on the same table.
//! A pending request reserves its short `code` through a `code#<code>` lock
//! item written in the same transaction as the request and deleted in the
//! same transaction as the attestation.

mod error;

use std::sync::Arc;

use aws_sdk_dynamodb::{
    error::SdkError,
    operation::transact_write_items::TransactWriteItemsError,
    types::{AttributeValue, CancellationReason, Delete, Put, TransactWriteItem, Update},
    Client as DynamoDbClient,
};
use chrono::Utc;
pub use error::{WalletVerifyRequestStorageError, WalletVerifyRequestStorageResult};
use serde::{Deserialize, Serialize};
use serde_dynamo::{from_item, to_item};
use strum::Display;

/// `DynamoDB` record for a wallet verification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletVerifyRequest {
    /// Primary key - request ID (UUID v4)
    pub id: String,
    /// Six digit code typed by the user in the mini-app
    pub code: String,
    /// Target EVM chain id
    pub chain: String,
    /// Wallet address being attested
    pub address: String,
    /// World App username the request was addressed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_username: Option<String>,
    /// World App wallet address; overwritten by the proof submitter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_address: Option<String>,
    /// Signal commitment, fixed at creation
    pub signal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullifier_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_sig: Option<String>,
    /// Set together with the proof and signature fields
    pub is_verified: bool,
    /// Creation timestamp (unix seconds)
    pub created_at: i64,
    /// Last update timestamp (unix seconds)
    pub updated_at: i64,
}

/// Proof and server signature fields of a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttestation<'a> {
    pub merkle_root: &'a str,
    pub nullifier_hash: &'a str,
    pub proof: &'a str,
    pub verification_level: &'a str,
    pub server_nonce: &'a str,
    pub server_deadline: &'a str,
    pub server_sig: &'a str,
}

impl WalletVerifyRequest {
    /// Returns the attestation if every proof and signature field is present
    #[must_use]
    pub fn attestation(&self) -> Option<StoredAttestation<'_>> {
        Some(StoredAttestation {
            merkle_root: self.merkle_root.as_deref()?,
            nullifier_hash: self.nullifier_hash.as_deref()?,
            proof: self.proof.as_deref()?,
            verification_level: self.verification_level.as_deref()?,
            server_nonce: self.server_nonce.as_deref()?,
            server_deadline: self.server_deadline.as_deref()?,
            server_sig: self.server_sig.as_deref()?,
        })
    }
}

/// Request to create a new pending wallet verify request
#[derive(Debug, Clone)]
pub struct WalletVerifyRequestCreate {
    pub code: String,
    pub chain: String,
    pub address: String,
    pub world_username: Option<String>,
    pub world_address: Option<String>,
    pub signal: String,
}

/// Proof plus server signature, written in a single update
#[derive(Debug, Clone)]
pub struct AttestationUpdate {
    pub world_address: String,
    pub merkle_root: String,
    pub nullifier_hash: String,
    pub proof: String,
    pub verification_level: String,
    pub server_nonce: String,
    pub server_deadline: String,
    pub server_sig: String,
}

/// `DynamoDB` attribute names for the wallet verify request table
#[derive(Debug, Clone, Copy, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WalletVerifyRequestAttribute {
    /// Primary key
    Id,
    /// Short code
    Code,
    /// Request holding a code lock
    RequestId,
    /// Wallet address (used for GSI)
    Address,
    WorldAddress,
    MerkleRoot,
    NullifierHash,
    Proof,
    VerificationLevel,
    ServerNonce,
    ServerDeadline,
    ServerSig,
    IsVerified,
    UpdatedAt,
}

/// Access to wallet verify request records
#[async_trait::async_trait]
pub trait WalletVerifyRequestStore: Send + Sync {
    /// Inserts a pending request with a generated id.
    ///
    /// Fails with `CodeTaken` if another pending request uses the same code.
    async fn create(
        &self,
        request: WalletVerifyRequestCreate,
    ) -> WalletVerifyRequestStorageResult<WalletVerifyRequest>;

    /// Gets a request by id
    async fn get_by_id(&self, id: &str) -> WalletVerifyRequestStorageResult<Option<WalletVerifyRequest>>;

    /// Gets the pending (`is_verified = false`) request holding `code`
    async fn get_pending_by_code(
        &self,
        code: &str,
    ) -> WalletVerifyRequestStorageResult<Option<WalletVerifyRequest>>;

    /// Lists every request made for a wallet address
    async fn get_by_address(
        &self,
        address: &str,
    ) -> WalletVerifyRequestStorageResult<Vec<WalletVerifyRequest>>;

    /// Lists every request linked to a World App address
    async fn get_by_world_address(
        &self,
        world_address: &str,
    ) -> WalletVerifyRequestStorageResult<Vec<WalletVerifyRequest>>;

    /// Atomically writes proof and signature fields and marks the request verified.
    ///
    /// Fails with `NotFound` if the id does not exist.
    async fn record_attestation(
        &self,
        id: &str,
        update: AttestationUpdate,
    ) -> WalletVerifyRequestStorageResult<WalletVerifyRequest>;
}

/// `DynamoDB` storage for wallet verify requests
pub struct WalletVerifyRequestStorage {
    dynamodb_client: Arc<DynamoDbClient>,
    table_name: String,
    address_index_name: String,
    world_address_index_name: String,
    query_page_size: Option<i32>,
}

impl WalletVerifyRequestStorage {
    /// Creates a new storage instance
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured `DynamoDB` client
    /// * `table_name` - `DynamoDB` table name for wallet verify requests and code locks
    /// * `address_index_name` - Name of the GSI keyed by `address`
    /// * `world_address_index_name` - Name of the GSI keyed by `world_address`
    #[must_use]
    pub const fn new(
        dynamodb_client: Arc<DynamoDbClient>,
        table_name: String,
        address_index_name: String,
        world_address_index_name: String,
    ) -> Self {
        Self {
            dynamodb_client,
            table_name,
            address_index_name,
            world_address_index_name,
            query_page_size: None,
        }
    }

    /// Caps the number of items read per index query page
    #[must_use]
    pub const fn with_query_page_size(mut self, limit: i32) -> Self {
        self.query_page_size = Some(limit);
        self
    }

    /// Reads every page of an index query
    async fn query_index(
        &self,
        index_name: &str,
        attribute: WalletVerifyRequestAttribute,
        value: &str,
    ) -> WalletVerifyRequestStorageResult<Vec<WalletVerifyRequest>> {
        let query = self
            .dynamodb_client
            .query()
            .table_name(&self.table_name)
            .index_name(index_name)
            .key_condition_expression("#key = :key")
            .expression_attribute_names("#key", attribute.to_string())
            .expression_attribute_values(":key", AttributeValue::S(value.to_string()))
            .set_limit(self.query_page_size);

        let mut records = Vec::new();
        let mut start_key = None;

        loop {
            let response = query
                .clone()
                .set_exclusive_start_key(start_key)
                .send()
                .await?;

            for item in response.items() {
                records.push(from_item(item.clone())?);
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }

    /// Reads the id of the request holding the lock on `code`
    async fn code_lock_holder(
        &self,
        code: &str,
    ) -> WalletVerifyRequestStorageResult<Option<String>> {
        let response = self
            .dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .key(
                WalletVerifyRequestAttribute::Id.to_string(),
                AttributeValue::S(code_lock_id(code)),
            )
            .consistent_read(true)
            .send()
            .await?;

        let Some(item) = response.item() else {
            return Ok(None);
        };

        let lock: CodeLock = from_item(item.clone())?;
        Ok(Some(lock.request_id))
    }

    /// Writes the request together with its code lock in one transaction.
    ///
    /// Without `stale_holder` the lock must not exist yet. With it, the lock
    /// is taken over only while it still names that holder.
    async fn put_with_code_lock(
        &self,
        record: &WalletVerifyRequest,
        stale_holder: Option<&str>,
    ) -> WalletVerifyRequestStorageResult<()> {
        let lock = CodeLock {
            id: code_lock_id(&record.code),
            request_id: record.id.clone(),
            created_at: record.created_at,
        };

        let lock_put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(to_item(&lock)?))
            .expression_attribute_names("#pk", WalletVerifyRequestAttribute::Id.to_string());

        let lock_put = match stale_holder {
            None => lock_put.condition_expression("attribute_not_exists(#pk)"),
            Some(holder) => lock_put
                .condition_expression("attribute_exists(#pk) AND #request_id = :holder")
                .expression_attribute_names(
                    "#request_id",
                    WalletVerifyRequestAttribute::RequestId.to_string(),
                )
                .expression_attribute_values(":holder", AttributeValue::S(holder.to_string())),
        }
        .build()
        .map_err(|e| {
            WalletVerifyRequestStorageError::SerializationError(format!(
                "Failed to build code lock put: {e:?}"
            ))
        })?;

        let request_put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(to_item(record)?))
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", WalletVerifyRequestAttribute::Id.to_string())
            .build()
            .map_err(|e| {
                WalletVerifyRequestStorageError::SerializationError(format!(
                    "Failed to build request put: {e:?}"
                ))
            })?;

        self.dynamodb_client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(lock_put).build())
            .transact_items(TransactWriteItem::builder().put(request_put).build())
            .send()
            .await
            .map_err(|err| {
                if condition_failed_at(&err, 0) {
                    WalletVerifyRequestStorageError::CodeTaken
                } else {
                    err.into()
                }
            })?;

        Ok(())
    }

    /// Builds the update that writes the attestation onto request `id`
    fn attestation_write(
        &self,
        id: &str,
        update: AttestationUpdate,
    ) -> WalletVerifyRequestStorageResult<TransactWriteItem> {
        use WalletVerifyRequestAttribute as A;

        let values = [
            (A::WorldAddress, AttributeValue::S(update.world_address)),
            (A::MerkleRoot, AttributeValue::S(update.merkle_root)),
            (A::NullifierHash, AttributeValue::S(update.nullifier_hash)),
            (A::Proof, AttributeValue::S(update.proof)),
            (A::VerificationLevel, AttributeValue::S(update.verification_level)),
            (A::ServerNonce, AttributeValue::S(update.server_nonce)),
            (A::ServerDeadline, AttributeValue::S(update.server_deadline)),
            (A::ServerSig, AttributeValue::S(update.server_sig)),
            (A::IsVerified, AttributeValue::Bool(true)),
            (A::UpdatedAt, AttributeValue::N(Utc::now().timestamp().to_string())),
        ];

        let update_expression = format!(
            "SET {}",
            values
                .iter()
                .map(|(attribute, _)| format!("#{attribute} = :{attribute}"))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut builder = Update::builder()
            .table_name(&self.table_name)
            .key(A::Id.to_string(), AttributeValue::S(id.to_string()))
            .update_expression(update_expression)
            .condition_expression("attribute_exists(#pk)")
            .expression_attribute_names("#pk", A::Id.to_string());

        for (attribute, value) in values {
            builder = builder
                .expression_attribute_names(format!("#{attribute}"), attribute.to_string())
                .expression_attribute_values(format!(":{attribute}"), value);
        }

        let update = builder.build().map_err(|e| {
            WalletVerifyRequestStorageError::SerializationError(format!(
                "Failed to build attestation update: {e:?}"
            ))
        })?;

        Ok(TransactWriteItem::builder().update(update).build())
    }

    /// Builds the delete that frees `code` if `request_id` still holds it
    fn code_lock_release(
        &self,
        code: &str,
        request_id: &str,
    ) -> WalletVerifyRequestStorageResult<TransactWriteItem> {
        let delete = Delete::builder()
            .table_name(&self.table_name)
            .key(
                WalletVerifyRequestAttribute::Id.to_string(),
                AttributeValue::S(code_lock_id(code)),
            )
            .condition_expression("attribute_not_exists(#pk) OR #request_id = :request_id")
            .expression_attribute_names("#pk", WalletVerifyRequestAttribute::Id.to_string())
            .expression_attribute_names(
                "#request_id",
                WalletVerifyRequestAttribute::RequestId.to_string(),
            )
            .expression_attribute_values(":request_id", AttributeValue::S(request_id.to_string()))
            .build()
            .map_err(|e| {
                WalletVerifyRequestStorageError::SerializationError(format!(
                    "Failed to build code lock delete: {e:?}"
                ))
            })?;

        Ok(TransactWriteItem::builder().delete(delete).build())
    }
}

#[async_trait::async_trait]
impl WalletVerifyRequestStore for WalletVerifyRequestStorage {
    async fn create(
        &self,
        request: WalletVerifyRequestCreate,
    ) -> WalletVerifyRequestStorageResult<WalletVerifyRequest> {
        let record = new_record(request);

        match self.put_with_code_lock(&record, None).await {
            Err(WalletVerifyRequestStorageError::CodeTaken) => {}
            result => return result.map(|()| record),
        }

        // A lock outlives its request only if the request was removed or verified
        // without releasing it
        let holder = self.code_lock_holder(&record.code).await?;
        if let Some(holder_id) = holder.as_deref() {
            if self
                .get_by_id(holder_id)
                .await?
                .is_some_and(|request| !request.is_verified)
            {
                return Err(WalletVerifyRequestStorageError::CodeTaken);
            }

            tracing::info!("Reclaiming code {} from request {holder_id}", record.code);
        }

        self.put_with_code_lock(&record, holder.as_deref()).await?;

        Ok(record)
    }

    async fn get_by_id(
        &self,
        id: &str,
    ) -> WalletVerifyRequestStorageResult<Option<WalletVerifyRequest>> {
        if id.starts_with(CODE_LOCK_PREFIX) {
            return Ok(None);
        }

        let response = self
            .dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .key(
                WalletVerifyRequestAttribute::Id.to_string(),
                AttributeValue::S(id.to_string()),
            )
            .consistent_read(true)
            .send()
            .await?;

        response
            .item()
            .map(|item| from_item(item.clone()).map_err(Into::into))
            .transpose()
    }

    async fn get_pending_by_code(
        &self,
        code: &str,
    ) -> WalletVerifyRequestStorageResult<Option<WalletVerifyRequest>> {
        let Some(request_id) = self.code_lock_holder(code).await? else {
            return Ok(None);
        };

        Ok(self
            .get_by_id(&request_id)
            .await?
            .filter(|request| !request.is_verified))
    }

    async fn get_by_address(
        &self,
        address: &str,
    ) -> WalletVerifyRequestStorageResult<Vec<WalletVerifyRequest>> {
        self.query_index(
            &self.address_index_name,
            WalletVerifyRequestAttribute::Address,
            address,
        )
        .await
    }

    async fn get_by_world_address(
        &self,
        world_address: &str,
    ) -> WalletVerifyRequestStorageResult<Vec<WalletVerifyRequest>> {
        self.query_index(
            &self.world_address_index_name,
            WalletVerifyRequestAttribute::WorldAddress,
            world_address,
        )
        .await
    }

    async fn record_attestation(
        &self,
        id: &str,
        update: AttestationUpdate,
    ) -> WalletVerifyRequestStorageResult<WalletVerifyRequest> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or(WalletVerifyRequestStorageError::NotFound)?;

        let write = self.attestation_write(id, update)?;
        let mut items = vec![write.clone()];
        if !current.is_verified {
            items.push(self.code_lock_release(&current.code, id)?);
        }

        let result = self
            .dynamodb_client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;

        match result {
            Ok(_) => {}
            Err(err) if condition_failed_at(&err, 0) => {
                return Err(WalletVerifyRequestStorageError::NotFound);
            }
            // The code was already released and taken by a newer request
            Err(err) if condition_failed_at(&err, 1) => {
                self.dynamodb_client
                    .transact_write_items()
                    .transact_items(write)
                    .send()
                    .await
                    .map_err(|err| {
                        if condition_failed_at(&err, 0) {
                            WalletVerifyRequestStorageError::NotFound
                        } else {
                            err.into()
                        }
                    })?;
            }
            Err(err) => return Err(err.into()),
        }

        self.get_by_id(id)
            .await?
            .ok_or(WalletVerifyRequestStorageError::NotFound)
    }
}

/// Prefix of the lock items that reserve a code among pending requests
pub const CODE_LOCK_PREFIX: &str = "code#";

/// Key of the lock item for `code`
#[must_use]
pub fn code_lock_id(code: &str) -> String {
    format!("{CODE_LOCK_PREFIX}{code}")
}

/// Lock item sharing the request table, keyed by `code#<code>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CodeLock {
    id: String,
    request_id: String,
    created_at: i64,
}

/// Whether the transaction was cancelled by a failed condition on item `index`
fn condition_failed_at(err: &SdkError<TransactWriteItemsError>, index: usize) -> bool {
    match err.as_service_error() {
        Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) => {
            cancelled
                .cancellation_reasons()
                .get(index)
                .and_then(CancellationReason::code)
                == Some("ConditionalCheckFailed")
        }
        _ => false,
    }
}

fn new_record(request: WalletVerifyRequestCreate) -> WalletVerifyRequest {
    let now = Utc::now().timestamp();

    WalletVerifyRequest {
        id: uuid::Uuid::new_v4().to_string(),
        code: request.code,
        chain: request.chain,
        address: request.address,
        world_username: request.world_username,
        world_address: request.world_address,
        signal: request.signal,
        merkle_root: None,
        nullifier_hash: None,
        proof: None,
        verification_level: None,
        server_nonce: None,
        server_deadline: None,
        server_sig: None,
        is_verified: false,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::HashMap;

    use chrono::Utc;
    use tokio::sync::RwLock;

    use super::{
        new_record, AttestationUpdate, WalletVerifyRequest, WalletVerifyRequestCreate,
        WalletVerifyRequestStorageError, WalletVerifyRequestStorageResult,
        WalletVerifyRequestStore,
    };

    /// In-memory store with the same contract as the `DynamoDB` table
    #[derive(Default)]
    pub struct InMemoryWalletVerifyRequestStore {
        requests: RwLock<HashMap<String, WalletVerifyRequest>>,
    }

    impl InMemoryWalletVerifyRequestStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of stored requests
        pub async fn len(&self) -> usize {
            self.requests.read().await.len()
        }
    }

    #[async_trait::async_trait]
    impl WalletVerifyRequestStore for InMemoryWalletVerifyRequestStore {
        async fn create(
            &self,
            request: WalletVerifyRequestCreate,
        ) -> WalletVerifyRequestStorageResult<WalletVerifyRequest> {
            let mut requests = self.requests.write().await;

            if requests
                .values()
                .any(|r| !r.is_verified && r.code == request.code)
            {
                return Err(WalletVerifyRequestStorageError::CodeTaken);
            }

            let record = new_record(request);
            requests.insert(record.id.clone(), record.clone());
            Ok(record)
        }

        async fn get_by_id(
            &self,
            id: &str,
        ) -> WalletVerifyRequestStorageResult<Option<WalletVerifyRequest>> {
            Ok(self.requests.read().await.get(id).cloned())
        }

        async fn get_pending_by_code(
            &self,
            code: &str,
        ) -> WalletVerifyRequestStorageResult<Option<WalletVerifyRequest>> {
            Ok(self
                .requests
                .read()
                .await
                .values()
                .find(|r| !r.is_verified && r.code == code)
                .cloned())
        }

        async fn get_by_address(
            &self,
            address: &str,
        ) -> WalletVerifyRequestStorageResult<Vec<WalletVerifyRequest>> {
            Ok(self
                .requests
                .read()
                .await
                .values()
                .filter(|r| r.address == address)
                .cloned()
                .collect())
        }

        async fn get_by_world_address(
            &self,
            world_address: &str,
        ) -> WalletVerifyRequestStorageResult<Vec<WalletVerifyRequest>> {
            Ok(self
                .requests
                .read()
                .await
                .values()
                .filter(|r| r.world_address.as_deref() == Some(world_address))
                .cloned()
                .collect())
        }

        async fn record_attestation(
            &self,
            id: &str,
            update: AttestationUpdate,
        ) -> WalletVerifyRequestStorageResult<WalletVerifyRequest> {
            let mut requests = self.requests.write().await;
            let record = requests
                .get_mut(id)
                .ok_or(WalletVerifyRequestStorageError::NotFound)?;

            record.world_address = Some(update.world_address);
            record.merkle_root = Some(update.merkle_root);
            record.nullifier_hash = Some(update.nullifier_hash);
            record.proof = Some(update.proof);
            record.verification_level = Some(update.verification_level);
            record.server_nonce = Some(update.server_nonce);
            record.server_deadline = Some(update.server_deadline);
            record.server_sig = Some(update.server_sig);
            record.is_verified = true;
            record.updated_at = Utc::now().timestamp();

            Ok(record.clone())
        }
    }
}
