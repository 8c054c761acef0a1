//! `DynamoDB` tests for the wallet verify request table.
//!
//! These talk to LocalStack on `localhost:4566`.

use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
    KeyType, Projection, ProjectionType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use backend_storage::wallet_verify_request::{
    code_lock_id, AttestationUpdate, WalletVerifyRequestAttribute, WalletVerifyRequestCreate,
    WalletVerifyRequestStorage, WalletVerifyRequestStorageError, WalletVerifyRequestStore,
};
use pretty_assertions::assert_eq;
use tokio::time::sleep;
use uuid::Uuid;

const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";
const TEST_REGION: &str = "us-east-1";
const TEST_ADDRESS_INDEX_NAME: &str = "address-index";
const TEST_WORLD_ADDRESS_INDEX_NAME: &str = "world-address-index";

/// Test context that deletes its table on drop
struct TestContext {
    storage: WalletVerifyRequestStorage,
    table_name: String,
    dynamodb_client: Arc<DynamoDbClient>,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let client = self.dynamodb_client.clone();
        let table = self.table_name.clone();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = client.delete_table().table_name(&table).send().await;
            });
        }
    }
}

fn key(attribute: WalletVerifyRequestAttribute) -> KeySchemaElement {
    KeySchemaElement::builder()
        .attribute_name(attribute.to_string())
        .key_type(KeyType::Hash)
        .build()
        .expect("Failed to build key schema")
}

fn string_attribute(attribute: WalletVerifyRequestAttribute) -> AttributeDefinition {
    AttributeDefinition::builder()
        .attribute_name(attribute.to_string())
        .attribute_type(ScalarAttributeType::S)
        .build()
        .expect("Failed to build attribute definition")
}

fn index(name: &str, attribute: WalletVerifyRequestAttribute) -> GlobalSecondaryIndex {
    GlobalSecondaryIndex::builder()
        .index_name(name)
        .key_schema(key(attribute))
        .projection(
            Projection::builder()
                .projection_type(ProjectionType::All)
                .build(),
        )
        .build()
        .expect("Failed to build GSI")
}

async fn setup_test() -> TestContext {
    let table_name = format!("test-wallet-verify-requests-{}", Uuid::new_v4());

    let credentials = Credentials::from_keys("test", "test", None);
    let config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(LOCALSTACK_ENDPOINT)
        .region(Region::new(TEST_REGION))
        .credentials_provider(credentials)
        .load()
        .await;

    let dynamodb_client = Arc::new(DynamoDbClient::new(&config));

    dynamodb_client
        .create_table()
        .table_name(&table_name)
        .billing_mode(BillingMode::PayPerRequest)
        .key_schema(key(WalletVerifyRequestAttribute::Id))
        .attribute_definitions(string_attribute(WalletVerifyRequestAttribute::Id))
        .attribute_definitions(string_attribute(WalletVerifyRequestAttribute::Address))
        .attribute_definitions(string_attribute(WalletVerifyRequestAttribute::WorldAddress))
        .global_secondary_indexes(index(
            TEST_ADDRESS_INDEX_NAME,
            WalletVerifyRequestAttribute::Address,
        ))
        .global_secondary_indexes(index(
            TEST_WORLD_ADDRESS_INDEX_NAME,
            WalletVerifyRequestAttribute::WorldAddress,
        ))
        .send()
        .await
        .expect("Failed to create test table");

    sleep(Duration::from_millis(100)).await;

    let storage = WalletVerifyRequestStorage::new(
        dynamodb_client.clone(),
        table_name.clone(),
        TEST_ADDRESS_INDEX_NAME.to_string(),
        TEST_WORLD_ADDRESS_INDEX_NAME.to_string(),
    );

    TestContext {
        storage,
        table_name,
        dynamodb_client,
    }
}

fn create_request(code: &str, address: &str) -> WalletVerifyRequestCreate {
    WalletVerifyRequestCreate {
        code: code.to_string(),
        chain: "480".to_string(),
        address: address.to_string(),
        world_username: Some("alice".to_string()),
        world_address: Some("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC".to_string()),
        signal: format!("0x{}", "ab".repeat(32)),
    }
}

fn attestation_update() -> AttestationUpdate {
    AttestationUpdate {
        world_address: "0x90F79bf6EB2c4f870365E785982E1f101E93b906".to_string(),
        merkle_root: format!("0x{}", "11".repeat(32)),
        nullifier_hash: format!("0x{}", "22".repeat(32)),
        proof: format!("0x{}", "33".repeat(256)),
        verification_level: "orb".to_string(),
        server_nonce: "42".to_string(),
        server_deadline: "1700010800".to_string(),
        server_sig: format!("0x{}", "44".repeat(65)),
    }
}

fn random_address() -> String {
    format!("0x{}", Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_create_and_get_by_id() {
    let ctx = setup_test().await;
    let request = create_request("123456", &random_address());

    let created = ctx
        .storage
        .create(request.clone())
        .await
        .expect("Failed to create request");

    assert!(!created.id.is_empty());
    assert!(!created.is_verified);

    let retrieved = ctx
        .storage
        .get_by_id(&created.id)
        .await
        .expect("Failed to get request")
        .expect("Request not found");

    assert_eq!(retrieved, created);
    assert_eq!(retrieved.world_username, request.world_username);
    assert!(retrieved.attestation().is_none());
}

#[tokio::test]
async fn test_get_by_id_non_existing() {
    let ctx = setup_test().await;

    let result = ctx
        .storage
        .get_by_id(&Uuid::new_v4().to_string())
        .await
        .expect("Failed to query non-existing request");

    assert!(result.is_none());
}

#[tokio::test]
async fn test_pending_code_is_unique() {
    let ctx = setup_test().await;

    ctx.storage
        .create(create_request("654321", &random_address()))
        .await
        .expect("Failed to create request");

    let result = ctx
        .storage
        .create(create_request("654321", &random_address()))
        .await;

    assert!(matches!(
        result,
        Err(WalletVerifyRequestStorageError::CodeTaken)
    ));
}

#[tokio::test]
async fn test_record_attestation_marks_request_verified() {
    let ctx = setup_test().await;
    let created = ctx
        .storage
        .create(create_request("777777", &random_address()))
        .await
        .expect("Failed to create request");

    assert!(ctx
        .storage
        .get_pending_by_code("777777")
        .await
        .expect("Failed to query by code")
        .is_some());

    let updated = ctx
        .storage
        .record_attestation(&created.id, attestation_update())
        .await
        .expect("Failed to record attestation");

    assert!(updated.is_verified);
    assert_eq!(
        updated.world_address.as_deref(),
        Some("0x90F79bf6EB2c4f870365E785982E1f101E93b906")
    );
    assert_eq!(updated.signal, created.signal);
    let attestation = updated.attestation().expect("Attestation fields missing");
    assert_eq!(attestation.server_nonce, "42");

    assert!(ctx
        .storage
        .get_pending_by_code("777777")
        .await
        .expect("Failed to query by code")
        .is_none());
}

#[tokio::test]
async fn test_record_attestation_unknown_id() {
    let ctx = setup_test().await;

    let result = ctx
        .storage
        .record_attestation(&Uuid::new_v4().to_string(), attestation_update())
        .await;

    assert!(matches!(
        result,
        Err(WalletVerifyRequestStorageError::NotFound)
    ));
}

#[tokio::test]
async fn test_get_by_address() {
    let ctx = setup_test().await;
    let address = random_address();

    for code in ["100001", "100002", "100003"] {
        ctx.storage
            .create(create_request(code, &address))
            .await
            .expect("Failed to create request");
    }

    sleep(Duration::from_millis(200)).await;

    let results = ctx
        .storage
        .get_by_address(&address)
        .await
        .expect("Failed to query by address");

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.address == address));
}

#[tokio::test]
async fn test_get_by_world_address_after_attestation() {
    let ctx = setup_test().await;
    let created = ctx
        .storage
        .create(create_request("200001", &random_address()))
        .await
        .expect("Failed to create request");

    ctx.storage
        .record_attestation(&created.id, attestation_update())
        .await
        .expect("Failed to record attestation");

    sleep(Duration::from_millis(200)).await;

    let results = ctx
        .storage
        .get_by_world_address("0x90F79bf6EB2c4f870365E785982E1f101E93b906")
        .await
        .expect("Failed to query by world address");

    assert!(results.iter().any(|r| r.id == created.id && r.is_verified));
}

#[tokio::test]
async fn test_concurrent_creates_reserve_code_once() {
    let ctx = setup_test().await;
    let first_address = random_address();
    let second_address = random_address();

    let (first, second) = tokio::join!(
        ctx.storage.create(create_request("300001", &first_address)),
        ctx.storage.create(create_request("300001", &second_address)),
    );

    let results = [first, second];
    let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(created.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(WalletVerifyRequestStorageError::CodeTaken))));

    let pending = ctx
        .storage
        .get_pending_by_code("300001")
        .await
        .expect("Failed to query by code")
        .expect("Code is not reserved");
    assert_eq!(pending.id, created[0].id);
}

#[tokio::test]
async fn test_code_is_free_again_after_attestation() {
    let ctx = setup_test().await;
    let first = ctx
        .storage
        .create(create_request("300002", &random_address()))
        .await
        .expect("Failed to create request");

    ctx.storage
        .record_attestation(&first.id, attestation_update())
        .await
        .expect("Failed to record attestation");

    let second = ctx
        .storage
        .create(create_request("300002", &random_address()))
        .await
        .expect("Code was not released");

    let pending = ctx
        .storage
        .get_pending_by_code("300002")
        .await
        .expect("Failed to query by code")
        .expect("Code is not reserved");
    assert_eq!(pending.id, second.id);

    // Re-verifying the first request keeps the new holder's lock
    ctx.storage
        .record_attestation(&first.id, attestation_update())
        .await
        .expect("Failed to record second attestation");

    let pending = ctx
        .storage
        .get_pending_by_code("300002")
        .await
        .expect("Failed to query by code")
        .expect("Lock of the newer request was dropped");
    assert_eq!(pending.id, second.id);
}

#[tokio::test]
async fn test_stale_code_lock_is_reclaimed() {
    let ctx = setup_test().await;
    let first = ctx
        .storage
        .create(create_request("300003", &random_address()))
        .await
        .expect("Failed to create request");

    // The request disappears while its lock stays behind
    ctx.dynamodb_client
        .delete_item()
        .table_name(&ctx.table_name)
        .key(
            WalletVerifyRequestAttribute::Id.to_string(),
            AttributeValue::S(first.id.clone()),
        )
        .send()
        .await
        .expect("Failed to delete request");

    assert!(ctx
        .storage
        .get_pending_by_code("300003")
        .await
        .expect("Failed to query by code")
        .is_none());

    let second = ctx
        .storage
        .create(create_request("300003", &random_address()))
        .await
        .expect("Stale lock was not reclaimed");

    let pending = ctx
        .storage
        .get_pending_by_code("300003")
        .await
        .expect("Failed to query by code")
        .expect("Code is not reserved");
    assert_eq!(pending.id, second.id);
}

#[tokio::test]
async fn test_code_lock_is_not_a_request() {
    let ctx = setup_test().await;
    ctx.storage
        .create(create_request("300004", &random_address()))
        .await
        .expect("Failed to create request");

    let result = ctx
        .storage
        .get_by_id(&code_lock_id("300004"))
        .await
        .expect("Failed to get lock id");

    assert!(result.is_none());
}

#[tokio::test]
async fn test_get_by_address_reads_every_page() {
    let ctx = setup_test().await;
    let storage = WalletVerifyRequestStorage::new(
        ctx.dynamodb_client.clone(),
        ctx.table_name.clone(),
        TEST_ADDRESS_INDEX_NAME.to_string(),
        TEST_WORLD_ADDRESS_INDEX_NAME.to_string(),
    )
    .with_query_page_size(1);
    let address = random_address();

    for code in ["400001", "400002", "400003"] {
        storage
            .create(create_request(code, &address))
            .await
            .expect("Failed to create request");
    }

    sleep(Duration::from_millis(200)).await;

    let mut codes: Vec<_> = storage
        .get_by_address(&address)
        .await
        .expect("Failed to query by address")
        .into_iter()
        .map(|r| r.code)
        .collect();
    codes.sort();

    assert_eq!(codes, vec!["400001", "400002", "400003"]);
}
