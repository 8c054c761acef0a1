//! Error types for wallet verify request storage operations

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::{
    get_item::GetItemError, query::QueryError, transact_write_items::TransactWriteItemsError,
};
use thiserror::Error;

/// Result type alias for storage operations
pub type WalletVerifyRequestStorageResult<T> = Result<T, WalletVerifyRequestStorageError>;

/// Storage error types for wallet verify request operations
#[derive(Debug, Error)]
pub enum WalletVerifyRequestStorageError {
    /// Failed to get request from `DynamoDB`
    #[error("Failed to get wallet verify request from DynamoDB: {0:?}")]
    DynamoDbGetError(#[from] SdkError<GetItemError>),

    /// Failed to query requests from `DynamoDB`
    #[error("Failed to query wallet verify requests from DynamoDB: {0:?}")]
    DynamoDbQueryError(#[from] SdkError<QueryError>),

    /// Failed to run a write transaction in `DynamoDB`
    #[error("Failed to write wallet verify request transaction to DynamoDB: {0:?}")]
    DynamoDbTransactionError(#[from] SdkError<TransactWriteItemsError>),

    /// A pending request already uses this code
    #[error("Verification code already in use")]
    CodeTaken,

    /// No request with this id
    #[error("Wallet verify request not found")]
    NotFound,

    /// Failed to convert between the record and a `DynamoDB` item
    #[error("Failed to parse wallet verify request: {0}")]
    SerializationError(String),
}

impl From<serde_dynamo::Error> for WalletVerifyRequestStorageError {
    fn from(err: serde_dynamo::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
