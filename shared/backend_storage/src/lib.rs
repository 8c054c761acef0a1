//! Backend storage services for HumanPass
//!
//! This crate owns the `DynamoDB` access for wallet verification requests.
//! Callers go through the [`wallet_verify_request::WalletVerifyRequestStore`]
//! trait so the registry can run against an in-memory store in tests.

pub mod wallet_verify_request;
