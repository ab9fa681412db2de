//! Shared license ingestion domain primitives.
//!
//! This crate owns the license record contract, CSV ingestion, data-event
//! records, and DynamoDB key composition. It intentionally excludes AWS SDK
//! and Lambda runtime concerns.
//! See `crates/cc_ingest_lambda` for the runtime integration.

pub mod contract;
pub mod csv_ingest;
pub mod error;
pub mod events;
pub mod storage_keys;
