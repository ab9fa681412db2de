//! Runtime boundary over the pure domain crate.
//!
//! Handlers and binaries reach domain primitives through this module so the
//! crate has one place that names its domain dependency.

pub use cc_ingest_core::{contract, csv_ingest, error, events, storage_keys};
