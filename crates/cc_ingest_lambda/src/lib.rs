//! AWS-oriented adapters and handlers for license ingestion.
//!
//! This crate owns runtime integration details (Lambda handlers, storage
//! adapters) and exposes a single runtime module boundary for the license
//! contract, CSV ingestion, data-event, and storage key primitives.

pub mod adapters;
pub mod handlers;
pub mod runtime;
