//! Port contracts for companion task persistence.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod store;

pub use store::{
    MetadataWrite, RecordedOutcome, TaskStore, TaskStoreError, TaskStoreResult,
};
