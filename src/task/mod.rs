//! Companion task tracking.
//!
//! A task row carries a type tag and untyped JSON metadata. The metadata
//! codec narrows rows into typed variants, completion rules fold feature
//! events into metadata, and the status history records derived and
//! explicit transitions. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
