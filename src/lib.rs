//! Companion tasks: checklist state for patient companion sessions.
//!
//! Each companion link owns one task per checklist item (identification,
//! insurance cards, pharmacy, primary care provider, consents). Task state is
//! derived from feature events arriving out of order across endpoints, and
//! every status transition is kept in an append-only history.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for persistence
//! - **Adapters**: In-memory and `PostgreSQL` implementations of the ports
//! - **Services**: Orchestration of reads and event application
//!
//! # Modules
//!
//! - [`task`]: Task model, metadata codec, completion rules and service
//! - [`telemetry`]: Tracing subscriber initialisation

pub mod task;
pub mod telemetry;
