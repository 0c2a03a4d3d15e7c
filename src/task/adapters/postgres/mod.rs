//! `PostgreSQL` adapters for companion task persistence.

mod models;
mod schema;
mod store;

pub use store::{PostgresTaskStore, TaskPgPool};
