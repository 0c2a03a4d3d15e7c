//! In-memory adapters for companion task persistence.

mod store;

pub use store::InMemoryTaskStore;
