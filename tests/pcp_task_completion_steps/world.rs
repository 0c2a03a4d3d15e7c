//! Shared world state for PCP completion BDD scenarios.

use std::sync::Arc;

use companion_tasks::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{CompanionTask, LinkId},
    services::{AppliedResult, TaskService, TaskServiceError},
};
use rstest::fixture;

/// Service type used by the BDD world.
pub type TestTaskService = TaskService<InMemoryTaskStore>;

/// Scenario world for PCP completion behaviour tests.
pub struct PcpCompletionWorld {
    pub service: TestTaskService,
    pub link_id: LinkId,
    pub last_result: Option<Result<AppliedResult<CompanionTask>, TaskServiceError>>,
}

impl PcpCompletionWorld {
    /// Creates a world over an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: TaskService::new(Arc::new(InMemoryTaskStore::new())),
            link_id: LinkId::new(),
            last_result: None,
        }
    }
}

impl Default for PcpCompletionWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> PcpCompletionWorld {
    PcpCompletionWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
