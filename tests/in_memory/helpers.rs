//! Shared helpers for companion task integration tests.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use companion_tasks::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{LinkId, TaskType},
    services::{ProvisionTask, TaskService, TaskServiceConfig},
};
use mockable::Clock;
use rstest::fixture;

/// Service type used across the integration tests.
pub type TestService = TaskService<InMemoryTaskStore>;

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Returns a fixed instant for timestamp assertions.
#[must_use]
pub fn fixed_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Provides a fresh store stamped by [`FixedClock`].
#[fixture]
pub fn store() -> Arc<InMemoryTaskStore> {
    companion_tasks::telemetry::init("companion_tasks=debug");
    Arc::new(InMemoryTaskStore::with_clock(Arc::new(FixedClock(
        fixed_instant(),
    ))))
}

/// Builds a service over `store` with a generous conflict budget.
#[must_use]
pub fn contended_service(store: &Arc<InMemoryTaskStore>, attempts: u32) -> TestService {
    TaskService::with_config(
        Arc::clone(store),
        TaskServiceConfig::default().with_max_conflict_attempts(attempts),
    )
}

/// Provisions every task type for a fresh link.
///
/// # Errors
///
/// Returns an error if any task cannot be provisioned.
pub async fn provision_all(service: &TestService) -> Result<LinkId, eyre::Report> {
    let link_id = LinkId::new();
    for task_type in TaskType::ALL {
        service
            .provision(link_id, ProvisionTask::empty(task_type))
            .await?;
    }
    Ok(link_id)
}
