//! End-to-end companion checklist flows through the task service.

use std::sync::Arc;

use super::helpers::{fixed_instant, provision_all, store};
use companion_tasks::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{
        CompanionTask, InsurancePriority, LinkId, TaskEvent, TaskLabel, TaskStatusName, TaskType,
        pending_task_text, status_note,
    },
    services::{TaskService, TaskServiceError},
};
use rstest::rstest;

fn statuses_by_type(tasks: &[CompanionTask]) -> Vec<(TaskType, TaskStatusName)> {
    tasks
        .iter()
        .map(|task| (task.task_type(), task.current_status()))
        .collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn checklist_progresses_until_only_consents_remain(
    store: Arc<InMemoryTaskStore>,
) -> Result<(), eyre::Report> {
    let service = TaskService::new(store);
    let link_id = provision_all(&service).await?;

    for event in [
        TaskEvent::IdentificationUploaded,
        TaskEvent::PharmacySet,
        TaskEvent::PcpSelected {
            clinical_provider_id: "42".to_owned(),
        },
        TaskEvent::InsuranceImageUploaded {
            priority: InsurancePriority::SECONDARY,
        },
    ] {
        service.apply_event(link_id, event).await?;
    }

    let midway = service.list_for_link(link_id).await?;
    eyre::ensure!(
        statuses_by_type(&midway)
            == vec![
                (TaskType::IdentificationImage, TaskStatusName::Completed),
                (TaskType::InsuranceCardImages, TaskStatusName::Started),
                (TaskType::DefaultPharmacy, TaskStatusName::Completed),
                (TaskType::PrimaryCareProvider, TaskStatusName::Completed),
                (
                    TaskType::ConsentMedicationHistoryAuthority,
                    TaskStatusName::NotStarted
                ),
                (TaskType::Consents, TaskStatusName::NotStarted),
            ],
        "unexpected midway statuses {:?}",
        statuses_by_type(&midway)
    );
    eyre::ensure!(
        pending_task_text(&midway, true) == "insurance card and consents",
        "unexpected pending text"
    );

    let primary = service
        .apply_event(
            link_id,
            TaskEvent::InsuranceImageUploaded {
                priority: InsurancePriority::PRIMARY,
            },
        )
        .await?;
    eyre::ensure!(primary.should_complete, "primary card should complete");

    let tasks = service.list_for_link(link_id).await?;
    eyre::ensure!(
        pending_task_text(&tasks, true) == "consents",
        "only consents should be pending"
    );
    eyre::ensure!(
        pending_task_text(&tasks, false) == "medications",
        "only medications should be pending"
    );

    let note = status_note(&tasks, &TaskType::ALL);
    eyre::ensure!(
        note.companion_tasks
            == vec![
                TaskLabel::Id,
                TaskLabel::Insurance,
                TaskLabel::Pharmacy,
                TaskLabel::Pcp
            ],
        "unexpected timeline labels {:?}",
        note.companion_tasks
    );
    eyre::ensure!(
        note.complete_companion_tasks == note.companion_tasks,
        "every labelled task should be complete"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn operator_reopen_is_kept_and_still_counts_for_the_note(
    store: Arc<InMemoryTaskStore>,
) -> Result<(), eyre::Report> {
    let service = TaskService::new(store);
    let link_id = provision_all(&service).await?;
    let applied = service
        .apply_event(link_id, TaskEvent::IdentificationUploaded)
        .await?;
    let task_id = applied.task.header().id;

    let reopened = service
        .update_status(task_id, TaskStatusName::Started)
        .await?;
    let repeated = service
        .apply_event(link_id, TaskEvent::IdentificationUploaded)
        .await?;

    eyre::ensure!(
        reopened.created_at() == fixed_instant(),
        "status events use the store clock"
    );
    eyre::ensure!(
        repeated.status_changed(),
        "a reopened task completes again on the next upload"
    );

    let tasks = service.list_for_link(link_id).await?;
    let note = status_note(&tasks, &[TaskType::IdentificationImage]);
    eyre::ensure!(
        note.complete_companion_tasks == vec![TaskLabel::Id],
        "completed-then-reopened tasks still count"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn events_for_unprovisioned_links_are_rejected(
    store: Arc<InMemoryTaskStore>,
) -> Result<(), eyre::Report> {
    let service = TaskService::new(store);
    let link_id = LinkId::new();

    let result = service.apply_event(link_id, TaskEvent::PharmacySet).await;

    eyre::ensure!(
        matches!(
            result,
            Err(TaskServiceError::TaskNotFound {
                task_type: TaskType::DefaultPharmacy,
                ..
            })
        ),
        "expected TaskNotFound, got {result:?}"
    );
    Ok(())
}
