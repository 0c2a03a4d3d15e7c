//! Event application over the Diesel-backed store.

use std::sync::Arc;

use crate::postgres::helpers::{
    CleanupGuard, concurrent_runtime, ensure_template, execute_sql, setup_store,
    setup_store_with_pool_size, test_runtime, unique_db_name,
};
use companion_tasks::task::{
    domain::{
        CompletionRequirements, ConsentDefinitionId, ConsentsMetadata, LinkId, PcpMetadata,
        QuestionTag, TaskEvent, TaskStatusEvent, TaskStatusName, TaskType, TaskVersion,
    },
    services::{ProvisionTask, TaskService, TaskServiceConfig},
};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;

fn answer(question_tag: QuestionTag, value: bool) -> TaskEvent {
    TaskEvent::SocialHistoryAnswered {
        question_tag,
        value,
    }
}

#[rstest]
fn later_answer_reopens_a_completed_task(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("svc_reopen");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let service = TaskService::new(Arc::new(store));
    let rt = test_runtime();
    let link_id = LinkId::new();
    rt.block_on(service.provision(link_id, ProvisionTask::empty(TaskType::PrimaryCareProvider)))
        .expect("provisioning should succeed");

    let declined = rt
        .block_on(service.apply_event(link_id, answer(QuestionTag::HasPcp, false)))
        .expect("first answer should apply");
    let changed = rt
        .block_on(service.apply_event(link_id, answer(QuestionTag::HasPcp, true)))
        .expect("second answer should apply");

    assert!(declined.should_complete);
    assert!(!changed.should_complete);
    let task = rt
        .block_on(service.get_typed::<PcpMetadata>(link_id))
        .expect("task should decode");
    assert_eq!(task.current_status(), TaskStatusName::Started);
    assert_eq!(task.header().version, TaskVersion::new(2));
    assert_eq!(
        task.metadata().social_history_responses.has_pcp,
        Some(true)
    );
    let names: Vec<TaskStatusName> = task
        .header()
        .statuses
        .events()
        .map(TaskStatusEvent::name)
        .collect();
    assert_eq!(
        names,
        vec![
            TaskStatusName::NotStarted,
            TaskStatusName::Completed,
            TaskStatusName::Started,
        ]
    );
}

#[rstest]
fn concurrent_signings_serialise_on_the_row_lock(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("svc_contended");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store =
        setup_store_with_pool_size(shared_test_cluster, &db_name, 4).expect("store setup");
    let service = TaskService::with_config(
        Arc::new(store),
        TaskServiceConfig::default().with_max_conflict_attempts(64),
    );
    let rt = concurrent_runtime();
    let link_id = LinkId::new();
    rt.block_on(service.provision(link_id, ProvisionTask::empty(TaskType::Consents)))
        .expect("provisioning should succeed");
    let signed: Vec<ConsentDefinitionId> = (1..=8).map(ConsentDefinitionId::new).collect();

    rt.block_on(async {
        let handles: Vec<_> = signed
            .iter()
            .copied()
            .map(|definition_id| {
                let worker = service.clone();
                tokio::spawn(async move {
                    worker
                        .apply_event_with(
                            link_id,
                            TaskEvent::ConsentSigned { definition_id },
                            &CompletionRequirements::default(),
                        )
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle
                .await
                .expect("signing task should not panic")
                .expect("signing should apply");
        }
    });

    let task = rt
        .block_on(service.get_typed::<ConsentsMetadata>(link_id))
        .expect("task should decode");
    for definition_id in &signed {
        assert!(task.metadata().contains(*definition_id), "consent {definition_id} lost");
    }
    assert_eq!(task.metadata().completed_definition_ids.len(), signed.len());
    assert_eq!(task.header().version, TaskVersion::new(8));
    let started = task
        .header()
        .statuses
        .events()
        .filter(|event| event.name() == TaskStatusName::Started)
        .count();
    assert_eq!(started, 1);
    assert_eq!(task.current_status(), TaskStatusName::Started);
}

#[rstest]
fn corrupt_status_rows_are_reported_as_data_integrity_errors(
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("svc_corrupt");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let service = TaskService::new(Arc::new(store));
    let rt = test_runtime();
    let link_id = LinkId::new();
    let provisioned = rt
        .block_on(service.provision(link_id, ProvisionTask::empty(TaskType::DefaultPharmacy)))
        .expect("provisioning should succeed");
    execute_sql(
        shared_test_cluster,
        &db_name,
        &format!(
            "INSERT INTO companion_task_statuses (companion_task_id, name) VALUES ({}, 'completed')",
            provisioned.header().id.value()
        ),
    )
    .expect("corruption should apply");

    let error = rt
        .block_on(service.apply_event(link_id, TaskEvent::PharmacySet))
        .expect_err("corrupt history should fail");

    assert!(error.is_data_integrity(), "unexpected error {error}");
}
