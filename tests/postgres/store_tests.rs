//! Store contract tests for the Diesel-backed companion task store.

use crate::postgres::helpers::{
    CleanupGuard, ensure_template, execute_sql, new_task, setup_store, test_runtime,
    unique_db_name,
};
use companion_tasks::task::{
    domain::{LinkId, NewTask, TaskId, TaskStatusEvent, TaskStatusName, TaskType, TaskVersion},
    ports::{MetadataWrite, TaskStore, TaskStoreError},
};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;
use serde_json::json;
use tokio::runtime::Runtime;

fn history(rt: &Runtime, store: &impl TaskStore, task_id: TaskId) -> Vec<TaskStatusName> {
    rt.block_on(store.find_by_id(task_id))
        .expect("lookup should succeed")
        .expect("task should exist")
        .statuses()
        .events()
        .map(TaskStatusEvent::name)
        .collect()
}

#[rstest]
fn create_seeds_history_and_reads_back(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("create");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let link_id = LinkId::new();
    let metadata = json!({ "insuranceStatuses": { "1": "STARTED" } });

    let created = rt
        .block_on(store.create(NewTask {
            metadata: Some(metadata.clone()),
            ..new_task(link_id, TaskType::InsuranceCardImages)
        }))
        .expect("create should succeed");

    assert_eq!(created.version(), TaskVersion::INITIAL);
    assert_eq!(created.current_status(), TaskStatusName::NotStarted);
    assert_eq!(created.statuses().len(), 1);
    let by_id = rt
        .block_on(store.find_by_id(created.id()))
        .expect("find_by_id should succeed")
        .expect("task should exist");
    let by_link = rt
        .block_on(store.find_by_link_and_type(link_id, TaskType::InsuranceCardImages))
        .expect("find_by_link_and_type should succeed")
        .expect("task should exist");
    assert_eq!(by_id, created);
    assert_eq!(by_link, created);
    assert_eq!(by_id.metadata(), Some(&metadata));
}

#[rstest]
fn duplicate_link_and_type_is_rejected(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("duplicate");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let link_id = LinkId::new();

    let original = rt
        .block_on(store.create(new_task(link_id, TaskType::Consents)))
        .expect("first create should succeed");
    rt.block_on(store.create(new_task(LinkId::new(), TaskType::Consents)))
        .expect("another link may own the same type");
    rt.block_on(store.create(new_task(link_id, TaskType::DefaultPharmacy)))
        .expect("the link may own another type");
    let duplicate = rt.block_on(store.create(new_task(link_id, TaskType::Consents)));

    assert!(matches!(
        duplicate,
        Err(TaskStoreError::DuplicateTask {
            link_id: rejected,
            task_type: TaskType::Consents,
        }) if rejected == link_id
    ));
    let tasks = rt
        .block_on(store.find_many_for_link(link_id))
        .expect("listing should succeed");
    let types: Vec<TaskType> = tasks.iter().map(|task| task.task_type()).collect();
    assert_eq!(types, vec![TaskType::Consents, TaskType::DefaultPharmacy]);
    assert_eq!(tasks.first(), Some(&original));
}

#[rstest]
fn stale_metadata_write_conflicts(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("stale_update");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let task_id = rt
        .block_on(store.create(new_task(LinkId::new(), TaskType::Consents)))
        .expect("create should succeed")
        .id();
    let first_write = Some(json!({ "completedDefinitionIds": [1] }));

    let version = rt
        .block_on(store.update_metadata(task_id, TaskVersion::INITIAL, first_write.clone()))
        .expect("first write should succeed");
    let stale = rt.block_on(store.update_metadata(
        task_id,
        TaskVersion::INITIAL,
        Some(json!({ "completedDefinitionIds": [2] })),
    ));
    let missing = rt.block_on(store.update_metadata(TaskId::new(9_999), TaskVersion::INITIAL, None));

    assert_eq!(version, TaskVersion::new(1));
    assert!(matches!(
        stale,
        Err(TaskStoreError::Conflict { expected, actual, .. })
            if expected == TaskVersion::INITIAL && actual == TaskVersion::new(1)
    ));
    assert!(matches!(missing, Err(TaskStoreError::NotFound(id)) if id == TaskId::new(9_999)));
    let stored = rt
        .block_on(store.find_by_id(task_id))
        .expect("lookup should succeed")
        .expect("task should exist");
    assert_eq!(stored.metadata(), first_write.as_ref());
    assert_eq!(stored.version(), TaskVersion::new(1));
}

#[rstest]
fn recorded_outcome_moves_status_both_ways(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("outcome");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let task_id = rt
        .block_on(store.create(new_task(LinkId::new(), TaskType::PrimaryCareProvider)))
        .expect("create should succeed")
        .id();
    let answered = Some(json!({ "socialHistoryResponses": { "HAS_PCP": true } }));

    let started = rt
        .block_on(store.record_outcome(
            task_id,
            TaskVersion::INITIAL,
            MetadataWrite::Replace(answered.clone()),
            TaskStatusName::Started,
        ))
        .expect("first outcome should succeed");
    let restated = rt
        .block_on(store.record_outcome(
            task_id,
            started.version,
            MetadataWrite::Keep,
            TaskStatusName::Started,
        ))
        .expect("restated outcome should succeed");
    let completed = rt
        .block_on(store.record_outcome(
            task_id,
            started.version,
            MetadataWrite::Keep,
            TaskStatusName::Completed,
        ))
        .expect("completing outcome should succeed");
    let reopened = rt
        .block_on(store.record_outcome(
            task_id,
            started.version,
            MetadataWrite::Keep,
            TaskStatusName::Started,
        ))
        .expect("reopening outcome should succeed");

    assert_eq!(started.version, TaskVersion::new(1));
    assert_eq!(
        started.status_event.as_ref().map(TaskStatusEvent::name),
        Some(TaskStatusName::Started)
    );
    assert_eq!(restated.status_event, None);
    assert_eq!(restated.version, TaskVersion::new(1));
    assert_eq!(
        completed.status_event.as_ref().map(TaskStatusEvent::name),
        Some(TaskStatusName::Completed)
    );
    assert_eq!(
        reopened.status_event.as_ref().map(TaskStatusEvent::name),
        Some(TaskStatusName::Started)
    );
    assert_eq!(
        history(&rt, &store, task_id),
        vec![
            TaskStatusName::NotStarted,
            TaskStatusName::Started,
            TaskStatusName::Completed,
            TaskStatusName::Started,
        ]
    );
}

#[rstest]
fn stale_recorded_outcome_writes_nothing(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("stale_outcome");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let task_id = rt
        .block_on(store.create(new_task(LinkId::new(), TaskType::Consents)))
        .expect("create should succeed")
        .id();
    let current = Some(json!({ "completedDefinitionIds": [1] }));
    rt.block_on(store.update_metadata(task_id, TaskVersion::INITIAL, current.clone()))
        .expect("rival write should succeed");

    let replace = rt.block_on(store.record_outcome(
        task_id,
        TaskVersion::INITIAL,
        MetadataWrite::Replace(Some(json!({ "completedDefinitionIds": [2] }))),
        TaskStatusName::Completed,
    ));
    let keep = rt.block_on(store.record_outcome(
        task_id,
        TaskVersion::INITIAL,
        MetadataWrite::Keep,
        TaskStatusName::Started,
    ));

    for result in [replace, keep] {
        assert!(matches!(
            result,
            Err(TaskStoreError::Conflict { actual, .. }) if actual == TaskVersion::new(1)
        ));
    }
    let stored = rt
        .block_on(store.find_by_id(task_id))
        .expect("lookup should succeed")
        .expect("task should exist");
    assert_eq!(stored.metadata(), current.as_ref());
    assert_eq!(stored.version(), TaskVersion::new(1));
    assert_eq!(history(&rt, &store, task_id), vec![TaskStatusName::NotStarted]);
}

#[rstest]
fn failed_status_insert_rolls_back_the_metadata(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("rollback");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let task_id = rt
        .block_on(store.create(new_task(LinkId::new(), TaskType::PrimaryCareProvider)))
        .expect("create should succeed")
        .id();
    execute_sql(
        shared_test_cluster,
        &db_name,
        "ALTER TABLE companion_task_statuses \
         ADD CONSTRAINT reject_completed CHECK (name <> 'COMPLETED')",
    )
    .expect("constraint should apply");

    let result = rt.block_on(store.record_outcome(
        task_id,
        TaskVersion::INITIAL,
        MetadataWrite::Replace(Some(
            json!({ "socialHistoryResponses": { "HAS_PCP": false } }),
        )),
        TaskStatusName::Completed,
    ));

    assert!(matches!(result, Err(TaskStoreError::Persistence(_))));
    let stored = rt
        .block_on(store.find_by_id(task_id))
        .expect("lookup should succeed")
        .expect("task should exist");
    assert_eq!(stored.metadata(), None);
    assert_eq!(stored.version(), TaskVersion::INITIAL);
    assert_eq!(history(&rt, &store, task_id), vec![TaskStatusName::NotStarted]);
}

#[rstest]
fn status_overrides_always_append(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("override");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let task_id = rt
        .block_on(store.create(new_task(LinkId::new(), TaskType::IdentificationImage)))
        .expect("create should succeed")
        .id();

    for _ in 0..2 {
        let event = rt
            .block_on(store.append_status_event(task_id, TaskStatusName::Errored))
            .expect("override should append");
        assert_eq!(event.task_id(), task_id);
    }
    let missing = rt.block_on(store.append_status_event(TaskId::new(9_999), TaskStatusName::Started));

    assert!(matches!(missing, Err(TaskStoreError::NotFound(_))));
    assert_eq!(
        history(&rt, &store, task_id),
        vec![
            TaskStatusName::NotStarted,
            TaskStatusName::Errored,
            TaskStatusName::Errored,
        ]
    );
}

#[rstest]
#[case("INSERT INTO companion_task_statuses (companion_task_id, name) VALUES ({id}, 'completed')")]
#[case("INSERT INTO companion_task_statuses (companion_task_id, name) VALUES ({id}, 'DONE')")]
#[case("UPDATE companion_tasks SET type = 'consents' WHERE id = {id}")]
#[case("DELETE FROM companion_task_statuses WHERE companion_task_id = {id}")]
fn unmappable_rows_surface_as_corrupt(
    shared_test_cluster: &'static TestCluster,
    #[case] corruption: &str,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = unique_db_name("corrupt");
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let rt = test_runtime();
    let task_id = rt
        .block_on(store.create(new_task(LinkId::new(), TaskType::Consents)))
        .expect("create should succeed")
        .id();
    execute_sql(
        shared_test_cluster,
        &db_name,
        &corruption.replace("{id}", &task_id.value().to_string()),
    )
    .expect("corruption should apply");

    let result = rt.block_on(store.find_by_id(task_id));

    assert!(matches!(
        result,
        Err(TaskStoreError::CorruptRow { task_id: reported, .. }) if reported == task_id
    ));
}
