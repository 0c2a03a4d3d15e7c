//! `PostgreSQL` task store.
//!
//! Metadata writes are a single conditional `UPDATE ... WHERE version = $n`,
//! so concurrent writers never overwrite each other. Rule outcomes lock the
//! task row, check its version, then write metadata and the derived status
//! in one transaction.

use super::{
    models::{NewStatusRow, NewTaskRow, StatusRow, TaskRow},
    schema::{companion_task_statuses, companion_tasks},
};
use crate::task::{
    domain::{
        LinkId, NewTask, PersistedTaskData, StatusEventId, Task, TaskDomainError, TaskId,
        TaskStatusEvent, TaskStatusLog, TaskStatusName, TaskType, TaskVersion,
    },
    ports::{MetadataWrite, RecordedOutcome, TaskStore, TaskStoreError, TaskStoreResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// `PostgreSQL` connection pool type used by the task store.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task store.
#[derive(Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for PostgresTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTaskStore")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl From<DieselError> for TaskStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

impl PostgresTaskStore {
    /// Creates a store from a `PostgreSQL` connection pool.
    #[must_use]
    pub fn new(pool: TaskPgPool) -> Self {
        Self::with_clock(pool, Arc::new(DefaultClock))
    }

    /// Creates a store whose timestamps come from `clock`.
    #[must_use]
    pub fn with_clock(pool: TaskPgPool, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { pool, clock }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn create(&self, task: NewTask) -> TaskStoreResult<Task> {
        let now = self.clock.utc();
        let link_id = task.link_id;
        let task_type = task.task_type;
        let initial_status = task.initial_status;
        let new_row = NewTaskRow {
            companion_link_id: link_id.into_inner(),
            task_type: task_type.as_str().to_owned(),
            metadata: task.metadata,
            version: version_to_db(TaskVersion::INITIAL)?,
            created_at: now,
            updated_at: now,
        };

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                let row = diesel::insert_into(companion_tasks::table)
                    .values(&new_row)
                    .returning(TaskRow::as_returning())
                    .get_result::<TaskRow>(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            TaskStoreError::DuplicateTask { link_id, task_type }
                        }
                        other => TaskStoreError::persistence(other),
                    })?;
                let seed = insert_status(tx, row.id, initial_status, now)?;
                row_to_task(row, vec![seed])
            })
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = companion_tasks::table
                .filter(companion_tasks::id.eq(id.value()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(|found| load_with_statuses(connection, found))
                .transpose()
        })
        .await
    }

    async fn find_by_link_and_type(
        &self,
        link_id: LinkId,
        task_type: TaskType,
    ) -> TaskStoreResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = companion_tasks::table
                .filter(companion_tasks::companion_link_id.eq(link_id.into_inner()))
                .filter(companion_tasks::task_type.eq(task_type.as_str()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(|found| load_with_statuses(connection, found))
                .transpose()
        })
        .await
    }

    async fn find_many_for_link(&self, link_id: LinkId) -> TaskStoreResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = companion_tasks::table
                .filter(companion_tasks::companion_link_id.eq(link_id.into_inner()))
                .order(companion_tasks::id.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            let task_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
            let status_rows = companion_task_statuses::table
                .filter(companion_task_statuses::companion_task_id.eq_any(task_ids))
                .order((
                    companion_task_statuses::companion_task_id.asc(),
                    companion_task_statuses::id.asc(),
                ))
                .select(StatusRow::as_select())
                .load::<StatusRow>(connection)?;

            let mut grouped: HashMap<i64, Vec<StatusRow>> = HashMap::new();
            for status in status_rows {
                grouped
                    .entry(status.companion_task_id)
                    .or_default()
                    .push(status);
            }
            rows.into_iter()
                .map(|row| {
                    let statuses = grouped.remove(&row.id).unwrap_or_default();
                    row_to_task(row, statuses)
                })
                .collect()
        })
        .await
    }

    async fn append_status_event(
        &self,
        task_id: TaskId,
        name: TaskStatusName,
    ) -> TaskStoreResult<TaskStatusEvent> {
        let now = self.clock.utc();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                lock_task(tx, task_id)?;
                let row = insert_status(tx, task_id.value(), name, now)?;
                touch_task(tx, task_id, now)?;
                row_to_status(row)
            })
        })
        .await
    }

    async fn record_outcome(
        &self,
        task_id: TaskId,
        expected_version: TaskVersion,
        metadata: MetadataWrite,
        status: TaskStatusName,
    ) -> TaskStoreResult<RecordedOutcome> {
        let now = self.clock.utc();
        let expected = version_to_db(expected_version)?;
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                let stored = lock_task(tx, task_id)?;
                if stored != expected {
                    return Err(TaskStoreError::Conflict {
                        task_id,
                        expected: expected_version,
                        actual: version_from_db(task_id, stored)?,
                    });
                }

                let version = match metadata {
                    MetadataWrite::Keep => stored,
                    MetadataWrite::Replace(payload) => diesel::update(
                        companion_tasks::table.filter(companion_tasks::id.eq(task_id.value())),
                    )
                    .set((
                        companion_tasks::metadata.eq(payload),
                        companion_tasks::version.eq(companion_tasks::version + 1_i64),
                        companion_tasks::updated_at.eq(now),
                    ))
                    .returning(companion_tasks::version)
                    .get_result::<i64>(tx)?,
                };

                let latest = latest_status(tx, task_id)?;
                let status_event = if latest == status {
                    None
                } else {
                    let row = insert_status(tx, task_id.value(), status, now)?;
                    touch_task(tx, task_id, now)?;
                    Some(row_to_status(row)?)
                };

                Ok(RecordedOutcome {
                    version: version_from_db(task_id, version)?,
                    status_event,
                })
            })
        })
        .await
    }

    async fn update_metadata(
        &self,
        task_id: TaskId,
        expected_version: TaskVersion,
        metadata: Option<Value>,
    ) -> TaskStoreResult<TaskVersion> {
        let now = self.clock.utc();
        let expected = version_to_db(expected_version)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                companion_tasks::table
                    .filter(companion_tasks::id.eq(task_id.value()))
                    .filter(companion_tasks::version.eq(expected)),
            )
            .set((
                companion_tasks::metadata.eq(metadata),
                companion_tasks::version.eq(companion_tasks::version + 1_i64),
                companion_tasks::updated_at.eq(now),
            ))
            .returning(companion_tasks::version)
            .get_result::<i64>(connection)
            .optional()?;

            if let Some(version) = updated {
                return version_from_db(task_id, version);
            }

            let stored = companion_tasks::table
                .filter(companion_tasks::id.eq(task_id.value()))
                .select(companion_tasks::version)
                .first::<i64>(connection)
                .optional()?
                .ok_or(TaskStoreError::NotFound(task_id))?;
            Err(TaskStoreError::Conflict {
                task_id,
                expected: expected_version,
                actual: version_from_db(task_id, stored)?,
            })
        })
        .await
    }
}

fn lock_task(connection: &mut PgConnection, task_id: TaskId) -> TaskStoreResult<i64> {
    companion_tasks::table
        .filter(companion_tasks::id.eq(task_id.value()))
        .select(companion_tasks::version)
        .for_update()
        .first::<i64>(connection)
        .optional()?
        .ok_or(TaskStoreError::NotFound(task_id))
}

fn latest_status(
    connection: &mut PgConnection,
    task_id: TaskId,
) -> TaskStoreResult<TaskStatusName> {
    let name = companion_task_statuses::table
        .filter(companion_task_statuses::companion_task_id.eq(task_id.value()))
        .order(companion_task_statuses::id.desc())
        .select(companion_task_statuses::name)
        .first::<String>(connection)
        .optional()?
        .ok_or_else(|| corrupt(task_id, TaskDomainError::EmptyStatusLog.to_string()))?;
    parse_status_name(task_id, &name)
}

fn touch_task(
    connection: &mut PgConnection,
    task_id: TaskId,
    now: chrono::DateTime<chrono::Utc>,
) -> TaskStoreResult<()> {
    diesel::update(companion_tasks::table.filter(companion_tasks::id.eq(task_id.value())))
        .set(companion_tasks::updated_at.eq(now))
        .execute(connection)?;
    Ok(())
}

fn insert_status(
    connection: &mut PgConnection,
    task_id: i64,
    name: TaskStatusName,
    now: chrono::DateTime<chrono::Utc>,
) -> TaskStoreResult<StatusRow> {
    let row = diesel::insert_into(companion_task_statuses::table)
        .values(&NewStatusRow {
            companion_task_id: task_id,
            name: name.as_str().to_owned(),
            created_at: now,
        })
        .returning(StatusRow::as_returning())
        .get_result::<StatusRow>(connection)?;
    Ok(row)
}

fn load_with_statuses(connection: &mut PgConnection, row: TaskRow) -> TaskStoreResult<Task> {
    let statuses = companion_task_statuses::table
        .filter(companion_task_statuses::companion_task_id.eq(row.id))
        .order(companion_task_statuses::id.asc())
        .select(StatusRow::as_select())
        .load::<StatusRow>(connection)?;
    row_to_task(row, statuses)
}

fn version_to_db(version: TaskVersion) -> TaskStoreResult<i64> {
    i64::try_from(version.value()).map_err(TaskStoreError::persistence)
}

fn version_from_db(task_id: TaskId, version: i64) -> TaskStoreResult<TaskVersion> {
    u64::try_from(version)
        .map(TaskVersion::new)
        .map_err(|_| corrupt(task_id, format!("negative metadata version {version}")))
}

fn parse_status_name(task_id: TaskId, name: &str) -> TaskStoreResult<TaskStatusName> {
    TaskStatusName::try_from(name).map_err(|err| corrupt(task_id, err.to_string()))
}

fn corrupt(task_id: TaskId, reason: impl Into<String>) -> TaskStoreError {
    TaskStoreError::CorruptRow {
        task_id,
        reason: reason.into(),
    }
}

fn row_to_status(row: StatusRow) -> TaskStoreResult<TaskStatusEvent> {
    let task_id = TaskId::new(row.companion_task_id);
    Ok(TaskStatusEvent::new(
        StatusEventId::new(row.id),
        task_id,
        parse_status_name(task_id, &row.name)?,
        row.created_at,
    ))
}

fn row_to_task(row: TaskRow, status_rows: Vec<StatusRow>) -> TaskStoreResult<Task> {
    let TaskRow {
        id,
        companion_link_id,
        task_type: persisted_type,
        metadata,
        version,
        created_at,
        updated_at,
    } = row;
    let task_id = TaskId::new(id);

    let task_type = TaskType::try_from(persisted_type.as_str())
        .map_err(|err| corrupt(task_id, err.to_string()))?;
    let events = status_rows
        .into_iter()
        .map(row_to_status)
        .collect::<TaskStoreResult<Vec<_>>>()?;
    let statuses =
        TaskStatusLog::from_events(events).map_err(|err| corrupt(task_id, err.to_string()))?;

    Ok(Task::from_persisted(PersistedTaskData {
        id: task_id,
        link_id: LinkId::from_uuid(companion_link_id),
        task_type,
        metadata,
        version: version_from_db(task_id, version)?,
        statuses,
        created_at,
        updated_at,
    }))
}
