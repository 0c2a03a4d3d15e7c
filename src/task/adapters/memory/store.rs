//! In-memory task store for tests and embedders without a database.

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{
        LinkId, NewTask, PersistedTaskData, StatusEventId, Task, TaskId, TaskStatusEvent,
        TaskStatusLog, TaskStatusName, TaskType, TaskVersion,
    },
    ports::{MetadataWrite, RecordedOutcome, TaskStore, TaskStoreError, TaskStoreResult},
};

/// Thread-safe in-memory task store with optimistic metadata versioning.
#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryTaskState>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: BTreeMap<TaskId, Task>,
    link_index: HashMap<(LinkId, TaskType), TaskId>,
    last_task_id: i64,
    last_status_event_id: i64,
}

impl InMemoryTaskState {
    fn next_task_id(&mut self) -> TaskId {
        self.last_task_id = self.last_task_id.saturating_add(1);
        TaskId::new(self.last_task_id)
    }

    fn next_status_event_id(&mut self) -> StatusEventId {
        self.last_status_event_id = self.last_status_event_id.saturating_add(1);
        StatusEventId::new(self.last_status_event_id)
    }

    fn take_task(&mut self, task_id: TaskId) -> TaskStoreResult<PersistedTaskData> {
        self.tasks
            .remove(&task_id)
            .map(Task::into_persisted)
            .ok_or(TaskStoreError::NotFound(task_id))
    }

    fn take_task_at(
        &mut self,
        task_id: TaskId,
        expected: TaskVersion,
    ) -> TaskStoreResult<PersistedTaskData> {
        let actual = self
            .tasks
            .get(&task_id)
            .map(Task::version)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if actual != expected {
            return Err(TaskStoreError::Conflict {
                task_id,
                expected,
                actual,
            });
        }
        self.take_task(task_id)
    }

    fn put_task(&mut self, data: PersistedTaskData) {
        self.tasks.insert(data.id, Task::from_persisted(data));
    }
}

impl InMemoryTaskStore {
    /// Creates an empty store stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }

    /// Creates an empty store stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryTaskState::default())),
            clock,
        }
    }

    fn read(&self) -> TaskStoreResult<std::sync::RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskStoreResult<std::sync::RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryTaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTaskStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: NewTask) -> TaskStoreResult<Task> {
        let mut state = self.write()?;
        let key = (task.link_id, task.task_type);
        if state.link_index.contains_key(&key) {
            return Err(TaskStoreError::DuplicateTask {
                link_id: task.link_id,
                task_type: task.task_type,
            });
        }

        let now = self.clock.utc();
        let id = state.next_task_id();
        let seed = TaskStatusEvent::new(state.next_status_event_id(), id, task.initial_status, now);
        let created = Task::from_persisted(PersistedTaskData {
            id,
            link_id: task.link_id,
            task_type: task.task_type,
            metadata: task.metadata,
            version: TaskVersion::INITIAL,
            statuses: TaskStatusLog::seeded(seed),
            created_at: now,
            updated_at: now,
        });

        state.link_index.insert(key, id);
        state.tasks.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        let state = self.read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_by_link_and_type(
        &self,
        link_id: LinkId,
        task_type: TaskType,
    ) -> TaskStoreResult<Option<Task>> {
        let state = self.read()?;
        let task = state
            .link_index
            .get(&(link_id, task_type))
            .and_then(|task_id| state.tasks.get(task_id))
            .cloned();
        Ok(task)
    }

    async fn find_many_for_link(&self, link_id: LinkId) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .values()
            .filter(|task| task.link_id() == link_id)
            .cloned()
            .collect())
    }

    async fn append_status_event(
        &self,
        task_id: TaskId,
        name: TaskStatusName,
    ) -> TaskStoreResult<TaskStatusEvent> {
        let mut state = self.write()?;
        let mut data = state.take_task(task_id)?;
        let now = self.clock.utc();
        let event = TaskStatusEvent::new(state.next_status_event_id(), task_id, name, now);
        data.statuses.append(event.clone());
        data.updated_at = now;
        state.put_task(data);
        Ok(event)
    }

    async fn record_outcome(
        &self,
        task_id: TaskId,
        expected_version: TaskVersion,
        metadata: MetadataWrite,
        status: TaskStatusName,
    ) -> TaskStoreResult<RecordedOutcome> {
        let mut state = self.write()?;
        let mut data = state.take_task_at(task_id, expected_version)?;

        let now = self.clock.utc();
        let replaced = match metadata {
            MetadataWrite::Keep => false,
            MetadataWrite::Replace(payload) => {
                data.metadata = payload;
                data.version = data.version.next();
                true
            }
        };
        let status_event = data
            .statuses
            .append_if_changed(status, |name| {
                TaskStatusEvent::new(state.next_status_event_id(), task_id, name, now)
            })
            .cloned();
        if replaced || status_event.is_some() {
            data.updated_at = now;
        }

        let version = data.version;
        state.put_task(data);
        Ok(RecordedOutcome {
            version,
            status_event,
        })
    }

    async fn update_metadata(
        &self,
        task_id: TaskId,
        expected_version: TaskVersion,
        metadata: Option<Value>,
    ) -> TaskStoreResult<TaskVersion> {
        let mut state = self.write()?;
        let mut data = state.take_task_at(task_id, expected_version)?;

        data.metadata = metadata;
        data.version = data.version.next();
        data.updated_at = self.clock.utc();
        let version = data.version;
        state.put_task(data);
        Ok(version)
    }
}
