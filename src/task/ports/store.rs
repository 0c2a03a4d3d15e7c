//! Store port for companion task rows and their status history.

use crate::task::domain::{
    LinkId, NewTask, Task, TaskId, TaskStatusEvent, TaskStatusName, TaskType, TaskVersion,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Task persistence contract.
///
/// Metadata writes are optimistic: callers pass the version they read and
/// the store rejects the write with [`TaskStoreError::Conflict`] if another
/// writer got there first.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Creates a task with its seed status event.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the link already owns a
    /// task of the same type.
    async fn create(&self, task: NewTask) -> TaskStoreResult<Task>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>>;

    /// Finds the task of `task_type` owned by `link_id`.
    ///
    /// Returns `None` when the link has no such task.
    async fn find_by_link_and_type(
        &self,
        link_id: LinkId,
        task_type: TaskType,
    ) -> TaskStoreResult<Option<Task>>;

    /// Returns every task owned by `link_id`, ordered by identifier.
    async fn find_many_for_link(&self, link_id: LinkId) -> TaskStoreResult<Vec<Task>>;

    /// Appends a status event unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    async fn append_status_event(
        &self,
        task_id: TaskId,
        name: TaskStatusName,
    ) -> TaskStoreResult<TaskStatusEvent>;

    /// Writes the outcome of one rule application in a single atomic step.
    ///
    /// The write is rejected with [`TaskStoreError::Conflict`] unless the
    /// stored version still equals `expected_version`, even when the
    /// metadata is kept, because the derived `status` was computed from that
    /// version. On success the metadata is replaced (bumping the version)
    /// and `status` is appended when it differs from the latest stored
    /// status. Either both land or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Conflict`] on version mismatch and
    /// [`TaskStoreError::NotFound`] when the task does not exist.
    async fn record_outcome(
        &self,
        task_id: TaskId,
        expected_version: TaskVersion,
        metadata: MetadataWrite,
        status: TaskStatusName,
    ) -> TaskStoreResult<RecordedOutcome>;

    /// Replaces the task's metadata if its version still equals
    /// `expected_version`, returning the new version.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Conflict`] on version mismatch and
    /// [`TaskStoreError::NotFound`] when the task does not exist.
    async fn update_metadata(
        &self,
        task_id: TaskId,
        expected_version: TaskVersion,
        metadata: Option<Value>,
    ) -> TaskStoreResult<TaskVersion>;
}

/// Metadata half of a [`TaskStore::record_outcome`] write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataWrite {
    /// The rule left metadata unchanged; only the version is checked.
    Keep,
    /// Replace the stored payload and bump the version.
    Replace(Option<Value>),
}

/// What a [`TaskStore::record_outcome`] write committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutcome {
    /// Metadata version after the write.
    pub version: TaskVersion,
    /// Status event appended by the write, if the status moved.
    pub status_event: Option<TaskStatusEvent>,
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The link already owns a task of this type.
    #[error("link {link_id} already has a {task_type} task")]
    DuplicateTask {
        /// Owning link.
        link_id: LinkId,
        /// Duplicated task type.
        task_type: TaskType,
    },

    /// The stored metadata version moved since it was read.
    #[error("metadata conflict on task {task_id}: expected {expected}, found {actual}")]
    Conflict {
        /// Task whose write was rejected.
        task_id: TaskId,
        /// Version the writer read.
        expected: TaskVersion,
        /// Version currently stored.
        actual: TaskVersion,
    },

    /// A persisted row could not be mapped back into the domain.
    #[error("corrupt task row {task_id}: {reason}")]
    CorruptRow {
        /// Offending task.
        task_id: TaskId,
        /// What could not be mapped.
        reason: String,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    #[must_use]
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns whether the operation may succeed if retried from a fresh read.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
