//! Append-only task status history.
//!
//! A task's status is never stored as a mutable column. It is the name of the
//! most recently appended [`TaskStatusEvent`], so every transition stays
//! auditable.

use super::{StatusEventId, TaskDomainError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status names recorded in a task's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatusName {
    /// The patient has not interacted with the task.
    NotStarted,
    /// Partial progress has been recorded.
    Started,
    /// The task is done.
    Completed,
    /// An upstream step failed for this task.
    Errored,
}

impl TaskStatusName {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Errored => "ERRORED",
        }
    }

    /// Returns the status an event-driven write derives from the rule's
    /// completion verdict.
    ///
    /// A touched task is STARTED until its metadata completes it. A task
    /// whose metadata stops satisfying its rule falls back to STARTED.
    #[must_use]
    pub const fn derived(completes: bool) -> Self {
        if completes {
            Self::Completed
        } else {
            Self::Started
        }
    }
}

impl TryFrom<&str> for TaskStatusName {
    type Error = TaskDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "STARTED" => Ok(Self::Started),
            "COMPLETED" => Ok(Self::Completed),
            "ERRORED" => Ok(Self::Errored),
            _ => Err(TaskDomainError::UnknownTaskStatus(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a task's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusEvent {
    id: StatusEventId,
    task_id: TaskId,
    name: TaskStatusName,
    created_at: DateTime<Utc>,
}

impl TaskStatusEvent {
    /// Creates a status event from store-assigned values.
    #[must_use]
    pub const fn new(
        id: StatusEventId,
        task_id: TaskId,
        name: TaskStatusName,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            name,
            created_at,
        }
    }

    /// Returns the event identifier.
    #[must_use]
    pub const fn id(&self) -> StatusEventId {
        self.id
    }

    /// Returns the owning task identifier.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the recorded status name.
    #[must_use]
    pub const fn name(&self) -> TaskStatusName {
        self.name
    }

    /// Returns the time the event was appended.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Returns the name of the last event in insertion order.
///
/// # Errors
///
/// Returns [`TaskDomainError::EmptyStatusLog`] for an empty slice; every
/// persisted task is seeded with a status, so this indicates a bug.
pub fn current_status(events: &[TaskStatusEvent]) -> Result<TaskStatusName, TaskDomainError> {
    events
        .last()
        .map(TaskStatusEvent::name)
        .ok_or(TaskDomainError::EmptyStatusLog)
}

/// Non-empty, ordered status history of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TaskStatusEvent>", into = "Vec<TaskStatusEvent>")]
pub struct TaskStatusLog {
    seed: TaskStatusEvent,
    appended: Vec<TaskStatusEvent>,
}

impl TaskStatusLog {
    /// Starts a history with its seed event.
    #[must_use]
    pub const fn seeded(seed: TaskStatusEvent) -> Self {
        Self {
            seed,
            appended: Vec::new(),
        }
    }

    /// Rebuilds a history from persisted events in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyStatusLog`] when `events` is empty.
    pub fn from_events(events: Vec<TaskStatusEvent>) -> Result<Self, TaskDomainError> {
        let mut iter = events.into_iter();
        let seed = iter.next().ok_or(TaskDomainError::EmptyStatusLog)?;
        Ok(Self {
            seed,
            appended: iter.collect(),
        })
    }

    /// Returns the latest event.
    #[must_use]
    pub fn current(&self) -> &TaskStatusEvent {
        self.appended.last().unwrap_or(&self.seed)
    }

    /// Returns the current status name.
    #[must_use]
    pub fn current_status(&self) -> TaskStatusName {
        self.current().name()
    }

    /// Returns whether `next` would change the current status.
    #[must_use]
    pub fn differs_from(&self, next: TaskStatusName) -> bool {
        self.current_status() != next
    }

    /// Returns whether any event in the history carries `name`.
    #[must_use]
    pub fn has_ever_been(&self, name: TaskStatusName) -> bool {
        self.events().any(|event| event.name() == name)
    }

    /// Appends an event built by `make` only when `next` differs from the
    /// current status, returning the appended event.
    pub fn append_if_changed(
        &mut self,
        next: TaskStatusName,
        make: impl FnOnce(TaskStatusName) -> TaskStatusEvent,
    ) -> Option<&TaskStatusEvent> {
        if !self.differs_from(next) {
            return None;
        }
        Some(self.append(make(next)))
    }

    /// Appends an event unconditionally.
    pub fn append(&mut self, event: TaskStatusEvent) -> &TaskStatusEvent {
        self.appended.push(event);
        self.current()
    }

    /// Iterates over all events in insertion order.
    pub fn events(&self) -> impl Iterator<Item = &TaskStatusEvent> {
        std::iter::once(&self.seed).chain(self.appended.iter())
    }

    /// Returns the number of recorded events (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.appended.len().saturating_add(1)
    }
}

impl TryFrom<Vec<TaskStatusEvent>> for TaskStatusLog {
    type Error = TaskDomainError;

    fn try_from(events: Vec<TaskStatusEvent>) -> Result<Self, Self::Error> {
        Self::from_events(events)
    }
}

impl From<TaskStatusLog> for Vec<TaskStatusEvent> {
    fn from(log: TaskStatusLog) -> Self {
        let mut events = Vec::with_capacity(log.len());
        events.push(log.seed);
        events.extend(log.appended);
        events
    }
}
