//! Service layer for companion task reads and event application.
//!
//! [`TaskService::apply_event`] is the single write path for derived task
//! state: it reads the task, narrows its metadata, runs the completion rule,
//! then writes the new metadata and the derived status in one
//! version-checked store call. A version conflict restarts the whole
//! read-modify-write cycle.

use super::TaskServiceConfig;
use crate::task::{
    domain::{
        CompanionTask, CompletionRequirements, CompletionRule, ConsentSigned, ConsentsMetadata,
        DefaultPharmacyMetadata, IdentificationImageMetadata, IdentificationUploaded,
        InsuranceImageMetadata, InsuranceImageUploaded, LinkId, MedicationHistoryConsentApplied,
        MedicationHistoryConsentMetadata, NewTask, PcpEvent, PcpMetadata, PharmacySet, Task,
        TaskEvent, TaskId, TaskMetadataError, TaskStatusEvent, TaskStatusName, TaskType,
        TaskVariant, TypedTask,
    },
    ports::{MetadataWrite, TaskStore, TaskStoreError},
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Service-level errors for companion task operations.
#[derive(Debug, Error)]
pub enum TaskServiceError {
    /// The link has no task of the requested type.
    #[error("link {link_id} has no {task_type} task")]
    TaskNotFound {
        /// Link that was searched.
        link_id: LinkId,
        /// Requested task type.
        task_type: TaskType,
    },

    /// A task was requested as a variant that does not match its type tag.
    #[error("task {task_id} is a {actual} task, not {expected}")]
    WrongTaskType {
        /// Task that was requested.
        task_id: TaskId,
        /// Variant the caller asked for.
        expected: TaskType,
        /// Stored type tag.
        actual: TaskType,
    },

    /// Stored metadata does not decode for the task's own type.
    #[error("task {task_id} has corrupt metadata: {source}")]
    CorruptMetadata {
        /// Offending task.
        task_id: TaskId,
        /// Decode failure with field path.
        #[source]
        source: TaskMetadataError,
    },

    /// Metadata writes kept conflicting with concurrent writers.
    #[error("task {task_id} still conflicted after {attempts} attempts")]
    ConflictRetriesExhausted {
        /// Contended task.
        task_id: TaskId,
        /// Attempts made.
        attempts: u32,
    },

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

impl TaskServiceError {
    /// Returns whether the error reflects bad persisted data rather than a
    /// caller mistake or a transient failure.
    #[must_use]
    pub const fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::CorruptMetadata { .. } | Self::Store(TaskStoreError::CorruptRow { .. })
        )
    }

    fn from_decode(task_id: TaskId, err: TaskMetadataError) -> Self {
        match err {
            TaskMetadataError::WrongTaskType { expected, actual } => Self::WrongTaskType {
                task_id,
                expected,
                actual,
            },
            source @ TaskMetadataError::InvalidMetadata { .. } => {
                error!(task_id = %task_id, error = %source, "stored task metadata is corrupt");
                Self::CorruptMetadata { task_id, source }
            }
        }
    }
}

/// Result type for task service operations.
pub type TaskServiceResult<T> = Result<T, TaskServiceError>;

/// Outcome of applying one event to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResult<T> {
    /// Task view after the write.
    pub task: T,
    /// Whether the rule or the requirements resolved the task.
    pub should_complete: bool,
    /// Status event recorded by this call, if the derived status moved.
    pub status_event: Option<TaskStatusEvent>,
}

impl<T> AppliedResult<T> {
    /// Returns whether this call appended a status event.
    #[must_use]
    pub const fn status_changed(&self) -> bool {
        self.status_event.is_some()
    }

    /// Maps the task view, keeping the outcome.
    #[must_use]
    pub fn map_task<U>(self, f: impl FnOnce(T) -> U) -> AppliedResult<U> {
        AppliedResult {
            task: f(self.task),
            should_complete: self.should_complete,
            status_event: self.status_event,
        }
    }
}

/// Request to create one task for a newly provisioned link.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionTask {
    task_type: TaskType,
    metadata: Option<Value>,
    initial_status: TaskStatusName,
}

impl ProvisionTask {
    /// Provisions a task of `M`'s type seeded with `metadata`.
    #[must_use]
    pub fn with_metadata<M: TaskVariant>(metadata: &M) -> Self {
        Self {
            task_type: M::TASK_TYPE,
            metadata: metadata.encode_metadata(),
            initial_status: TaskStatusName::NotStarted,
        }
    }

    /// Provisions a task of `task_type` with its empty metadata shape.
    #[must_use]
    pub fn empty(task_type: TaskType) -> Self {
        match task_type {
            TaskType::IdentificationImage => {
                Self::with_metadata(&IdentificationImageMetadata)
            }
            TaskType::InsuranceCardImages => {
                Self::with_metadata(&InsuranceImageMetadata::default())
            }
            TaskType::DefaultPharmacy => Self::with_metadata(&DefaultPharmacyMetadata),
            TaskType::PrimaryCareProvider => Self::with_metadata(&PcpMetadata::default()),
            TaskType::ConsentMedicationHistoryAuthority => {
                Self::with_metadata(&MedicationHistoryConsentMetadata)
            }
            TaskType::Consents => Self::with_metadata(&ConsentsMetadata::default()),
        }
    }

    /// Overrides the seed status (NOT_STARTED by default).
    #[must_use]
    pub const fn with_initial_status(mut self, status: TaskStatusName) -> Self {
        self.initial_status = status;
        self
    }

    /// Returns the task type to create.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }
}

/// Companion task orchestration service.
pub struct TaskService<S>
where
    S: TaskStore,
{
    store: Arc<S>,
    config: TaskServiceConfig,
}

impl<S> Clone for TaskService<S>
where
    S: TaskStore,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S> std::fmt::Debug for TaskService<S>
where
    S: TaskStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> TaskService<S>
where
    S: TaskStore,
{
    /// Creates a service with the default configuration.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, TaskServiceConfig::default())
    }

    /// Creates a service with an explicit configuration.
    #[must_use]
    pub const fn with_config(store: Arc<S>, config: TaskServiceConfig) -> Self {
        Self { store, config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &TaskServiceConfig {
        &self.config
    }

    /// Loads the link's task of `M`'s type as a typed view.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::TaskNotFound`] when the link has no such
    /// task and [`TaskServiceError::CorruptMetadata`] when its metadata does
    /// not decode.
    #[instrument(skip(self), fields(task_type = M::TASK_TYPE.as_str()))]
    pub async fn get_typed<M: TaskVariant>(
        &self,
        link_id: LinkId,
    ) -> TaskServiceResult<TypedTask<M>> {
        let task = self.load(link_id, M::TASK_TYPE).await?;
        let task_id = task.id();
        TypedTask::decode(task).map_err(|err| TaskServiceError::from_decode(task_id, err))
    }

    /// Loads a task by identifier and narrows it into `M`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::WrongTaskType`] when the task is not of
    /// `M`'s type, [`TaskServiceError::CorruptMetadata`] when its metadata does
    /// not decode, and [`TaskServiceError::Store`] when it does not exist.
    #[instrument(skip(self), fields(task_type = M::TASK_TYPE.as_str()))]
    pub async fn get_typed_by_id<M: TaskVariant>(
        &self,
        task_id: TaskId,
    ) -> TaskServiceResult<TypedTask<M>> {
        let task = self
            .store
            .find_by_id(task_id)
            .await?
            .ok_or(TaskStoreError::NotFound(task_id))?;
        TypedTask::decode(task).map_err(|err| TaskServiceError::from_decode(task_id, err))
    }

    /// Loads the link's task of `task_type`, narrowed by its own type tag.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::TaskNotFound`] when the link has no such
    /// task and [`TaskServiceError::CorruptMetadata`] when its metadata does
    /// not decode.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        link_id: LinkId,
        task_type: TaskType,
    ) -> TaskServiceResult<CompanionTask> {
        let task = self.load(link_id, task_type).await?;
        decode_companion(task)
    }

    /// Lists every task owned by the link, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::CorruptMetadata`] when any task's metadata
    /// does not decode, or [`TaskServiceError::Store`] when the lookup fails.
    #[instrument(skip(self))]
    pub async fn list_for_link(&self, link_id: LinkId) -> TaskServiceResult<Vec<CompanionTask>> {
        self.store
            .find_many_for_link(link_id)
            .await?
            .into_iter()
            .map(decode_companion)
            .collect()
    }

    /// Creates a task for a newly provisioned link.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Store`] wrapping
    /// [`TaskStoreError::DuplicateTask`] when the link already has a task of
    /// the same type.
    #[instrument(skip(self, request), fields(task_type = request.task_type().as_str()))]
    pub async fn provision(
        &self,
        link_id: LinkId,
        request: ProvisionTask,
    ) -> TaskServiceResult<CompanionTask> {
        let created = self
            .store
            .create(NewTask {
                link_id,
                task_type: request.task_type,
                metadata: request.metadata,
                initial_status: request.initial_status,
            })
            .await?;
        debug!(task_id = %created.id(), "provisioned task");
        decode_companion(created)
    }

    /// Applies a feature event with the configured default requirements.
    ///
    /// Insurance completion uses the configured priorities; consents never
    /// complete without caller-supplied definitions.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_event_with`].
    pub async fn apply_event(
        &self,
        link_id: LinkId,
        event: TaskEvent,
    ) -> TaskServiceResult<AppliedResult<CompanionTask>> {
        let requirements = self.config.default_requirements();
        self.apply_event_with(link_id, event, &requirements).await
    }

    /// Applies a feature event to the link's task of the event's type.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::TaskNotFound`] when the link has no task
    /// for the event, [`TaskServiceError::CorruptMetadata`] when the stored
    /// metadata does not decode (nothing is written), and
    /// [`TaskServiceError::ConflictRetriesExhausted`] when concurrent writers
    /// won every attempt.
    #[instrument(skip(self, requirements))]
    pub async fn apply_event_with(
        &self,
        link_id: LinkId,
        event: TaskEvent,
        requirements: &CompletionRequirements,
    ) -> TaskServiceResult<AppliedResult<CompanionTask>> {
        match event {
            TaskEvent::IdentificationUploaded => self
                .apply_rule::<IdentificationImageMetadata>(
                    link_id,
                    &IdentificationUploaded,
                    requirements,
                )
                .await
                .map(|applied| applied.map_task(CompanionTask::IdentificationImage)),
            TaskEvent::InsuranceImageUploaded { priority } => self
                .apply_rule::<InsuranceImageMetadata>(
                    link_id,
                    &InsuranceImageUploaded { priority },
                    requirements,
                )
                .await
                .map(|applied| applied.map_task(CompanionTask::InsuranceCardImages)),
            TaskEvent::PharmacySet => self
                .apply_rule::<DefaultPharmacyMetadata>(link_id, &PharmacySet, requirements)
                .await
                .map(|applied| applied.map_task(CompanionTask::DefaultPharmacy)),
            TaskEvent::PcpSelected {
                clinical_provider_id,
            } => self
                .apply_rule::<PcpMetadata>(
                    link_id,
                    &PcpEvent::Selected {
                        clinical_provider_id,
                    },
                    requirements,
                )
                .await
                .map(|applied| applied.map_task(CompanionTask::PrimaryCareProvider)),
            TaskEvent::SocialHistoryAnswered {
                question_tag,
                value,
            } => self
                .apply_rule::<PcpMetadata>(
                    link_id,
                    &PcpEvent::SocialHistoryAnswered {
                        question_tag,
                        value,
                    },
                    requirements,
                )
                .await
                .map(|applied| applied.map_task(CompanionTask::PrimaryCareProvider)),
            TaskEvent::MedicationHistoryConsentApplied => self
                .apply_rule::<MedicationHistoryConsentMetadata>(
                    link_id,
                    &MedicationHistoryConsentApplied,
                    requirements,
                )
                .await
                .map(|applied| applied.map_task(CompanionTask::ConsentMedicationHistoryAuthority)),
            TaskEvent::ConsentSigned { definition_id } => self
                .apply_rule::<ConsentsMetadata>(
                    link_id,
                    &ConsentSigned { definition_id },
                    requirements,
                )
                .await
                .map(|applied| applied.map_task(CompanionTask::Consents)),
        }
    }

    /// Applies a rule event to the link's task of `M`'s type and returns the
    /// typed view after the write.
    ///
    /// The metadata write is skipped when the rule leaves metadata unchanged,
    /// and the status is only appended when the derived status differs from
    /// the stored one. A task whose metadata no longer satisfies its rule
    /// moves from COMPLETED back to STARTED.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_event_with`].
    #[instrument(
        skip(self, event, requirements),
        fields(task_type = M::TASK_TYPE.as_str())
    )]
    pub async fn apply_rule<M: CompletionRule>(
        &self,
        link_id: LinkId,
        event: &M::Event,
        requirements: &CompletionRequirements,
    ) -> TaskServiceResult<AppliedResult<TypedTask<M>>> {
        let max_attempts = self.config.max_conflict_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            let current = self.get_typed::<M>(link_id).await?;
            let task_id = current.id();
            let outcome = current.metadata().apply(event);
            let should_complete = outcome.should_complete || outcome.next.satisfies(requirements);

            let metadata = if outcome.next == *current.metadata() {
                MetadataWrite::Keep
            } else {
                MetadataWrite::Replace(outcome.next.encode_metadata())
            };
            let status = TaskStatusName::derived(should_complete);
            let recorded = self
                .store
                .record_outcome(task_id, current.header().version, metadata, status)
                .await;
            let status_event = match recorded {
                Ok(written) => {
                    debug!(task_id = %task_id, version = %written.version, "task outcome written");
                    written.status_event
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(task_id = %task_id, attempts = attempt, "giving up on contended task");
                        return Err(TaskServiceError::ConflictRetriesExhausted {
                            task_id,
                            attempts: attempt,
                        });
                    }
                    warn!(task_id = %task_id, attempt, error = %err, "version conflict, retrying");
                    attempt = attempt.saturating_add(1);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if let Some(recorded_event) = &status_event {
                debug!(task_id = %task_id, status = %recorded_event.name(), "task status moved");
            }

            let task = self.get_typed_by_id::<M>(task_id).await?;
            return Ok(AppliedResult {
                task,
                should_complete,
                status_event,
            });
        }
    }

    /// Records an explicit status override.
    ///
    /// Overrides always append, even when the status is unchanged, and may
    /// move a task out of COMPLETED.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Store`] when the task does not exist or the
    /// append fails.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        task_id: TaskId,
        status: TaskStatusName,
    ) -> TaskServiceResult<TaskStatusEvent> {
        let event = self.store.append_status_event(task_id, status).await?;
        debug!(event_id = %event.id(), "status override recorded");
        Ok(event)
    }

    async fn load(&self, link_id: LinkId, task_type: TaskType) -> TaskServiceResult<Task> {
        self.store
            .find_by_link_and_type(link_id, task_type)
            .await?
            .ok_or(TaskServiceError::TaskNotFound { link_id, task_type })
    }
}

fn decode_companion(task: Task) -> TaskServiceResult<CompanionTask> {
    let task_id = task.id();
    CompanionTask::decode(task).map_err(|err| TaskServiceError::from_decode(task_id, err))
}
