//! Error types for companion task domain validation and decoding.

use super::TaskType;
use thiserror::Error;

/// Errors returned while constructing or parsing domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The stored task type tag is not one of the known task types.
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// The stored status name is not one of the known status names.
    #[error("unknown task status: {0}")]
    UnknownTaskStatus(String),

    /// The insurance priority is not a positive integer.
    #[error("invalid insurance priority '{0}', expected a positive integer")]
    InvalidInsurancePriority(String),

    /// A task was loaded without any status events.
    #[error("task status log is empty; every task is seeded with a status")]
    EmptyStatusLog,
}

/// Errors returned while narrowing raw task metadata into a typed variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskMetadataError {
    /// The task was requested as a variant that does not match its type tag.
    #[error("wrong task type: expected {expected}, found {actual}")]
    WrongTaskType {
        /// Task type the caller asked for.
        expected: TaskType,
        /// Task type stored on the row.
        actual: TaskType,
    },

    /// The stored metadata does not have the shape required by its type.
    #[error("invalid {task_type} metadata at '{path}': {reason}")]
    InvalidMetadata {
        /// Task type whose codec rejected the payload.
        task_type: TaskType,
        /// Dotted path of the offending field (`metadata` for the root).
        path: String,
        /// Human-readable description of the mismatch.
        reason: String,
    },
}

impl TaskMetadataError {
    /// Builds an [`TaskMetadataError::InvalidMetadata`] error.
    #[must_use]
    pub fn invalid(task_type: TaskType, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            task_type,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the offending field path for structural failures.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::WrongTaskType { .. } => None,
            Self::InvalidMetadata { path, .. } => Some(path),
        }
    }
}
