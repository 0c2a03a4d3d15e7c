//! Raw companion task rows and the closed set of task types.

use super::{LinkId, TaskDomainError, TaskId, TaskStatusLog, TaskStatusName, TaskVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Checklist item kinds tracked per companion link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Upload of a driver's license or other identification.
    IdentificationImage,
    /// Upload of front/back insurance card images per priority.
    InsuranceCardImages,
    /// Selection of a default pharmacy.
    DefaultPharmacy,
    /// Primary care provider selection or social-history answers.
    PrimaryCareProvider,
    /// Medication history authority consent.
    ConsentMedicationHistoryAuthority,
    /// Signed consent definitions.
    Consents,
}

impl TaskType {
    /// Every task type, in provisioning order.
    pub const ALL: [Self; 6] = [
        Self::IdentificationImage,
        Self::InsuranceCardImages,
        Self::DefaultPharmacy,
        Self::PrimaryCareProvider,
        Self::ConsentMedicationHistoryAuthority,
        Self::Consents,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdentificationImage => "IDENTIFICATION_IMAGE",
            Self::InsuranceCardImages => "INSURANCE_CARD_IMAGES",
            Self::DefaultPharmacy => "DEFAULT_PHARMACY",
            Self::PrimaryCareProvider => "PRIMARY_CARE_PROVIDER",
            Self::ConsentMedicationHistoryAuthority => "CONSENT_MEDICATION_HISTORY_AUTHORITY",
            Self::Consents => "CONSENTS",
        }
    }
}

impl TryFrom<&str> for TaskType {
    type Error = TaskDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == value)
            .ok_or_else(|| TaskDomainError::UnknownTaskType(value.to_owned()))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted task row with its untyped metadata payload.
///
/// The type tag is fixed at creation. Typed access goes through the metadata
/// codec, which is the only place raw JSON is narrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    link_id: LinkId,
    task_type: TaskType,
    metadata: Option<Value>,
    version: TaskVersion,
    statuses: TaskStatusLog,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task row.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Owning companion link.
    pub link_id: LinkId,
    /// Immutable task type tag.
    pub task_type: TaskType,
    /// Raw metadata payload, `None` when stored as SQL/JSON null.
    pub metadata: Option<Value>,
    /// Metadata version for compare-and-swap writes.
    pub version: TaskVersion,
    /// Ordered status history.
    pub statuses: TaskStatusLog,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            link_id: data.link_id,
            task_type: data.task_type,
            metadata: data.metadata.filter(|value| !value.is_null()),
            version: data.version,
            statuses: data.statuses,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning link identifier.
    #[must_use]
    pub const fn link_id(&self) -> LinkId {
        self.link_id
    }

    /// Returns the immutable task type tag.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the raw metadata payload.
    #[must_use]
    pub const fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Returns the metadata version.
    #[must_use]
    pub const fn version(&self) -> TaskVersion {
        self.version
    }

    /// Returns the status history.
    #[must_use]
    pub const fn statuses(&self) -> &TaskStatusLog {
        &self.statuses
    }

    /// Returns the current status name.
    #[must_use]
    pub fn current_status(&self) -> TaskStatusName {
        self.statuses.current_status()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Splits the row into its persisted parts.
    #[must_use]
    pub fn into_persisted(self) -> PersistedTaskData {
        PersistedTaskData {
            id: self.id,
            link_id: self.link_id,
            task_type: self.task_type,
            metadata: self.metadata,
            version: self.version,
            statuses: self.statuses,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A task to be created when a companion link is provisioned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    /// Owning companion link.
    pub link_id: LinkId,
    /// Task type tag.
    pub task_type: TaskType,
    /// Initial encoded metadata.
    pub metadata: Option<Value>,
    /// Seed status recorded as the first history entry.
    pub initial_status: TaskStatusName,
}
