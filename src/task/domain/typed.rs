//! Typed task views produced by the metadata codec.

use super::{
    ConsentsMetadata, DefaultPharmacyMetadata, IdentificationImageMetadata,
    InsuranceImageMetadata, LinkId, MedicationHistoryConsentMetadata, PcpMetadata,
    PersistedTaskData, Task, TaskId, TaskMetadataError, TaskStatusLog, TaskStatusName, TaskType,
    TaskVariant, TaskVersion, codec,
};
use chrono::{DateTime, Utc};

/// Row attributes shared by every typed task view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHeader {
    /// Task identifier.
    pub id: TaskId,
    /// Owning companion link.
    pub link_id: LinkId,
    /// Metadata version the view was decoded from.
    pub version: TaskVersion,
    /// Status history at decode time.
    pub statuses: TaskStatusLog,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TaskHeader {
    /// Returns the current status name.
    #[must_use]
    pub fn current_status(&self) -> TaskStatusName {
        self.statuses.current_status()
    }
}

/// A task whose metadata has been narrowed to variant `M`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedTask<M> {
    header: TaskHeader,
    metadata: M,
}

/// Identification image task view.
pub type IdentificationImageTask = TypedTask<IdentificationImageMetadata>;
/// Insurance card images task view.
pub type InsuranceImageTask = TypedTask<InsuranceImageMetadata>;
/// Default pharmacy task view.
pub type DefaultPharmacyTask = TypedTask<DefaultPharmacyMetadata>;
/// Primary care provider task view.
pub type PcpTask = TypedTask<PcpMetadata>;
/// Medication history consent task view.
pub type MedicationHistoryConsentTask = TypedTask<MedicationHistoryConsentMetadata>;
/// Consents task view.
pub type ConsentsTask = TypedTask<ConsentsMetadata>;

impl<M: TaskVariant> TypedTask<M> {
    /// Narrows a raw task row into variant `M`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskMetadataError::WrongTaskType`] when the row's type tag is
    /// not `M::TASK_TYPE`, or [`TaskMetadataError::InvalidMetadata`] when the
    /// stored metadata does not decode.
    pub fn decode(task: Task) -> Result<Self, TaskMetadataError> {
        codec::ensure_task_type::<M>(task.task_type())?;
        let data = task.into_persisted();
        let metadata = M::decode_metadata(data.metadata.as_ref())?;
        Ok(Self {
            header: TaskHeader {
                id: data.id,
                link_id: data.link_id,
                version: data.version,
                statuses: data.statuses,
                created_at: data.created_at,
                updated_at: data.updated_at,
            },
            metadata,
        })
    }

    /// Encodes the view back into a raw row.
    #[must_use]
    pub fn into_task(self) -> Task {
        let metadata = self.metadata.encode_metadata();
        Task::from_persisted(PersistedTaskData {
            id: self.header.id,
            link_id: self.header.link_id,
            task_type: M::TASK_TYPE,
            metadata,
            version: self.header.version,
            statuses: self.header.statuses,
            created_at: self.header.created_at,
            updated_at: self.header.updated_at,
        })
    }

    /// Returns the task type tag.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        M::TASK_TYPE
    }
}

impl<M> TypedTask<M> {
    /// Returns the shared row attributes.
    #[must_use]
    pub const fn header(&self) -> &TaskHeader {
        &self.header
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.header.id
    }

    /// Returns the typed metadata.
    #[must_use]
    pub const fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Consumes the view, returning the typed metadata.
    #[must_use]
    pub fn into_metadata(self) -> M {
        self.metadata
    }

    /// Returns the current status name.
    #[must_use]
    pub fn current_status(&self) -> TaskStatusName {
        self.header.current_status()
    }
}

/// Closed sum of every typed task view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionTask {
    /// Identification image upload.
    IdentificationImage(IdentificationImageTask),
    /// Insurance card images.
    InsuranceCardImages(InsuranceImageTask),
    /// Default pharmacy selection.
    DefaultPharmacy(DefaultPharmacyTask),
    /// Primary care provider.
    PrimaryCareProvider(PcpTask),
    /// Medication history authority consent.
    ConsentMedicationHistoryAuthority(MedicationHistoryConsentTask),
    /// Consent definitions.
    Consents(ConsentsTask),
}

impl CompanionTask {
    /// Narrows a raw row by dispatching on its stored type tag.
    ///
    /// # Errors
    ///
    /// Returns [`TaskMetadataError::InvalidMetadata`] when the stored metadata
    /// does not decode for the row's type.
    pub fn decode(task: Task) -> Result<Self, TaskMetadataError> {
        Ok(match task.task_type() {
            TaskType::IdentificationImage => Self::IdentificationImage(TypedTask::decode(task)?),
            TaskType::InsuranceCardImages => Self::InsuranceCardImages(TypedTask::decode(task)?),
            TaskType::DefaultPharmacy => Self::DefaultPharmacy(TypedTask::decode(task)?),
            TaskType::PrimaryCareProvider => Self::PrimaryCareProvider(TypedTask::decode(task)?),
            TaskType::ConsentMedicationHistoryAuthority => {
                Self::ConsentMedicationHistoryAuthority(TypedTask::decode(task)?)
            }
            TaskType::Consents => Self::Consents(TypedTask::decode(task)?),
        })
    }

    /// Returns the task type tag.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::IdentificationImage(_) => TaskType::IdentificationImage,
            Self::InsuranceCardImages(_) => TaskType::InsuranceCardImages,
            Self::DefaultPharmacy(_) => TaskType::DefaultPharmacy,
            Self::PrimaryCareProvider(_) => TaskType::PrimaryCareProvider,
            Self::ConsentMedicationHistoryAuthority(_) => {
                TaskType::ConsentMedicationHistoryAuthority
            }
            Self::Consents(_) => TaskType::Consents,
        }
    }

    /// Returns the shared row attributes.
    #[must_use]
    pub const fn header(&self) -> &TaskHeader {
        match self {
            Self::IdentificationImage(task) => task.header(),
            Self::InsuranceCardImages(task) => task.header(),
            Self::DefaultPharmacy(task) => task.header(),
            Self::PrimaryCareProvider(task) => task.header(),
            Self::ConsentMedicationHistoryAuthority(task) => task.header(),
            Self::Consents(task) => task.header(),
        }
    }

    /// Returns the current status name.
    #[must_use]
    pub fn current_status(&self) -> TaskStatusName {
        self.header().current_status()
    }
}
