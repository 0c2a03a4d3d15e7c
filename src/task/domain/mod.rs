//! Domain model for companion tasks.
//!
//! A task row stores a type tag and untyped JSON metadata. The codec narrows
//! rows into typed variants, completion rules derive the next metadata from
//! incoming feature events, and the status log derives the current status
//! from an append-only history. Nothing here touches infrastructure.

pub mod codec;
mod error;
mod ids;
mod metadata;
mod requirements;
mod rules;
mod status;
mod summary;
mod task;
mod typed;

pub use codec::{TaskVariant, parse_int_prefix};
pub use error::{TaskDomainError, TaskMetadataError};
pub use ids::{ConsentDefinitionId, InsurancePriority, LinkId, StatusEventId, TaskId, TaskVersion};
pub use metadata::{
    ConsentsMetadata, DefaultPharmacyMetadata, IdentificationImageMetadata,
    InsuranceImageMetadata, MedicationHistoryConsentMetadata, PcpMetadata, QuestionTag,
    SocialHistoryResponses,
};
pub use requirements::{CompletionRequirements, overall_insurance_status};
pub use rules::{
    CompletionRule, ConsentSigned, IdentificationUploaded, InsuranceImageUploaded,
    MedicationHistoryConsentApplied, PcpEvent, PharmacySet, RuleOutcome, TaskEvent, YES_ANSWER,
    pcp_is_complete,
};
pub use status::{TaskStatusEvent, TaskStatusLog, TaskStatusName, current_status};
pub use summary::{
    StatusNoteMetadata, TaskLabel, pending_task_text, sms_task_name, status_note,
};
pub use task::{NewTask, PersistedTaskData, Task, TaskType};
pub use typed::{
    CompanionTask, ConsentsTask, DefaultPharmacyTask, IdentificationImageTask,
    InsuranceImageTask, MedicationHistoryConsentTask, PcpTask, TaskHeader, TypedTask,
};
