//! Patient- and operator-facing summaries over a link's tasks.

use super::{CompanionTask, TaskStatusName, TaskType};
use serde::Serialize;

/// Label shown on the care-request timeline note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskLabel {
    /// Identification image.
    #[serde(rename = "ID")]
    Id,
    /// Insurance card images.
    Insurance,
    /// Primary care provider.
    #[serde(rename = "PCP")]
    Pcp,
    /// Default pharmacy.
    Pharmacy,
}

impl TaskLabel {
    /// Returns the label for task types shown on the timeline note.
    #[must_use]
    pub const fn for_task_type(task_type: TaskType) -> Option<Self> {
        match task_type {
            TaskType::IdentificationImage => Some(Self::Id),
            TaskType::InsuranceCardImages => Some(Self::Insurance),
            TaskType::PrimaryCareProvider => Some(Self::Pcp),
            TaskType::DefaultPharmacy => Some(Self::Pharmacy),
            TaskType::ConsentMedicationHistoryAuthority | TaskType::Consents => None,
        }
    }

    /// Returns the display text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Insurance => "Insurance",
            Self::Pcp => "PCP",
            Self::Pharmacy => "Pharmacy",
        }
    }
}

/// Metadata attached to the companion note on the care-request timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNoteMetadata {
    /// Labels of the displayed tasks.
    pub companion_tasks: Vec<TaskLabel>,
    /// Labels of displayed tasks that have been completed.
    pub complete_companion_tasks: Vec<TaskLabel>,
}

/// Builds timeline note metadata for the `displayed` task types.
///
/// Types without a timeline label are ignored, and repeated types are listed
/// once in first-seen order.
#[must_use]
pub fn status_note(tasks: &[CompanionTask], displayed: &[TaskType]) -> StatusNoteMetadata {
    let mut shown: Vec<(TaskType, TaskLabel)> = Vec::new();
    for task_type in displayed {
        let Some(label) = TaskLabel::for_task_type(*task_type) else {
            continue;
        };
        if shown.iter().all(|(seen, _)| seen != task_type) {
            shown.push((*task_type, label));
        }
    }

    let complete_companion_tasks = tasks
        .iter()
        .filter(|task| task.header().statuses.has_ever_been(TaskStatusName::Completed))
        .filter_map(|task| {
            shown
                .iter()
                .find(|(task_type, _)| *task_type == task.task_type())
                .map(|(_, label)| *label)
        })
        .collect();

    StatusNoteMetadata {
        companion_tasks: shown.into_iter().map(|(_, label)| label).collect(),
        complete_companion_tasks,
    }
}

/// Returns the noun used for a task in patient SMS text.
#[must_use]
pub const fn sms_task_name(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::IdentificationImage => "ID",
        TaskType::InsuranceCardImages => "insurance card",
        TaskType::DefaultPharmacy => "pharmacy",
        TaskType::PrimaryCareProvider => "primary care provider",
        TaskType::ConsentMedicationHistoryAuthority => "medications",
        TaskType::Consents => "consents",
    }
}

const PENDING_SCAN_LIMIT: usize = 3;
const MANY_PENDING_TEXT: &str = "required information";

/// Renders the pending-task phrase for the on-route SMS.
///
/// At most three unfinished tasks are considered, in order. Only one of the
/// two consent task types is in use at a time, chosen by
/// `consents_module_enabled`; the other is dropped.
#[must_use]
pub fn pending_task_text(tasks: &[CompanionTask], consents_module_enabled: bool) -> String {
    let unused_consent_type = if consents_module_enabled {
        TaskType::ConsentMedicationHistoryAuthority
    } else {
        TaskType::Consents
    };

    let pending: Vec<TaskType> = tasks
        .iter()
        .filter(|task| task.current_status() != TaskStatusName::Completed)
        .map(CompanionTask::task_type)
        .take(PENDING_SCAN_LIMIT)
        .filter(|task_type| *task_type != unused_consent_type)
        .collect();

    match pending.as_slice() {
        [] => String::new(),
        [only] => sms_task_name(*only).to_owned(),
        [first, second] => format!("{} and {}", sms_task_name(*first), sms_task_name(*second)),
        _ => MANY_PENDING_TEXT.to_owned(),
    }
}
