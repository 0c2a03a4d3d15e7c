//! Caller-decided completion policy for insurance and consents tasks.

use super::{
    ConsentDefinitionId, ConsentsMetadata, InsuranceImageMetadata, InsurancePriority,
    TaskStatusName,
};
use std::collections::BTreeSet;

/// Requirements a caller imposes on tasks whose rules do not decide
/// completion themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRequirements {
    /// Priorities whose card status must be COMPLETED.
    ///
    /// An empty set means every recorded priority must be COMPLETED.
    pub insurance_priorities: BTreeSet<InsurancePriority>,
    /// Consent definitions that must all be signed.
    ///
    /// An empty set never completes the consents task.
    pub consent_definition_ids: BTreeSet<ConsentDefinitionId>,
}

impl CompletionRequirements {
    /// Requires the given insurance priorities.
    #[must_use]
    pub fn with_insurance_priorities(
        mut self,
        priorities: impl IntoIterator<Item = InsurancePriority>,
    ) -> Self {
        self.insurance_priorities = priorities.into_iter().collect();
        self
    }

    /// Requires the given consent definitions.
    #[must_use]
    pub fn with_consent_definitions(
        mut self,
        definition_ids: impl IntoIterator<Item = ConsentDefinitionId>,
    ) -> Self {
        self.consent_definition_ids = definition_ids.into_iter().collect();
        self
    }

    /// Returns whether insurance metadata meets the priority requirement.
    #[must_use]
    pub fn insurance_satisfied_by(&self, metadata: &InsuranceImageMetadata) -> bool {
        if self.insurance_priorities.is_empty() {
            return !metadata.insurance_statuses.is_empty()
                && metadata
                    .insurance_statuses
                    .values()
                    .all(|status| *status == TaskStatusName::Completed);
        }
        self.insurance_priorities
            .iter()
            .all(|priority| metadata.status_for(*priority) == Some(TaskStatusName::Completed))
    }

    /// Returns whether every required consent definition has been signed.
    #[must_use]
    pub fn consents_satisfied_by(&self, metadata: &ConsentsMetadata) -> bool {
        !self.consent_definition_ids.is_empty()
            && self
                .consent_definition_ids
                .iter()
                .all(|definition_id| metadata.contains(*definition_id))
    }
}

/// Summarises per-priority insurance statuses into one status.
///
/// No recorded priorities, or all COMPLETED, yields COMPLETED; all
/// NOT_STARTED yields NOT_STARTED; any mix yields STARTED.
#[must_use]
pub fn overall_insurance_status(metadata: &InsuranceImageMetadata) -> TaskStatusName {
    let mut statuses = metadata.insurance_statuses.values();
    if statuses.clone().all(|status| *status == TaskStatusName::Completed) {
        TaskStatusName::Completed
    } else if statuses.all(|status| *status == TaskStatusName::NotStarted) {
        TaskStatusName::NotStarted
    } else {
        TaskStatusName::Started
    }
}
