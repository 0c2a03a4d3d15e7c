//! Strongly-typed metadata variants, one per task type.

use super::{ConsentDefinitionId, InsurancePriority, TaskStatusName};
use std::collections::BTreeMap;
use std::fmt;

/// Identification upload carries no structured metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentificationImageMetadata;

/// Default pharmacy selection carries no structured metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultPharmacyMetadata;

/// Medication history consent carries no structured metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MedicationHistoryConsentMetadata;

/// Per-priority insurance card status.
///
/// Only priorities that have been touched appear in the map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsuranceImageMetadata {
    /// Status by insurance priority.
    pub insurance_statuses: BTreeMap<InsurancePriority, TaskStatusName>,
}

impl InsuranceImageMetadata {
    /// Returns the recorded status for `priority`, if any.
    #[must_use]
    pub fn status_for(&self, priority: InsurancePriority) -> Option<TaskStatusName> {
        self.insurance_statuses.get(&priority).copied()
    }
}

/// Social-history questions that feed the primary care provider task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionTag {
    /// "Do you have a primary care provider?"
    HasPcp,
    /// "Have you seen your primary care provider recently?"
    HasSeenPcpRecently,
}

impl QuestionTag {
    /// Both tags, in storage order.
    pub const ALL: [Self; 2] = [Self::HasPcp, Self::HasSeenPcpRecently];

    /// Returns the canonical storage key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HasPcp => "HAS_PCP",
            Self::HasSeenPcpRecently => "HAS_SEEN_PCP_RECENTLY",
        }
    }

    /// Parses a social-history question tag.
    ///
    /// Returns `None` for tags that do not affect the primary care provider
    /// task.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == value.trim())
    }
}

impl fmt::Display for QuestionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Social-history answers recorded on the primary care provider task.
///
/// Both keys are always present in the narrowed view; `None` means the
/// question has not been answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocialHistoryResponses {
    /// Answer to [`QuestionTag::HasPcp`].
    pub has_pcp: Option<bool>,
    /// Answer to [`QuestionTag::HasSeenPcpRecently`].
    pub has_seen_pcp_recently: Option<bool>,
}

impl SocialHistoryResponses {
    /// Returns the answer recorded for `tag`.
    #[must_use]
    pub const fn get(&self, tag: QuestionTag) -> Option<bool> {
        match tag {
            QuestionTag::HasPcp => self.has_pcp,
            QuestionTag::HasSeenPcpRecently => self.has_seen_pcp_recently,
        }
    }

    /// Records `value` as the answer for `tag`.
    pub const fn set(&mut self, tag: QuestionTag, value: bool) {
        match tag {
            QuestionTag::HasPcp => self.has_pcp = Some(value),
            QuestionTag::HasSeenPcpRecently => self.has_seen_pcp_recently = Some(value),
        }
    }
}

/// Primary care provider task metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcpMetadata {
    /// Clinical provider chosen directly by the patient.
    pub clinical_provider_id: Option<String>,
    /// Social-history answers collected so far.
    pub social_history_responses: SocialHistoryResponses,
}

impl PcpMetadata {
    /// Returns whether any input has been recorded on the task.
    #[must_use]
    pub const fn is_touched(&self) -> bool {
        self.clinical_provider_id.is_some()
            || self.social_history_responses.has_pcp.is_some()
            || self.social_history_responses.has_seen_pcp_recently.is_some()
    }
}

/// Consents task metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentsMetadata {
    /// Signed consent definitions in signing order.
    pub completed_definition_ids: Vec<ConsentDefinitionId>,
}

impl ConsentsMetadata {
    /// Returns whether `definition_id` has been signed.
    #[must_use]
    pub fn contains(&self, definition_id: ConsentDefinitionId) -> bool {
        self.completed_definition_ids.contains(&definition_id)
    }
}
