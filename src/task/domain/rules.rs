//! Completion rules: pure functions from (metadata, event) to the next
//! metadata and a completion flag.

use super::{
    CompletionRequirements, ConsentDefinitionId, ConsentsMetadata, DefaultPharmacyMetadata,
    IdentificationImageMetadata, InsuranceImageMetadata, InsurancePriority,
    MedicationHistoryConsentMetadata, PcpMetadata, QuestionTag, TaskStatusName, TaskType,
    TaskVariant,
};

/// Social-history answer value that counts as "yes".
pub const YES_ANSWER: &str = "Y";

/// Result of applying one event to one task's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome<M> {
    /// Metadata after the event.
    pub next: M,
    /// Whether the rule alone considers the task complete.
    pub should_complete: bool,
}

impl<M> RuleOutcome<M> {
    const fn new(next: M, should_complete: bool) -> Self {
        Self {
            next,
            should_complete,
        }
    }
}

/// Completion rule for one task variant.
pub trait CompletionRule: TaskVariant {
    /// Domain event accepted by this rule.
    type Event: Clone + Send + Sync;

    /// Applies `event` to the current metadata.
    fn apply(&self, event: &Self::Event) -> RuleOutcome<Self>;

    /// Returns whether the metadata satisfies caller-supplied requirements.
    ///
    /// Variants whose completion is decided by the rule itself never consult
    /// requirements.
    fn satisfies(&self, _requirements: &CompletionRequirements) -> bool {
        false
    }
}

/// The identification image was uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentificationUploaded;

/// The default pharmacy was set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PharmacySet;

/// The medication history consent was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedicationHistoryConsentApplied;

/// An insurance card image pair was uploaded for `priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsuranceImageUploaded {
    /// Insurance priority the images belong to.
    pub priority: InsurancePriority,
}

/// A consent definition was signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentSigned {
    /// Signed definition.
    pub definition_id: ConsentDefinitionId,
}

/// Events accepted by the primary care provider rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcpEvent {
    /// The patient picked a provider directly.
    Selected {
        /// Chosen clinical provider.
        clinical_provider_id: String,
    },
    /// A PCP-related social-history question was answered.
    SocialHistoryAnswered {
        /// Question that was answered.
        question_tag: QuestionTag,
        /// Boolean answer.
        value: bool,
    },
}

macro_rules! single_event_rule {
    ($metadata:ty, $event:ty) => {
        impl CompletionRule for $metadata {
            type Event = $event;

            fn apply(&self, _event: &Self::Event) -> RuleOutcome<Self> {
                RuleOutcome::new(*self, true)
            }
        }
    };
}

single_event_rule!(IdentificationImageMetadata, IdentificationUploaded);
single_event_rule!(DefaultPharmacyMetadata, PharmacySet);
single_event_rule!(MedicationHistoryConsentMetadata, MedicationHistoryConsentApplied);

impl CompletionRule for PcpMetadata {
    type Event = PcpEvent;

    fn apply(&self, event: &Self::Event) -> RuleOutcome<Self> {
        let mut next = self.clone();
        match event {
            PcpEvent::Selected {
                clinical_provider_id,
            } => next.clinical_provider_id = Some(clinical_provider_id.clone()),
            PcpEvent::SocialHistoryAnswered {
                question_tag,
                value,
            } => next.social_history_responses.set(*question_tag, *value),
        }
        let should_complete = pcp_is_complete(&next);
        RuleOutcome::new(next, should_complete)
    }
}

/// Returns whether PCP metadata resolves the task.
///
/// A direct provider selection always completes. Otherwise the patient must
/// have answered "no PCP", or answered "has PCP" together with the
/// recent-visit question in either order.
#[must_use]
pub const fn pcp_is_complete(metadata: &PcpMetadata) -> bool {
    if metadata.clinical_provider_id.is_some() {
        return true;
    }
    let responses = &metadata.social_history_responses;
    match responses.has_pcp {
        Some(false) => true,
        Some(true) => responses.has_seen_pcp_recently.is_some(),
        None => false,
    }
}

impl CompletionRule for InsuranceImageMetadata {
    type Event = InsuranceImageUploaded;

    fn apply(&self, event: &Self::Event) -> RuleOutcome<Self> {
        let mut next = self.clone();
        next.insurance_statuses
            .insert(event.priority, TaskStatusName::Completed);
        RuleOutcome::new(next, false)
    }

    fn satisfies(&self, requirements: &CompletionRequirements) -> bool {
        requirements.insurance_satisfied_by(self)
    }
}

impl CompletionRule for ConsentsMetadata {
    type Event = ConsentSigned;

    fn apply(&self, event: &Self::Event) -> RuleOutcome<Self> {
        let mut next = self.clone();
        if !next.contains(event.definition_id) {
            next.completed_definition_ids.push(event.definition_id);
        }
        RuleOutcome::new(next, false)
    }

    fn satisfies(&self, requirements: &CompletionRequirements) -> bool {
        requirements.consents_satisfied_by(self)
    }
}

/// Domain events emitted by feature controllers, routed to one task type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Identification image uploaded.
    IdentificationUploaded,
    /// Insurance card images uploaded for one priority.
    InsuranceImageUploaded {
        /// Insurance priority.
        priority: InsurancePriority,
    },
    /// Default pharmacy set.
    PharmacySet,
    /// Primary care provider selected directly.
    PcpSelected {
        /// Chosen clinical provider.
        clinical_provider_id: String,
    },
    /// PCP-related social-history question answered.
    SocialHistoryAnswered {
        /// Question that was answered.
        question_tag: QuestionTag,
        /// Boolean answer.
        value: bool,
    },
    /// Medication history consent applied.
    MedicationHistoryConsentApplied,
    /// Consent definition signed.
    ConsentSigned {
        /// Signed definition.
        definition_id: ConsentDefinitionId,
    },
}

impl TaskEvent {
    /// Builds a social-history event from a raw question tag and answer.
    ///
    /// Returns `None` for questions that do not affect any task. The answer
    /// is `true` only for [`YES_ANSWER`].
    #[must_use]
    pub fn from_social_history_answer(question_tag: &str, answer: &str) -> Option<Self> {
        QuestionTag::parse(question_tag).map(|tag| Self::SocialHistoryAnswered {
            question_tag: tag,
            value: answer == YES_ANSWER,
        })
    }

    /// Returns the task type this event is routed to.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::IdentificationUploaded => TaskType::IdentificationImage,
            Self::InsuranceImageUploaded { .. } => TaskType::InsuranceCardImages,
            Self::PharmacySet => TaskType::DefaultPharmacy,
            Self::PcpSelected { .. } | Self::SocialHistoryAnswered { .. } => {
                TaskType::PrimaryCareProvider
            }
            Self::MedicationHistoryConsentApplied => TaskType::ConsentMedicationHistoryAuthority,
            Self::ConsentSigned { .. } => TaskType::Consents,
        }
    }
}
