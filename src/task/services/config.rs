//! Configuration for the task service.

use crate::task::domain::{CompletionRequirements, InsurancePriority};
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Tunables for [`super::TaskService`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskServiceConfig {
    /// Attempts made by `apply_event` before a metadata conflict is surfaced.
    pub max_conflict_attempts: u32,
    /// Insurance priorities that must be COMPLETED for the insurance task to
    /// complete. Empty means every recorded priority.
    pub required_insurance_priorities: BTreeSet<InsurancePriority>,
}

impl Default for TaskServiceConfig {
    fn default() -> Self {
        Self {
            max_conflict_attempts: 3,
            required_insurance_priorities: BTreeSet::from([InsurancePriority::PRIMARY]),
        }
    }
}

/// Errors raised while loading a [`TaskServiceConfig`].
#[derive(Debug, Error)]
pub enum TaskServiceConfigError {
    /// The document is not valid configuration JSON.
    #[error("invalid task service configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// `max_conflict_attempts` was zero.
    #[error("max_conflict_attempts must be at least 1")]
    ZeroConflictAttempts,
}

impl TaskServiceConfig {
    /// Requires both primary and secondary insurance cards.
    #[must_use]
    pub fn primary_and_secondary_insurance() -> Self {
        Self {
            required_insurance_priorities: BTreeSet::from([
                InsurancePriority::PRIMARY,
                InsurancePriority::SECONDARY,
            ]),
            ..Default::default()
        }
    }

    /// Sets the conflict attempt budget.
    #[must_use]
    pub const fn with_max_conflict_attempts(mut self, attempts: u32) -> Self {
        self.max_conflict_attempts = attempts;
        self
    }

    /// Loads configuration from a JSON document. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceConfigError`] when the JSON is malformed or the
    /// attempt budget is zero.
    pub fn from_json_str(json: &str) -> Result<Self, TaskServiceConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceConfigError::ZeroConflictAttempts`] when the
    /// attempt budget is zero.
    pub fn validate(self) -> Result<Self, TaskServiceConfigError> {
        if self.max_conflict_attempts == 0 {
            return Err(TaskServiceConfigError::ZeroConflictAttempts);
        }
        Ok(self)
    }

    /// Requirements applied by `apply_event` when the caller supplies none.
    #[must_use]
    pub fn default_requirements(&self) -> CompletionRequirements {
        CompletionRequirements::default()
            .with_insurance_priorities(self.required_insurance_priorities.iter().copied())
    }
}
