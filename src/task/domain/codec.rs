//! Narrowing between raw JSON task metadata and typed metadata variants.
//!
//! Stored metadata is untyped JSON. Each [`TaskVariant`] validates the stored
//! shape field by field and reports the offending path, so a corrupt row is
//! diagnosable instead of silently degrading. `encode` is the structural
//! inverse of `decode` for every well-formed value.

use super::{
    ConsentDefinitionId, ConsentsMetadata, DefaultPharmacyMetadata, IdentificationImageMetadata,
    InsuranceImageMetadata, InsurancePriority, MedicationHistoryConsentMetadata, PcpMetadata,
    QuestionTag, SocialHistoryResponses, TaskMetadataError, TaskStatusName, TaskType,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const INSURANCE_STATUSES_KEY: &str = "insuranceStatuses";
const CLINICAL_PROVIDER_ID_KEY: &str = "clinicalProviderId";
const SOCIAL_HISTORY_RESPONSES_KEY: &str = "socialHistoryResponses";
const COMPLETED_DEFINITION_IDS_KEY: &str = "completedDefinitionIds";
const ROOT_PATH: &str = "metadata";

/// Typed metadata shape bound to exactly one [`TaskType`].
pub trait TaskVariant: Sized + Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Task type whose rows this variant decodes.
    const TASK_TYPE: TaskType;

    /// Validates and narrows a raw stored payload.
    ///
    /// # Errors
    ///
    /// Returns [`TaskMetadataError::InvalidMetadata`] naming the offending
    /// field when the payload does not have the required shape.
    fn decode_metadata(raw: Option<&Value>) -> Result<Self, TaskMetadataError>;

    /// Encodes the variant back into its stored JSON shape.
    fn encode_metadata(&self) -> Option<Value>;
}

/// Encodes typed metadata into its stored representation.
#[must_use]
pub fn encode<M: TaskVariant>(metadata: &M) -> Option<Value> {
    metadata.encode_metadata()
}

/// Checks a stored type tag against the variant requested by the caller.
///
/// # Errors
///
/// Returns [`TaskMetadataError::WrongTaskType`] on mismatch.
pub fn ensure_task_type<M: TaskVariant>(actual: TaskType) -> Result<(), TaskMetadataError> {
    if actual == M::TASK_TYPE {
        Ok(())
    } else {
        Err(TaskMetadataError::WrongTaskType {
            expected: M::TASK_TYPE,
            actual,
        })
    }
}

fn expect_null(task_type: TaskType, raw: Option<&Value>) -> Result<(), TaskMetadataError> {
    match raw {
        None | Some(Value::Null) => Ok(()),
        Some(other) => Err(TaskMetadataError::invalid(
            task_type,
            ROOT_PATH,
            format!("expected null, found {}", json_kind(other)),
        )),
    }
}

fn expect_object<'a>(
    task_type: TaskType,
    path: &str,
    raw: Option<&'a Value>,
) -> Result<&'a Map<String, Value>, TaskMetadataError> {
    match raw {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(TaskMetadataError::invalid(
            task_type,
            path,
            format!("expected an object, found {}", json_kind(other)),
        )),
        None => Err(TaskMetadataError::invalid(
            task_type,
            path,
            "missing required object",
        )),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

macro_rules! unit_variant {
    ($metadata:ty, $task_type:expr) => {
        impl TaskVariant for $metadata {
            const TASK_TYPE: TaskType = $task_type;

            fn decode_metadata(raw: Option<&Value>) -> Result<Self, TaskMetadataError> {
                expect_null(Self::TASK_TYPE, raw)?;
                Ok(Self)
            }

            fn encode_metadata(&self) -> Option<Value> {
                None
            }
        }
    };
}

unit_variant!(IdentificationImageMetadata, TaskType::IdentificationImage);
unit_variant!(DefaultPharmacyMetadata, TaskType::DefaultPharmacy);
unit_variant!(
    MedicationHistoryConsentMetadata,
    TaskType::ConsentMedicationHistoryAuthority
);

impl TaskVariant for InsuranceImageMetadata {
    const TASK_TYPE: TaskType = TaskType::InsuranceCardImages;

    fn decode_metadata(raw: Option<&Value>) -> Result<Self, TaskMetadataError> {
        let root = expect_object(Self::TASK_TYPE, ROOT_PATH, raw)?;
        let statuses = expect_object(
            Self::TASK_TYPE,
            INSURANCE_STATUSES_KEY,
            root.get(INSURANCE_STATUSES_KEY),
        )?;

        let mut insurance_statuses = BTreeMap::new();
        for (key, value) in statuses {
            let path = format!("{INSURANCE_STATUSES_KEY}.{key}");
            let priority = InsurancePriority::try_from(key.as_str())
                .map_err(|err| TaskMetadataError::invalid(Self::TASK_TYPE, &path, err.to_string()))?;
            let status = match value {
                // Blank entries mean the priority was never touched.
                Value::Null => continue,
                Value::String(name) if name.is_empty() => continue,
                Value::String(name) => TaskStatusName::try_from(name.as_str()).map_err(|err| {
                    TaskMetadataError::invalid(Self::TASK_TYPE, &path, err.to_string())
                })?,
                other => {
                    return Err(TaskMetadataError::invalid(
                        Self::TASK_TYPE,
                        &path,
                        format!("expected a status name, found {}", json_kind(other)),
                    ));
                }
            };
            insurance_statuses.insert(priority, status);
        }

        Ok(Self { insurance_statuses })
    }

    fn encode_metadata(&self) -> Option<Value> {
        let statuses: Map<String, Value> = self
            .insurance_statuses
            .iter()
            .map(|(priority, status)| (priority.to_string(), Value::from(status.as_str())))
            .collect();
        let mut root = Map::new();
        root.insert(INSURANCE_STATUSES_KEY.to_owned(), Value::Object(statuses));
        Some(Value::Object(root))
    }
}

impl TaskVariant for PcpMetadata {
    const TASK_TYPE: TaskType = TaskType::PrimaryCareProvider;

    fn decode_metadata(raw: Option<&Value>) -> Result<Self, TaskMetadataError> {
        // Tasks provisioned before social-history tracking store null.
        if matches!(raw, None | Some(Value::Null)) {
            return Ok(Self::default());
        }

        let root = expect_object(Self::TASK_TYPE, ROOT_PATH, raw)?;
        let clinical_provider_id = match root.get(CLINICAL_PROVIDER_ID_KEY) {
            None => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(other) => {
                return Err(TaskMetadataError::invalid(
                    Self::TASK_TYPE,
                    CLINICAL_PROVIDER_ID_KEY,
                    format!("expected a string, found {}", json_kind(other)),
                ));
            }
        };

        let responses = expect_object(
            Self::TASK_TYPE,
            SOCIAL_HISTORY_RESPONSES_KEY,
            root.get(SOCIAL_HISTORY_RESPONSES_KEY),
        )?;
        let mut social_history_responses = SocialHistoryResponses::default();
        for tag in QuestionTag::ALL {
            match responses.get(tag.as_str()) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(answer)) => social_history_responses.set(tag, *answer),
                Some(other) => {
                    return Err(TaskMetadataError::invalid(
                        Self::TASK_TYPE,
                        format!("{SOCIAL_HISTORY_RESPONSES_KEY}.{tag}"),
                        format!("expected a boolean, found {}", json_kind(other)),
                    ));
                }
            }
        }

        Ok(Self {
            clinical_provider_id,
            social_history_responses,
        })
    }

    fn encode_metadata(&self) -> Option<Value> {
        let mut responses = Map::new();
        for tag in QuestionTag::ALL {
            if let Some(answer) = self.social_history_responses.get(tag) {
                responses.insert(tag.as_str().to_owned(), Value::Bool(answer));
            }
        }

        let mut root = Map::new();
        if let Some(id) = &self.clinical_provider_id {
            root.insert(CLINICAL_PROVIDER_ID_KEY.to_owned(), Value::from(id.as_str()));
        }
        root.insert(
            SOCIAL_HISTORY_RESPONSES_KEY.to_owned(),
            Value::Object(responses),
        );
        Some(Value::Object(root))
    }
}

impl TaskVariant for ConsentsMetadata {
    const TASK_TYPE: TaskType = TaskType::Consents;

    fn decode_metadata(raw: Option<&Value>) -> Result<Self, TaskMetadataError> {
        let root = expect_object(Self::TASK_TYPE, ROOT_PATH, raw)?;
        let entries = match root.get(COMPLETED_DEFINITION_IDS_KEY) {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(TaskMetadataError::invalid(
                    Self::TASK_TYPE,
                    COMPLETED_DEFINITION_IDS_KEY,
                    format!("expected an array, found {}", json_kind(other)),
                ));
            }
            None => {
                return Err(TaskMetadataError::invalid(
                    Self::TASK_TYPE,
                    COMPLETED_DEFINITION_IDS_KEY,
                    "missing required array",
                ));
            }
        };

        let completed_definition_ids = entries
            .iter()
            .filter_map(|entry| {
                let parsed = definition_id_from_json(entry);
                if parsed.is_none() && !entry.is_null() {
                    tracing::warn!(
                        entry = %entry,
                        "dropping non-numeric value from consents task metadata"
                    );
                }
                parsed
            })
            .collect();

        Ok(Self {
            completed_definition_ids,
        })
    }

    fn encode_metadata(&self) -> Option<Value> {
        let ids = self
            .completed_definition_ids
            .iter()
            .map(|id| Value::from(id.value()))
            .collect();
        let mut root = Map::new();
        root.insert(COMPLETED_DEFINITION_IDS_KEY.to_owned(), Value::Array(ids));
        Some(Value::Object(root))
    }
}

fn definition_id_from_json(entry: &Value) -> Option<ConsentDefinitionId> {
    let parsed = match entry {
        Value::String(text) => parse_int_prefix(text),
        Value::Number(number) => parse_int_prefix(&number.to_string()),
        _ => None,
    };
    parsed.map(ConsentDefinitionId::new)
}

/// Parses a base-10 integer from the start of `text`.
///
/// Leading whitespace and a single sign are accepted and parsing stops at the
/// first non-digit, so `"12abc"` yields 12 and `"1.5"` yields 1. Returns
/// `None` when no digits lead the string or the value overflows `i64`.
#[must_use]
pub fn parse_int_prefix(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let unsigned = trimmed
        .strip_prefix(['-', '+'])
        .unwrap_or(trimmed);
    let sign_len = trimmed.len().saturating_sub(unsigned.len());
    let digit_count = unsigned
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if digit_count == 0 {
        return None;
    }
    trimmed
        .get(..sign_len.saturating_add(digit_count))?
        .parse::<i64>()
        .ok()
}
