//! Onboarding record data model and its flat wire encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::registry::{DocumentKind, SectionId, SectionRegistry};
use crate::error::ServiceError;

/// Review status of a single section.
///
/// Lifecycle: PENDING → SUBMITTED → {APPROVED | REJECTED}, REJECTED →
/// SUBMITTED on resubmission. APPROVED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionStatus {
    #[default]
    Pending,
    Submitted,
    Rejected,
    Approved,
}

impl SectionStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SectionStatus) -> bool {
        use SectionStatus::*;
        matches!(
            (self, target),
            (Pending, Submitted)
                | (Submitted, Submitted)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Rejected, Submitted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Submitted => "SUBMITTED",
            Self::Rejected => "REJECTED",
            Self::Approved => "APPROVED",
        };
        write!(f, "{s}")
    }
}

/// Per-section state as last seen from the server (or provisionally patched).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionState {
    pub status: SectionStatus,
    /// Reviewer feedback; only present after a rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// One entry per document slot of the section; `None` = not uploaded.
    #[serde(default)]
    pub document_urls: BTreeMap<DocumentKind, Option<String>>,
    /// Current form values, keyed by record field name.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl SectionState {
    pub fn document_url(&self, kind: DocumentKind) -> Option<&str> {
        self.document_urls.get(&kind).and_then(|u| u.as_deref())
    }
}

/// The subject's onboarding record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingRecord {
    sections: BTreeMap<SectionId, SectionState>,
    completion_percent: u8,
}

impl OnboardingRecord {
    /// A freshly created record: every section PENDING with empty fields.
    pub fn new(registry: &SectionRegistry) -> Self {
        let sections = registry
            .list_sections()
            .iter()
            .map(|spec| {
                let state = SectionState {
                    document_urls: spec.document_slots.iter().map(|k| (*k, None)).collect(),
                    ..Default::default()
                };
                (spec.id, state)
            })
            .collect();
        Self {
            sections,
            completion_percent: 0,
        }
    }

    pub fn section(&self, id: SectionId) -> Option<&SectionState> {
        self.sections.get(&id)
    }

    pub fn section_mut(&mut self, id: SectionId) -> Option<&mut SectionState> {
        self.sections.get_mut(&id)
    }

    /// Status of a section; sections missing from the record count as PENDING.
    pub fn status(&self, id: SectionId) -> SectionStatus {
        self.sections.get(&id).map(|s| s.status).unwrap_or_default()
    }

    pub fn sections(&self) -> impl Iterator<Item = (SectionId, &SectionState)> {
        self.sections.iter().map(|(id, s)| (*id, s))
    }

    pub fn completion_percent(&self) -> u8 {
        self.completion_percent
    }

    /// Completion percent, clamped to `0..=100`.
    pub fn set_completion_percent(&mut self, percent: u8) {
        self.completion_percent = percent.min(100);
    }

    /// Derived from the percent, so the two can never disagree.
    pub fn is_complete(&self) -> bool {
        self.completion_percent == 100
    }

    /// Decode the flat wire record using `registry`'s field names.
    pub fn from_wire(value: &Value, registry: &SectionRegistry) -> Result<Self, ServiceError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ServiceError::InvalidResponse("record is not a JSON object".into()))?;

        let mut record = Self::new(registry);
        for spec in registry.list_sections() {
            let state = record
                .sections
                .entry(spec.id)
                .or_insert_with(SectionState::default);

            state.status = match obj.get(spec.status_field) {
                None | Some(Value::Null) => SectionStatus::Pending,
                Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                    ServiceError::InvalidResponse(format!("{}: {e}", spec.status_field))
                })?,
            };
            state.feedback = obj
                .get(spec.feedback_field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from);

            for field in spec.fields {
                if let Some(v) = obj.get(field.name).and_then(scalar_to_string) {
                    state.values.insert(field.name.to_string(), v);
                }
            }
            for kind in spec.document_slots {
                let url = obj
                    .get(kind.url_field())
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from);
                state.document_urls.insert(*kind, url);
            }
        }

        let percent = match obj.get("completionPercent") {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_u64().ok_or_else(|| {
                ServiceError::InvalidResponse(format!("completionPercent: expected integer, got {v}"))
            })?,
        };
        if percent > 100 {
            tracing::warn!(percent, "completionPercent above 100, clamping");
        }
        record.completion_percent = percent.min(100) as u8;

        if let Some(flag) = obj.get("isComplete").and_then(Value::as_bool) {
            if flag != record.is_complete() {
                tracing::warn!(
                    is_complete = flag,
                    percent = record.completion_percent,
                    "isComplete disagrees with completionPercent, trusting the percent"
                );
            }
        }

        Ok(record)
    }

    /// Encode back into the flat wire shape.
    pub fn to_wire(&self, registry: &SectionRegistry) -> Value {
        let mut obj = Map::new();
        for spec in registry.list_sections() {
            let state = self.sections.get(&spec.id).cloned().unwrap_or_default();
            obj.insert(spec.status_field.into(), Value::String(state.status.to_string()));
            obj.insert(
                spec.feedback_field.into(),
                state.feedback.map(Value::String).unwrap_or(Value::Null),
            );
            for field in spec.fields {
                if let Some(v) = state.values.get(field.name) {
                    obj.insert(field.name.into(), Value::String(v.clone()));
                }
            }
            for kind in spec.document_slots {
                let url = state.document_urls.get(kind).cloned().flatten();
                obj.insert(
                    kind.url_field().into(),
                    url.map(Value::String).unwrap_or(Value::Null),
                );
            }
        }
        obj.insert("completionPercent".into(), Value::from(self.completion_percent));
        obj.insert("isComplete".into(), Value::Bool(self.is_complete()));
        Value::Object(obj)
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Stand-in for the server's completion formula, used by the in-memory
/// service and tests: equal weight per section, SUBMITTED and APPROVED earn
/// full credit, rounded down.
pub fn placeholder_completion_percent(record: &OnboardingRecord, registry: &SectionRegistry) -> u8 {
    if registry.is_empty() {
        return 0;
    }
    let credited = registry
        .ids()
        .filter(|id| {
            matches!(
                record.status(*id),
                SectionStatus::Submitted | SectionStatus::Approved
            )
        })
        .count();
    (credited * 100 / registry.len()) as u8
}
