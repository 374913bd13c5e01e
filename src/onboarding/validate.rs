//! Local form validation, run before anything is sent to the service.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::registry::{FieldKind, SectionSpec};
use super::service::SectionForm;
use crate::error::WorkflowError;

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,15}$").expect("phone pattern"));

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19|20)[0-9]{2}$").expect("year pattern"));

/// Check `form` against the section's field list.
///
/// Fails on the first problem found: unknown fields, then fields in
/// registry order (missing required values, then malformed values).
pub fn validate_form(spec: &SectionSpec, form: &SectionForm) -> Result<(), WorkflowError> {
    let invalid = |field: &str, reason: &str| WorkflowError::Validation {
        section: spec.id,
        field: field.to_string(),
        reason: reason.to_string(),
    };

    if let Some(unknown) = form.keys().find(|k| spec.field(k).is_none()) {
        return Err(invalid(unknown, "is not a field of this section"));
    }

    for field in spec.fields {
        let value = form.get(field.name).map(|v| v.trim()).unwrap_or("");
        if value.is_empty() {
            if field.required {
                return Err(invalid(field.name, "is required"));
            }
            continue;
        }
        let ok = match field.kind {
            FieldKind::Text => true,
            FieldKind::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
            FieldKind::Phone => PHONE.is_match(value),
            FieldKind::Year => YEAR.is_match(value),
        };
        if !ok {
            let reason = match field.kind {
                FieldKind::Date => "must be a date (YYYY-MM-DD)",
                FieldKind::Phone => "must be a phone number",
                FieldKind::Year => "must be a four-digit year",
                FieldKind::Text => "is invalid",
            };
            return Err(invalid(field.name, reason));
        }
    }
    Ok(())
}
