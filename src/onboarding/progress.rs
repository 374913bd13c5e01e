//! Progress state: the client's snapshot of the onboarding record.
//!
//! Two update modes: [`ProgressState::replace`] swaps in a freshly fetched
//! record, [`ProgressState::apply_patch`] merges a provisional change in
//! place. The next replace always wins over earlier patches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::{OnboardingRecord, SectionStatus};
use super::registry::{DocumentKind, SectionId, SectionRegistry};
use super::resume;
use crate::error::WorkflowError;

/// Partial update for one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPatch {
    pub status: Option<SectionStatus>,
    /// `Some(None)` clears the feedback.
    pub feedback: Option<Option<String>>,
    pub document_urls: BTreeMap<DocumentKind, Option<String>>,
    pub values: BTreeMap<String, String>,
    pub completion_percent: Option<u8>,
}

impl SectionPatch {
    pub fn with_status(mut self, status: SectionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_document(mut self, kind: DocumentKind, url: impl Into<String>) -> Self {
        self.document_urls.insert(kind, Some(url.into()));
        self
    }

    pub fn with_completion(mut self, percent: Option<u8>) -> Self {
        self.completion_percent = percent;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProgressState {
    registry: SectionRegistry,
    record: Option<OnboardingRecord>,
    active_section: Option<SectionId>,
    page_error: Option<String>,
}

impl ProgressState {
    pub fn new(registry: SectionRegistry) -> Self {
        Self {
            registry,
            record: None,
            active_section: None,
            page_error: None,
        }
    }

    pub fn registry(&self) -> &SectionRegistry {
        &self.registry
    }

    pub fn record(&self) -> Option<&OnboardingRecord> {
        self.record.as_ref()
    }

    pub fn active_section(&self) -> Option<SectionId> {
        self.active_section
    }

    /// Page-level error from the last failed fetch.
    pub fn page_error(&self) -> Option<&str> {
        self.page_error.as_deref()
    }

    /// Replace local state with a freshly fetched record.
    ///
    /// With `preserve_section` the active section stays where it is; the
    /// resume resolver only runs when it is `false` or nothing is active yet.
    pub fn replace(&mut self, record: OnboardingRecord, preserve_section: bool) -> SectionId {
        let active = match (preserve_section, self.active_section) {
            (true, Some(current)) => current,
            _ => {
                let landing = resume::resolve(&record, &self.registry);
                info!(section = %landing, "Resolved landing section");
                landing
            }
        };
        debug!(percent = record.completion_percent(), "Record replaced");
        self.record = Some(record);
        self.active_section = Some(active);
        self.page_error = None;
        active
    }

    /// Record a failed fetch. Existing state is left untouched.
    pub fn fetch_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "Fetch failed, keeping previous state");
        self.page_error = Some(message);
    }

    /// Merge a provisional update into one section.
    pub fn apply_patch(
        &mut self,
        section: SectionId,
        patch: SectionPatch,
    ) -> Result<(), WorkflowError> {
        if !self.registry.contains(section) {
            return Err(WorkflowError::UnknownSection { section });
        }
        let record = self.record.as_mut().ok_or(WorkflowError::NotLoaded)?;

        let Some(state) = record.section_mut(section) else {
            return Err(WorkflowError::UnknownSection { section });
        };
        if let Some(status) = patch.status {
            state.status = status;
        }
        if let Some(feedback) = patch.feedback {
            state.feedback = feedback;
        }
        state.document_urls.extend(patch.document_urls);
        state.values.extend(patch.values);
        debug!(section = %section, status = %state.status, "Section patched");

        if let Some(percent) = patch.completion_percent {
            record.set_completion_percent(percent);
        }
        Ok(())
    }

    /// Move the subject to another section of this wizard.
    pub fn navigate(&mut self, section: SectionId) -> Result<(), WorkflowError> {
        if !self.registry.contains(section) {
            return Err(WorkflowError::UnknownSection { section });
        }
        self.active_section = Some(section);
        Ok(())
    }
}
