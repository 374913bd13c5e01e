//! In-memory onboarding service.
//!
//! Behaves like the external service closely enough to drive the engine
//! without a network: it persists submissions, computes completion with
//! [`placeholder_completion_percent`], and exposes the reviewer's
//! approve/reject actions.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::model::{OnboardingRecord, SectionStatus, placeholder_completion_percent};
use super::registry::{DocumentKind, SectionId, SectionRegistry};
use super::service::{DocumentUpload, OnboardingService, SectionForm, SectionUpdate, UploadFile};
use crate::error::ServiceError;

/// Service calls that can be delayed or failed on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Update,
    Upload,
    ConfirmSignature,
}

struct Inner {
    record: OnboardingRecord,
    failures: HashMap<Operation, VecDeque<ServiceError>>,
    delays: HashMap<Operation, Duration>,
    calls: HashMap<Operation, usize>,
}

pub struct InMemoryOnboardingService {
    registry: SectionRegistry,
    inner: Mutex<Inner>,
}

impl InMemoryOnboardingService {
    pub fn new(registry: SectionRegistry) -> Self {
        Self::with_record(registry, OnboardingRecord::new(&registry))
    }

    pub fn with_record(registry: SectionRegistry, record: OnboardingRecord) -> Self {
        Self {
            registry,
            inner: Mutex::new(Inner {
                record,
                failures: HashMap::new(),
                delays: HashMap::new(),
                calls: HashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &SectionRegistry {
        &self.registry
    }

    /// Current server-side record.
    pub async fn record(&self) -> OnboardingRecord {
        self.inner.lock().await.record.clone()
    }

    /// Queue a failure for the next call of `op`.
    pub async fn fail_next(&self, op: Operation, error: ServiceError) {
        self.inner
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Delay every call of `op` by `delay` before it is handled.
    pub async fn set_delay(&self, op: Operation, delay: Duration) {
        self.inner.lock().await.delays.insert(op, delay);
    }

    /// Number of calls of `op` received so far.
    pub async fn calls(&self, op: Operation) -> usize {
        self.inner.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Reviewer approves a submitted section.
    pub async fn approve(&self, section: SectionId) -> Result<(), ServiceError> {
        self.review(section, SectionStatus::Approved, None).await
    }

    /// Reviewer rejects a submitted section with feedback.
    pub async fn reject(
        &self,
        section: SectionId,
        feedback: impl Into<String>,
    ) -> Result<(), ServiceError> {
        self.review(section, SectionStatus::Rejected, Some(feedback.into()))
            .await
    }

    async fn review(
        &self,
        section: SectionId,
        target: SectionStatus,
        feedback: Option<String>,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .record
            .section_mut(section)
            .ok_or_else(|| not_found(section))?;
        if !state.status.can_transition_to(target) {
            return Err(conflict(format!(
                "Cannot move {section} from {} to {target}",
                state.status
            )));
        }
        state.status = target;
        state.feedback = feedback;
        self.recompute(&mut inner.record);
        tracing::info!(section = %section, status = %target, "Section reviewed");
        Ok(())
    }

    /// Count the call, honour any delay, then pop a queued failure.
    async fn enter(&self, op: Operation) -> Result<(), ServiceError> {
        let delay = {
            let mut inner = self.inner.lock().await;
            *inner.calls.entry(op).or_default() += 1;
            inner.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().await;
        match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn recompute(&self, record: &mut OnboardingRecord) {
        let percent = placeholder_completion_percent(record, &self.registry);
        record.set_completion_percent(percent);
    }

    fn check_section(&self, section: SectionId) -> Result<(), ServiceError> {
        if self.registry.contains(section) {
            Ok(())
        } else {
            Err(not_found(section))
        }
    }

    /// Move a section to SUBMITTED, clearing feedback.
    fn submit(record: &mut OnboardingRecord, section: SectionId) -> Result<(), ServiceError> {
        let state = record
            .section_mut(section)
            .ok_or_else(|| not_found(section))?;
        if !state.status.can_transition_to(SectionStatus::Submitted) {
            return Err(conflict(format!("Section {section} has already been approved")));
        }
        state.status = SectionStatus::Submitted;
        state.feedback = None;
        Ok(())
    }

    fn update_reply(&self, record: &OnboardingRecord, section: SectionId) -> SectionUpdate {
        let state = record.section(section).cloned().unwrap_or_default();
        SectionUpdate {
            status: state.status,
            feedback: state.feedback,
            document_urls: state.document_urls,
            completion_percent: Some(record.completion_percent()),
        }
    }
}

fn not_found(section: SectionId) -> ServiceError {
    ServiceError::Rejected {
        status: 404,
        message: format!("Unknown section: {section}"),
    }
}

fn conflict(message: String) -> ServiceError {
    ServiceError::Rejected {
        status: 409,
        message,
    }
}

#[async_trait]
impl OnboardingService for InMemoryOnboardingService {
    async fn fetch_record(&self) -> Result<OnboardingRecord, ServiceError> {
        self.enter(Operation::Fetch).await?;
        Ok(self.inner.lock().await.record.clone())
    }

    async fn update_section(
        &self,
        section: SectionId,
        fields: &SectionForm,
    ) -> Result<SectionUpdate, ServiceError> {
        self.enter(Operation::Update).await?;
        self.check_section(section)?;

        let mut inner = self.inner.lock().await;
        Self::submit(&mut inner.record, section)?;
        if let Some(state) = inner.record.section_mut(section) {
            state
                .values
                .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self.recompute(&mut inner.record);
        Ok(self.update_reply(&inner.record, section))
    }

    async fn upload_document(
        &self,
        section: SectionId,
        kind: DocumentKind,
        file: UploadFile,
    ) -> Result<DocumentUpload, ServiceError> {
        self.enter(Operation::Upload).await?;
        if !self.registry.has_slot(section, kind) {
            return Err(ServiceError::Rejected {
                status: 400,
                message: format!("Section {section} has no {kind} slot"),
            });
        }
        if file.bytes.is_empty() {
            return Err(ServiceError::Rejected {
                status: 400,
                message: "Uploaded file is empty".to_string(),
            });
        }

        let mut inner = self.inner.lock().await;
        Self::submit(&mut inner.record, section)?;
        let url = format!("memory://{section}/{kind}/{}", file.file_name);
        if let Some(state) = inner.record.section_mut(section) {
            state.document_urls.insert(kind, Some(url.clone()));
        }
        self.recompute(&mut inner.record);
        Ok(DocumentUpload {
            url,
            status: SectionStatus::Submitted,
            completion_percent: Some(inner.record.completion_percent()),
        })
    }

    async fn confirm_signature(&self, section: SectionId) -> Result<SectionUpdate, ServiceError> {
        self.enter(Operation::ConfirmSignature).await?;
        if !self.registry.has_slot(section, DocumentKind::Signature) {
            return Err(ServiceError::Rejected {
                status: 400,
                message: format!("Section {section} has no signature"),
            });
        }

        let mut inner = self.inner.lock().await;
        let has_signature = inner
            .record
            .section(section)
            .is_some_and(|s| s.document_url(DocumentKind::Signature).is_some());
        if !has_signature {
            return Err(ServiceError::Rejected {
                status: 400,
                message: "No signature on file to confirm".to_string(),
            });
        }
        Self::submit(&mut inner.record, section)?;
        self.recompute(&mut inner.record);
        Ok(self.update_reply(&inner.record, section))
    }
}
