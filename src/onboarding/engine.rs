//! OnboardingEngine: coordinates the workflow state with the external
//! onboarding service.
//!
//! The engine owns one [`WorkflowState`] behind a lock and drives it with
//! named actions around each service call. The lock is never held across
//! a network await, so uploads to different slots run concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

use super::model::{OnboardingRecord, SectionStatus};
use super::progress::SectionPatch;
use super::registry::{DocumentKind, SectionId, SectionRegistry};
use super::service::{OnboardingService, SectionForm, SectionUpdate, UploadFile};
use super::state::{SectionView, Transition, WorkflowAction, WorkflowState};
use super::upload::{SlotKey, UploadOutcome};
use super::validate::validate_form;
use crate::config::ClientConfig;
use crate::error::{ServiceError, WorkflowError};

/// Default broadcast channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default client-side limit on the final submission.
pub const DEFAULT_FINAL_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Notifications for whatever renders the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Loaded { active_section: SectionId },
    PageError { message: String },
    Navigated { section: SectionId },
    SectionSaved { section: SectionId, status: SectionStatus },
    SaveFailed { section: SectionId, message: String },
    UploadStarted { slot: SlotKey },
    UploadFinished { slot: SlotKey, error: Option<String> },
    CompletionReached,
}

/// Result of a successful save, signature confirmation, or final submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub section: SectionId,
    pub status: SectionStatus,
    pub completion_percent: Option<u8>,
    /// The save (or the refresh after it) crossed into 100%.
    pub completion_reached: bool,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub slot: SlotKey,
    pub url: String,
    pub status: SectionStatus,
    pub completion_reached: bool,
}

pub struct OnboardingEngine {
    service: Arc<dyn OnboardingService>,
    state: Arc<RwLock<WorkflowState>>,
    events: broadcast::Sender<EngineEvent>,
    final_submit_timeout: Duration,
}

impl OnboardingEngine {
    pub fn new(service: Arc<dyn OnboardingService>, registry: SectionRegistry) -> Self {
        let (events, _rx) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            service,
            state: Arc::new(RwLock::new(WorkflowState::new(registry))),
            events,
            final_submit_timeout: DEFAULT_FINAL_SUBMIT_TIMEOUT,
        }
    }

    pub fn from_config(service: Arc<dyn OnboardingService>, config: &ClientConfig) -> Self {
        Self::new(service, config.registry).with_final_submit_timeout(config.final_submit_timeout)
    }

    pub fn with_final_submit_timeout(mut self, timeout: Duration) -> Self {
        self.final_submit_timeout = timeout;
        self
    }

    /// Subscribe to engine events. Each renderer calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Copy of the current workflow state.
    pub async fn snapshot(&self) -> WorkflowState {
        self.state.read().await.clone()
    }

    pub async fn section_views(&self) -> Vec<SectionView> {
        self.state.read().await.section_views()
    }

    pub async fn active_section(&self) -> Option<SectionId> {
        self.state.read().await.progress().active_section()
    }

    pub async fn registry(&self) -> SectionRegistry {
        *self.state.read().await.registry()
    }

    fn emit(&self, event: EngineEvent) {
        // Ok if nobody is listening.
        let _ = self.events.send(event);
    }

    async fn dispatch(&self, action: WorkflowAction) -> Result<Transition, WorkflowError> {
        let transition = self.state.write().await.apply(action)?;
        if transition.completion_reached {
            self.emit(EngineEvent::CompletionReached);
        }
        Ok(transition)
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Initial entry: fetch the record and land on the first unapproved section.
    pub async fn load(&self) -> Result<OnboardingRecord, WorkflowError> {
        self.fetch(true).await.map(|(record, _)| record)
    }

    /// Re-fetch the record. With `preserve_section` the subject stays on the
    /// section they are working in.
    pub async fn refresh(&self, preserve_section: bool) -> Result<OnboardingRecord, WorkflowError> {
        self.fetch(!preserve_section).await.map(|(record, _)| record)
    }

    async fn fetch(&self, resolve_section: bool) -> Result<(OnboardingRecord, bool), WorkflowError> {
        match self.service.fetch_record().await {
            Ok(record) => {
                let transition = self
                    .dispatch(WorkflowAction::Load {
                        record: record.clone(),
                        resolve_section,
                    })
                    .await?;
                if let Some(active_section) = transition.active_section {
                    self.emit(EngineEvent::Loaded { active_section });
                }
                Ok((record, transition.completion_reached))
            }
            Err(e) => {
                let err = WorkflowError::Fetch(e);
                let message = err.user_message();
                self.dispatch(WorkflowAction::FetchFailed {
                    message: message.clone(),
                })
                .await?;
                self.emit(EngineEvent::PageError { message });
                Err(err)
            }
        }
    }

    /// Refresh after a successful write. A failure here is already surfaced
    /// as a page error and does not undo the write.
    async fn refresh_after_write(&self) -> bool {
        match self.fetch(false).await {
            Ok((_, reached)) => reached,
            Err(e) => {
                warn!(error = %e, "Refresh after write failed");
                false
            }
        }
    }

    // ── Local actions ───────────────────────────────────────────────────

    /// Merge a provisional update without a round trip.
    pub async fn apply_patch(
        &self,
        section: SectionId,
        patch: SectionPatch,
    ) -> Result<(), WorkflowError> {
        self.dispatch(WorkflowAction::Patch { section, patch })
            .await
            .map(|_| ())
    }

    pub async fn navigate(&self, section: SectionId) -> Result<(), WorkflowError> {
        self.dispatch(WorkflowAction::Navigate { section }).await?;
        self.emit(EngineEvent::Navigated { section });
        Ok(())
    }

    /// The subject dismissed the "all done" notification.
    pub async fn acknowledge_completion(&self) {
        // AckComplete cannot fail.
        let _ = self.dispatch(WorkflowAction::AckComplete).await;
    }

    // ── Saves ───────────────────────────────────────────────────────────

    /// Validate and submit one section's form.
    pub async fn save_section(
        &self,
        section: SectionId,
        form: SectionForm,
    ) -> Result<SaveReceipt, WorkflowError> {
        self.check_form(section, &form).await?;
        let service = Arc::clone(&self.service);
        let values = form.clone();
        self.run_save(section, values, None, async move {
            service.update_section(section, &form).await
        })
        .await
    }

    /// Submit the last section of the wizard, bounded by the final-submit
    /// timeout. On timeout the action is re-enabled for a manual retry.
    ///
    /// Upload-only sections (the short wizard ends on one) are refused with
    /// `NothingToSubmit`; they are completed through [`Self::upload`].
    pub async fn submit_final(&self, form: SectionForm) -> Result<SaveReceipt, WorkflowError> {
        let section = self.registry().await.last();
        self.check_form(section, &form).await?;
        let service = Arc::clone(&self.service);
        let values = form.clone();
        self.run_save(section, values, Some(self.final_submit_timeout), async move {
            service.update_section(section, &form).await
        })
        .await
    }

    /// Accept the signature already on file without uploading a new one.
    pub async fn confirm_signature(&self, section: SectionId) -> Result<SaveReceipt, WorkflowError> {
        if !self
            .registry()
            .await
            .has_slot(section, DocumentKind::Signature)
        {
            return Err(WorkflowError::UnknownSlot {
                section,
                kind: DocumentKind::Signature,
            });
        }
        let service = Arc::clone(&self.service);
        self.run_save(section, SectionForm::new(), None, async move {
            service.confirm_signature(section).await
        })
        .await
    }

    async fn check_form(&self, section: SectionId, form: &SectionForm) -> Result<(), WorkflowError> {
        let state = self.state.read().await;
        let spec = state
            .registry()
            .get(section)
            .ok_or(WorkflowError::UnknownSection { section })?;
        state.ensure_editable(section)?;
        if spec.fields.is_empty() {
            return Err(WorkflowError::NothingToSubmit { section });
        }
        validate_form(spec, form)
    }

    async fn run_save<F>(
        &self,
        section: SectionId,
        values: SectionForm,
        timeout: Option<Duration>,
        request: F,
    ) -> Result<SaveReceipt, WorkflowError>
    where
        F: Future<Output = Result<SectionUpdate, ServiceError>>,
    {
        self.dispatch(WorkflowAction::BeginSave { section }).await?;

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(reply) => reply.map_err(WorkflowError::from_save),
                Err(_) => Err(WorkflowError::SaveTimeout { timeout: limit }),
            },
            None => request.await.map_err(WorkflowError::from_save),
        };

        let update = match result {
            Ok(update) => update,
            Err(err) => {
                let message = err.user_message();
                warn!(section = %section, error = %err, "Save failed");
                self.dispatch(WorkflowAction::EndSave {
                    section,
                    outcome: Err(message.clone()),
                })
                .await?;
                self.emit(EngineEvent::SaveFailed { section, message });
                return Err(err);
            }
        };

        let status = update.status;
        let completion_percent = update.completion_percent;
        let patched = self
            .dispatch(WorkflowAction::Patch {
                section,
                patch: update.into_patch(values),
            })
            .await;
        let mut completion_reached = match patched {
            Ok(t) => t.completion_reached,
            Err(e) => {
                warn!(section = %section, error = %e, "Could not patch local state after save");
                false
            }
        };
        self.dispatch(WorkflowAction::EndSave {
            section,
            outcome: Ok(()),
        })
        .await?;
        info!(section = %section, status = %status, "Section saved");
        self.emit(EngineEvent::SectionSaved { section, status });

        completion_reached |= self.refresh_after_write().await;

        Ok(SaveReceipt {
            section,
            status,
            completion_percent,
            completion_reached,
        })
    }

    // ── Uploads ─────────────────────────────────────────────────────────

    /// Upload one file into one document slot.
    ///
    /// Only `(section, kind)` shows as busy while the request runs. A
    /// second upload to the same slot is rejected with `SlotBusy`.
    pub async fn upload(
        &self,
        section: SectionId,
        kind: DocumentKind,
        file: UploadFile,
    ) -> Result<UploadReceipt, WorkflowError> {
        let ticket = self
            .dispatch(WorkflowAction::BeginUpload { section, kind })
            .await?
            .ticket
            .ok_or(WorkflowError::UnknownSlot { section, kind })?;
        let slot = ticket.slot;
        self.emit(EngineEvent::UploadStarted { slot });

        let reply = match self.service.upload_document(section, kind, file).await {
            Ok(reply) => reply,
            Err(source) => {
                let err = WorkflowError::Upload {
                    section,
                    kind,
                    source,
                };
                let message = err.user_message();
                self.dispatch(WorkflowAction::EndUpload {
                    ticket,
                    outcome: UploadOutcome::Failure(message.clone()),
                })
                .await?;
                self.emit(EngineEvent::UploadFinished {
                    slot,
                    error: Some(message),
                });
                return Err(err);
            }
        };

        let url = reply.url.clone();
        let status = reply.status;
        let patched = self
            .dispatch(WorkflowAction::Patch {
                section,
                patch: reply.into_patch(kind),
            })
            .await;
        let mut completion_reached = match patched {
            Ok(t) => t.completion_reached,
            Err(e) => {
                warn!(slot = %slot, error = %e, "Could not patch local state after upload");
                false
            }
        };
        self.dispatch(WorkflowAction::EndUpload {
            ticket,
            outcome: UploadOutcome::Success,
        })
        .await?;
        self.emit(EngineEvent::UploadFinished { slot, error: None });

        completion_reached |= self.refresh_after_write().await;

        Ok(UploadReceipt {
            slot,
            url,
            status,
            completion_reached,
        })
    }

    /// Upload several slots of one section side by side. Results come back
    /// in input order; one failure does not affect the others.
    pub async fn upload_all(
        &self,
        section: SectionId,
        files: Vec<(DocumentKind, UploadFile)>,
    ) -> Vec<Result<UploadReceipt, WorkflowError>> {
        join_all(
            files
                .into_iter()
                .map(|(kind, file)| self.upload(section, kind, file)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::onboarding::memory::{InMemoryOnboardingService, Operation};
    use crate::onboarding::notifier::CompletionPhase;
    use crate::onboarding::service::DocumentUpload;

    fn form(pairs: &[(&str, &str)]) -> SectionForm {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn data_privacy_form() -> SectionForm {
        form(&[
            ("dataPrivacyConsent", "yes"),
            ("bankName", "BPI"),
            ("bankAccountName", "Ana Cruz"),
            ("bankAccountNumber", "1234-5678-90"),
        ])
    }

    fn emergency_form() -> SectionForm {
        form(&[
            ("contactName", "Rosa Cruz"),
            ("contactRelationship", "Mother"),
            ("contactNumber", "09175550101"),
        ])
    }

    fn seeded(statuses: &[(SectionId, SectionStatus)]) -> Arc<InMemoryOnboardingService> {
        let reg = SectionRegistry::full();
        let mut record = OnboardingRecord::new(&reg);
        for (id, status) in statuses {
            record.section_mut(*id).unwrap().status = *status;
        }
        let percent = crate::onboarding::model::placeholder_completion_percent(&record, &reg);
        record.set_completion_percent(percent);
        Arc::new(InMemoryOnboardingService::with_record(reg, record))
    }

    fn engine(service: Arc<InMemoryOnboardingService>) -> OnboardingEngine {
        OnboardingEngine::new(service, SectionRegistry::full())
    }

    #[tokio::test]
    async fn load_lands_on_first_unapproved_section() {
        let svc = seeded(&[
            (SectionId::PersonalInfo, SectionStatus::Approved),
            (SectionId::Resume, SectionStatus::Submitted),
        ]);
        let engine = engine(svc);
        let mut rx = engine.subscribe();

        engine.load().await.unwrap();
        assert_eq!(engine.active_section().await, Some(SectionId::Resume));
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::Loaded {
                active_section: SectionId::Resume
            }
        );
    }

    #[tokio::test]
    async fn save_keeps_subject_on_current_section() {
        let svc = seeded(&[
            (SectionId::PersonalInfo, SectionStatus::Submitted),
            (SectionId::Resume, SectionStatus::Submitted),
            (SectionId::GovernmentIds, SectionStatus::Submitted),
            (SectionId::Education, SectionStatus::Submitted),
            (SectionId::MedicalCertificate, SectionStatus::Submitted),
            (SectionId::Signature, SectionStatus::Submitted),
        ]);
        let engine = engine(svc);
        engine.load().await.unwrap();
        assert_eq!(engine.active_section().await, Some(SectionId::PersonalInfo));

        engine.navigate(SectionId::DataPrivacy).await.unwrap();
        let receipt = engine
            .save_section(SectionId::DataPrivacy, data_privacy_form())
            .await
            .unwrap();

        assert_eq!(receipt.status, SectionStatus::Submitted);
        assert_eq!(receipt.completion_percent, Some(87));
        assert_eq!(engine.active_section().await, Some(SectionId::DataPrivacy));
    }

    #[tokio::test]
    async fn completion_fires_once() {
        let reg = SectionRegistry::full();
        let seeded_statuses: Vec<_> = reg
            .ids()
            .filter(|id| *id != SectionId::EmergencyContact)
            .map(|id| (id, SectionStatus::Submitted))
            .collect();
        let svc = seeded(&seeded_statuses);
        let engine = engine(svc);
        engine.load().await.unwrap();
        engine.navigate(SectionId::EmergencyContact).await.unwrap();

        let receipt = engine.submit_final(emergency_form()).await.unwrap();
        assert!(receipt.completion_reached);
        assert_eq!(receipt.completion_percent, Some(100));
        assert_eq!(engine.snapshot().await.completion_phase(), CompletionPhase::PendingAck);

        let mut rx = engine.subscribe();
        engine.refresh(true).await.unwrap();
        engine.refresh(true).await.unwrap();
        while let Ok(event) = rx.try_recv() {
            assert_ne!(event, EngineEvent::CompletionReached);
        }

        engine.acknowledge_completion().await;
        assert_eq!(engine.snapshot().await.completion_phase(), CompletionPhase::Acked);
    }

    #[tokio::test]
    async fn already_complete_record_does_not_fire() {
        let reg = SectionRegistry::full();
        let all: Vec<_> = reg.ids().map(|id| (id, SectionStatus::Approved)).collect();
        let engine = engine(seeded(&all));
        let mut rx = engine.subscribe();

        let record = engine.load().await.unwrap();
        assert!(record.is_complete());
        engine.refresh(true).await.unwrap();

        assert_eq!(engine.active_section().await, Some(SectionId::EmergencyContact));
        assert_eq!(engine.snapshot().await.completion_phase(), CompletionPhase::NotComplete);
        while let Ok(event) = rx.try_recv() {
            assert_ne!(event, EngineEvent::CompletionReached);
        }
    }

    #[tokio::test]
    async fn resubmission_clears_feedback() {
        let svc = seeded(&[]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();
        engine
            .upload(
                SectionId::Resume,
                DocumentKind::Resume,
                UploadFile::new("cv.pdf", b"%PDF-1.7".to_vec()),
            )
            .await
            .unwrap();
        svc.reject(SectionId::Resume, "missing photo ID").await.unwrap();
        engine.refresh(true).await.unwrap();

        let views = engine.section_views().await;
        assert_eq!(views[1].status, SectionStatus::Rejected);
        assert_eq!(views[1].feedback.as_deref(), Some("missing photo ID"));
        assert!(views[1].editable);

        engine
            .upload(
                SectionId::Resume,
                DocumentKind::Resume,
                UploadFile::new("cv-v2.pdf", b"%PDF-1.7".to_vec()),
            )
            .await
            .unwrap();
        let views = engine.section_views().await;
        assert_eq!(views[1].status, SectionStatus::Submitted);
        assert!(views[1].feedback.is_none());
    }

    #[tokio::test]
    async fn validation_error_never_reaches_service() {
        let svc = seeded(&[]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();

        let err = engine
            .save_section(SectionId::EmergencyContact, form(&[("contactName", "Rosa")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation { ref field, .. } if field == "contactRelationship"
        ));
        assert_eq!(svc.calls(Operation::Update).await, 0);
        assert_eq!(
            engine.snapshot().await.save_state(SectionId::EmergencyContact),
            crate::onboarding::state::SaveState::Idle
        );
    }

    #[tokio::test]
    async fn approved_section_is_locked() {
        let svc = seeded(&[(SectionId::DataPrivacy, SectionStatus::Approved)]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();

        let err = engine
            .save_section(SectionId::DataPrivacy, data_privacy_form())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SectionLocked { .. }));
        assert_eq!(svc.calls(Operation::Update).await, 0);
    }

    #[tokio::test]
    async fn server_rejection_is_verbatim_and_re_enables_save() {
        let svc = seeded(&[]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();
        svc.fail_next(
            Operation::Update,
            ServiceError::Rejected {
                status: 422,
                message: "Bank account number already registered".into(),
            },
        )
        .await;

        let err = engine
            .save_section(SectionId::DataPrivacy, data_privacy_form())
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Bank account number already registered");
        let snapshot = engine.snapshot().await;
        let save = snapshot.save_state(SectionId::DataPrivacy);
        assert!(!save.is_saving());

        // Manual retry goes through.
        engine
            .save_section(SectionId::DataPrivacy, data_privacy_form())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn final_submit_times_out_and_can_retry() {
        let reg = SectionRegistry::full();
        let svc = seeded(&[]);
        let engine = OnboardingEngine::new(Arc::clone(&svc) as Arc<dyn OnboardingService>, reg)
            .with_final_submit_timeout(Duration::from_millis(50));
        engine.load().await.unwrap();

        svc.set_delay(Operation::Update, Duration::from_millis(500)).await;
        let err = engine.submit_final(emergency_form()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::SaveTimeout { .. }));
        assert!(err.user_message().contains("taking too long"));
        assert!(!engine
            .snapshot()
            .await
            .save_state(SectionId::EmergencyContact)
            .is_saving());

        svc.set_delay(Operation::Update, Duration::ZERO).await;
        let receipt = engine.submit_final(emergency_form()).await.unwrap();
        assert_eq!(receipt.section, SectionId::EmergencyContact);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_state_and_reports_page_error() {
        let svc = seeded(&[(SectionId::PersonalInfo, SectionStatus::Approved)]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();

        svc.fail_next(Operation::Fetch, ServiceError::Transport("connection refused".into()))
            .await;
        let err = engine.refresh(true).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Fetch(_)));

        let snapshot = engine.snapshot().await;
        assert!(snapshot.progress().page_error().unwrap().contains("connection refused"));
        assert_eq!(snapshot.status(SectionId::PersonalInfo), SectionStatus::Approved);
    }

    #[tokio::test]
    async fn upload_failure_is_scoped_to_slot() {
        let svc = seeded(&[]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();
        svc.fail_next(
            Operation::Upload,
            ServiceError::Rejected {
                status: 413,
                message: "File too large".into(),
            },
        )
        .await;

        let err = engine
            .upload(
                SectionId::GovernmentIds,
                DocumentKind::SssId,
                UploadFile::new("sss.jpg", vec![1, 2, 3]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "File too large");

        let snapshot = engine.snapshot().await;
        let uploads = snapshot.uploads();
        assert!(!uploads.any_busy());
        assert_eq!(
            uploads.error(SectionId::GovernmentIds, DocumentKind::SssId),
            Some("File too large")
        );
        assert!(uploads.error(SectionId::GovernmentIds, DocumentKind::TinId).is_none());
        assert_eq!(snapshot.status(SectionId::GovernmentIds), SectionStatus::Pending);
    }

    #[tokio::test]
    async fn upload_all_runs_slots_independently() {
        let svc = seeded(&[]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();
        svc.fail_next(
            Operation::Upload,
            ServiceError::Transport("connection reset".into()),
        )
        .await;

        let results = engine
            .upload_all(
                SectionId::GovernmentIds,
                vec![
                    (DocumentKind::SssId, UploadFile::new("sss.jpg", vec![1])),
                    (DocumentKind::TinId, UploadFile::new("tin.jpg", vec![2])),
                    (DocumentKind::PagibigId, UploadFile::new("pagibig.jpg", vec![3])),
                ],
            )
            .await;
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert!(!engine.snapshot().await.uploads().any_busy());
    }

    /// Upload service whose replies are released by the test, one slot at a time.
    struct GatedUploads {
        inner: InMemoryOnboardingService,
        gates: BTreeMap<DocumentKind, Arc<Notify>>,
    }

    #[async_trait]
    impl OnboardingService for GatedUploads {
        async fn fetch_record(&self) -> Result<OnboardingRecord, ServiceError> {
            self.inner.fetch_record().await
        }
        async fn update_section(
            &self,
            section: SectionId,
            fields: &SectionForm,
        ) -> Result<SectionUpdate, ServiceError> {
            self.inner.update_section(section, fields).await
        }
        async fn upload_document(
            &self,
            section: SectionId,
            kind: DocumentKind,
            file: UploadFile,
        ) -> Result<DocumentUpload, ServiceError> {
            if let Some(gate) = self.gates.get(&kind) {
                gate.notified().await;
            }
            self.inner.upload_document(section, kind, file).await
        }
        async fn confirm_signature(&self, section: SectionId) -> Result<SectionUpdate, ServiceError> {
            self.inner.confirm_signature(section).await
        }
    }

    #[tokio::test]
    async fn concurrent_uploads_do_not_share_busy_state() {
        let sss_gate = Arc::new(Notify::new());
        let diploma_gate = Arc::new(Notify::new());
        let service = Arc::new(GatedUploads {
            inner: InMemoryOnboardingService::new(SectionRegistry::full()),
            gates: BTreeMap::from([
                (DocumentKind::SssId, Arc::clone(&sss_gate)),
                (DocumentKind::Diploma, Arc::clone(&diploma_gate)),
            ]),
        });
        let engine = Arc::new(OnboardingEngine::new(service, SectionRegistry::full()));
        engine.load().await.unwrap();

        let e1 = Arc::clone(&engine);
        let sss = tokio::spawn(async move {
            e1.upload(
                SectionId::GovernmentIds,
                DocumentKind::SssId,
                UploadFile::new("sss.jpg", vec![1]),
            )
            .await
        });
        let e2 = Arc::clone(&engine);
        let diploma = tokio::spawn(async move {
            e2.upload(
                SectionId::Education,
                DocumentKind::Diploma,
                UploadFile::new("diploma.pdf", vec![2]),
            )
            .await
        });

        // Wait until both slots are marked busy.
        for _ in 0..100 {
            if engine.snapshot().await.uploads().busy_slots().count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let snapshot = engine.snapshot().await;
        assert!(snapshot.uploads().is_busy(SectionId::GovernmentIds, DocumentKind::SssId));
        assert!(snapshot.uploads().is_busy(SectionId::Education, DocumentKind::Diploma));
        assert!(!snapshot.uploads().is_busy(SectionId::GovernmentIds, DocumentKind::TinId));

        // Same slot again while busy is refused.
        let err = engine
            .upload(
                SectionId::GovernmentIds,
                DocumentKind::SssId,
                UploadFile::new("sss-again.jpg", vec![9]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SlotBusy { .. }));

        // Finish the diploma first; the SSS slot stays busy.
        diploma_gate.notify_one();
        diploma.await.unwrap().unwrap();
        let snapshot = engine.snapshot().await;
        assert!(!snapshot.uploads().is_busy(SectionId::Education, DocumentKind::Diploma));
        assert!(snapshot.uploads().is_busy(SectionId::GovernmentIds, DocumentKind::SssId));

        sss_gate.notify_one();
        let receipt = sss.await.unwrap().unwrap();
        assert_eq!(receipt.url, "memory://government_ids/sss_id/sss.jpg");
        assert!(!engine.snapshot().await.uploads().any_busy());
    }

    #[tokio::test]
    async fn late_upload_does_not_move_subject() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(GatedUploads {
            inner: InMemoryOnboardingService::new(SectionRegistry::full()),
            gates: BTreeMap::from([(DocumentKind::MedicalCertificate, Arc::clone(&gate))]),
        });
        let engine = Arc::new(OnboardingEngine::new(service, SectionRegistry::full()));
        engine.load().await.unwrap();
        engine.navigate(SectionId::MedicalCertificate).await.unwrap();

        let e = Arc::clone(&engine);
        let upload = tokio::spawn(async move {
            e.upload(
                SectionId::MedicalCertificate,
                DocumentKind::MedicalCertificate,
                UploadFile::new("medcert.pdf", vec![1]),
            )
            .await
        });
        for _ in 0..100 {
            if engine.snapshot().await.uploads().any_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        engine.navigate(SectionId::Signature).await.unwrap();
        gate.notify_one();
        upload.await.unwrap().unwrap();

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.progress().active_section(), Some(SectionId::Signature));
        assert_eq!(
            snapshot.status(SectionId::MedicalCertificate),
            SectionStatus::Submitted
        );
    }

    #[tokio::test]
    async fn signature_confirmation() {
        let svc = seeded(&[]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();

        let err = engine
            .confirm_signature(SectionId::Signature)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "No signature on file to confirm");

        engine
            .upload(
                SectionId::Signature,
                DocumentKind::Signature,
                UploadFile::new("sig.png", vec![7]),
            )
            .await
            .unwrap();
        let receipt = engine.confirm_signature(SectionId::Signature).await.unwrap();
        assert_eq!(receipt.status, SectionStatus::Submitted);

        let err = engine
            .confirm_signature(SectionId::Resume)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownSlot { .. }));
    }

    #[tokio::test]
    async fn legacy_wizard_runs_on_same_engine() {
        let reg = SectionRegistry::legacy();
        let svc = Arc::new(InMemoryOnboardingService::new(reg));
        let engine = OnboardingEngine::new(svc, reg);
        engine.load().await.unwrap();

        assert_eq!(engine.section_views().await.len(), 5);
        let err = engine.navigate(SectionId::Signature).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownSection { .. }));

        let receipt = engine
            .upload(
                SectionId::MedicalCertificate,
                DocumentKind::MedicalCertificate,
                UploadFile::new("medcert.pdf", vec![1]),
            )
            .await
            .unwrap();
        assert_eq!(receipt.status, SectionStatus::Submitted);
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.progress().record().unwrap().completion_percent(), 20);
    }

    #[tokio::test]
    async fn upload_resubmission_clears_feedback_without_refresh() {
        let svc = seeded(&[]);
        let engine = engine(Arc::clone(&svc));
        engine.load().await.unwrap();
        engine
            .upload(
                SectionId::Resume,
                DocumentKind::Resume,
                UploadFile::new("cv.pdf", b"%PDF-1.7".to_vec()),
            )
            .await
            .unwrap();
        svc.reject(SectionId::Resume, "missing photo ID").await.unwrap();
        engine.refresh(true).await.unwrap();

        // The refresh after the upload fails; the reply alone must be enough.
        svc.fail_next(Operation::Fetch, ServiceError::Transport("connection reset".into()))
            .await;
        let receipt = engine
            .upload(
                SectionId::Resume,
                DocumentKind::Resume,
                UploadFile::new("cv-v2.pdf", b"%PDF-1.7".to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(receipt.status, SectionStatus::Submitted);

        let snapshot = engine.snapshot().await;
        assert!(snapshot.progress().page_error().is_some());
        let resume = snapshot
            .progress()
            .record()
            .unwrap()
            .section(SectionId::Resume)
            .unwrap()
            .clone();
        assert_eq!(resume.status, SectionStatus::Submitted);
        assert!(resume.feedback.is_none());
        assert!(svc.record().await.section(SectionId::Resume).unwrap().feedback.is_none());
    }

    #[tokio::test]
    async fn upload_only_section_refuses_form_submit() {
        let reg = SectionRegistry::legacy();
        let svc = Arc::new(InMemoryOnboardingService::new(reg));
        let engine = OnboardingEngine::new(Arc::clone(&svc) as Arc<dyn OnboardingService>, reg);
        engine.load().await.unwrap();

        let err = engine.submit_final(SectionForm::new()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::NothingToSubmit {
                section: SectionId::MedicalCertificate
            }
        ));
        let err = engine
            .save_section(SectionId::Resume, SectionForm::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NothingToSubmit { .. }));

        assert_eq!(svc.calls(Operation::Update).await, 0);
        assert_eq!(
            engine.snapshot().await.status(SectionId::MedicalCertificate),
            SectionStatus::Pending
        );
    }
}
