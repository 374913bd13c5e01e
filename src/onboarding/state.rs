//! Workflow state machine: the single place local onboarding state changes.
//!
//! All mutations go through [`WorkflowState::apply`] with a named
//! [`WorkflowAction`]. Rendering reads [`WorkflowState::section_views`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::editability::is_editable;
use super::model::{OnboardingRecord, SectionStatus};
use super::notifier::{CompletionNotifier, CompletionPhase};
use super::progress::{ProgressState, SectionPatch};
use super::registry::{DocumentKind, SectionId, SectionRegistry};
use super::upload::{UploadCoordinator, UploadOutcome, UploadTicket};
use crate::error::WorkflowError;

/// Save lifecycle of one section's form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Saved,
    Failed(String),
}

impl SaveState {
    pub fn is_saving(&self) -> bool {
        matches!(self, Self::Saving)
    }
}

/// Named transitions of the workflow.
#[derive(Debug, Clone)]
pub enum WorkflowAction {
    /// A full record arrived. `resolve_section` re-runs the resume resolver.
    Load {
        record: OnboardingRecord,
        resolve_section: bool,
    },
    FetchFailed {
        message: String,
    },
    Patch {
        section: SectionId,
        patch: SectionPatch,
    },
    Navigate {
        section: SectionId,
    },
    BeginSave {
        section: SectionId,
    },
    EndSave {
        section: SectionId,
        outcome: Result<(), String>,
    },
    BeginUpload {
        section: SectionId,
        kind: DocumentKind,
    },
    EndUpload {
        ticket: UploadTicket,
        outcome: UploadOutcome,
    },
    AckComplete,
}

impl WorkflowAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::Patch { .. } => "patch",
            Self::Navigate { .. } => "navigate",
            Self::BeginSave { .. } => "begin_save",
            Self::EndSave { .. } => "end_save",
            Self::BeginUpload { .. } => "begin_upload",
            Self::EndUpload { .. } => "end_upload",
            Self::AckComplete => "ack_complete",
        }
    }
}

/// What an applied action produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Section active after a load.
    pub active_section: Option<SectionId>,
    /// Handed out by `BeginUpload`.
    pub ticket: Option<UploadTicket>,
    /// This action was the <100 → 100 edge.
    pub completion_reached: bool,
    /// `EndUpload` with a ticket that was no longer current.
    pub stale: bool,
}

/// Render model for one document slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub kind: DocumentKind,
    pub url: Option<String>,
    pub busy: bool,
    pub error: Option<String>,
    pub editable: bool,
}

/// Render model for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionView {
    pub id: SectionId,
    pub position: usize,
    pub display_name: &'static str,
    pub status: SectionStatus,
    pub editable: bool,
    pub active: bool,
    pub feedback: Option<String>,
    pub save: SaveState,
    pub documents: Vec<SlotView>,
}

#[derive(Debug, Clone)]
pub struct WorkflowState {
    progress: ProgressState,
    uploads: UploadCoordinator,
    notifier: CompletionNotifier,
    saves: std::collections::BTreeMap<SectionId, SaveState>,
}

impl WorkflowState {
    pub fn new(registry: SectionRegistry) -> Self {
        Self {
            progress: ProgressState::new(registry),
            uploads: UploadCoordinator::new(&registry),
            notifier: CompletionNotifier::new(),
            saves: registry.ids().map(|id| (id, SaveState::Idle)).collect(),
        }
    }

    pub fn registry(&self) -> &SectionRegistry {
        self.progress.registry()
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn completion_phase(&self) -> CompletionPhase {
        self.notifier.phase()
    }

    pub fn save_state(&self, section: SectionId) -> SaveState {
        self.saves.get(&section).cloned().unwrap_or_default()
    }

    /// Status of `section`, PENDING when nothing is loaded.
    pub fn status(&self, section: SectionId) -> SectionStatus {
        self.progress
            .record()
            .map(|r| r.status(section))
            .unwrap_or_default()
    }

    pub fn is_editable(&self, section: SectionId) -> bool {
        is_editable(self.status(section))
    }

    pub fn apply(&mut self, action: WorkflowAction) -> Result<Transition, WorkflowError> {
        debug!(action = action.name(), "Applying workflow action");
        let mut transition = Transition::default();

        match action {
            WorkflowAction::Load {
                record,
                resolve_section,
            } => {
                let percent = record.completion_percent();
                transition.active_section = Some(self.progress.replace(record, !resolve_section));
                transition.completion_reached = self.notifier.observe(percent);
            }
            WorkflowAction::FetchFailed { message } => {
                self.progress.fetch_failed(message);
            }
            WorkflowAction::Patch { section, patch } => {
                self.progress.apply_patch(section, patch)?;
                if let Some(record) = self.progress.record() {
                    transition.completion_reached =
                        self.notifier.observe(record.completion_percent());
                }
            }
            WorkflowAction::Navigate { section } => {
                self.progress.navigate(section)?;
            }
            WorkflowAction::BeginSave { section } => {
                self.ensure_editable(section)?;
                if self.save_state(section).is_saving() {
                    return Err(WorkflowError::SaveInProgress { section });
                }
                self.saves.insert(section, SaveState::Saving);
            }
            WorkflowAction::EndSave { section, outcome } => {
                if !self.registry().contains(section) {
                    return Err(WorkflowError::UnknownSection { section });
                }
                let state = match outcome {
                    Ok(()) => SaveState::Saved,
                    Err(message) => SaveState::Failed(message),
                };
                self.saves.insert(section, state);
            }
            WorkflowAction::BeginUpload { section, kind } => {
                if !self.registry().has_slot(section, kind) {
                    return Err(WorkflowError::UnknownSlot { section, kind });
                }
                self.ensure_editable(section)?;
                transition.ticket = Some(self.uploads.begin(section, kind)?);
            }
            WorkflowAction::EndUpload { ticket, outcome } => {
                transition.stale = !self.uploads.end(&ticket, outcome);
            }
            WorkflowAction::AckComplete => {
                self.notifier.acknowledge();
            }
        }

        Ok(transition)
    }

    /// One render model per section, in registry order.
    pub fn section_views(&self) -> Vec<SectionView> {
        let registry = *self.registry();
        let active = self.progress.active_section();

        registry
            .list_sections()
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let state = self
                    .progress
                    .record()
                    .and_then(|r| r.section(spec.id))
                    .cloned()
                    .unwrap_or_default();
                let editable = is_editable(state.status);
                let documents = spec
                    .document_slots
                    .iter()
                    .map(|kind| SlotView {
                        kind: *kind,
                        url: state.document_url(*kind).map(String::from),
                        busy: self.uploads.is_busy(spec.id, *kind),
                        error: self.uploads.error(spec.id, *kind).map(String::from),
                        editable,
                    })
                    .collect();
                SectionView {
                    id: spec.id,
                    position: i + 1,
                    display_name: spec.display_name,
                    status: state.status,
                    editable,
                    active: active == Some(spec.id),
                    feedback: state.feedback.clone(),
                    save: self.save_state(spec.id),
                    documents,
                }
            })
            .collect()
    }

    /// Gate for anything that changes a section.
    pub fn ensure_editable(&self, section: SectionId) -> Result<(), WorkflowError> {
        if !self.registry().contains(section) {
            return Err(WorkflowError::UnknownSection { section });
        }
        if self.progress.record().is_none() {
            return Err(WorkflowError::NotLoaded);
        }
        if !self.is_editable(section) {
            return Err(WorkflowError::SectionLocked { section });
        }
        Ok(())
    }
}
