//! Onboarding intake: multi-section wizard state and its service client.
//!
//! A new hire works through an ordered list of sections. Each section is
//! reviewed independently by an administrator. This module tracks where
//! the subject is, what they may still change, and which uploads are in
//! flight, and persists everything through an [`OnboardingService`].

pub mod editability;
pub mod engine;
pub mod http;
pub mod memory;
pub mod model;
pub mod notifier;
pub mod progress;
pub mod registry;
pub mod resume;
pub mod service;
pub mod state;
pub mod upload;
pub mod validate;

pub use editability::is_editable;
pub use engine::{EngineEvent, OnboardingEngine, SaveReceipt, UploadReceipt};
pub use http::HttpOnboardingService;
pub use memory::{InMemoryOnboardingService, Operation};
pub use model::{OnboardingRecord, SectionState, SectionStatus};
pub use notifier::{CompletionNotifier, CompletionPhase};
pub use progress::{ProgressState, SectionPatch};
pub use registry::{DocumentKind, SectionId, SectionRegistry};
pub use service::{OnboardingService, SectionForm, UploadFile};
pub use state::{SaveState, SectionView, WorkflowAction, WorkflowState};
pub use upload::{SlotKey, UploadCoordinator, UploadOutcome, UploadTicket};
