//! Error types for the onboarding intake client.

use std::time::Duration;

use crate::onboarding::registry::{DocumentKind, SectionId};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures talking to the external onboarding service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Request failed: {0}")]
    Transport(String),

    /// Non-2xx answer. `message` is the server's `error` field, verbatim.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors raised by the workflow engine. Each maps to one user-visible message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    #[error("{section}: {field} {reason}")]
    Validation {
        section: SectionId,
        field: String,
        reason: String,
    },

    #[error("Could not load onboarding record: {0}")]
    Fetch(ServiceError),

    #[error("Upload of {kind} for {section} failed: {source}")]
    Upload {
        section: SectionId,
        kind: DocumentKind,
        source: ServiceError,
    },

    #[error("Final submission timed out after {timeout:?}")]
    SaveTimeout { timeout: Duration },

    /// Server said no; the message is shown as-is.
    #[error("{message}")]
    ServerRejection { status: u16, message: String },

    #[error("Could not reach onboarding service: {0}")]
    Transport(String),

    /// The service answered 2xx but the body could not be read.
    #[error("Onboarding service sent an unreadable reply: {0}")]
    InvalidResponse(String),

    #[error("Section {section} has no form fields; upload its documents instead")]
    NothingToSubmit { section: SectionId },

    #[error("Section {section} is approved and can no longer be changed")]
    SectionLocked { section: SectionId },

    #[error("An upload of {kind} for {section} is already in progress")]
    SlotBusy {
        section: SectionId,
        kind: DocumentKind,
    },

    #[error("Section {section} has no {kind} document slot")]
    UnknownSlot {
        section: SectionId,
        kind: DocumentKind,
    },

    #[error("Section {section} is already being saved")]
    SaveInProgress { section: SectionId },

    #[error("Section {section} is not part of this wizard")]
    UnknownSection { section: SectionId },

    #[error("Onboarding record has not been loaded yet")]
    NotLoaded,
}

impl WorkflowError {
    /// Text shown to the subject.
    pub fn user_message(&self) -> String {
        match self {
            Self::SaveTimeout { .. } => {
                "Saving is taking too long. Please try again.".to_string()
            }
            Self::Upload { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }

    /// Convert a failed save or confirm call.
    pub(crate) fn from_save(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected { status, message } => Self::ServerRejection { status, message },
            ServiceError::Transport(reason) => Self::Transport(reason),
            ServiceError::InvalidResponse(reason) => Self::InvalidResponse(reason),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
