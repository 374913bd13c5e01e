//! External onboarding service contract.
//!
//! The service persists data and owns the authoritative completion percent.
//! The engine only ever talks to it through [`OnboardingService`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::{OnboardingRecord, SectionStatus};
use super::progress::SectionPatch;
use super::registry::{DocumentKind, SectionId};
use crate::error::ServiceError;

/// Form values for one section, keyed by record field name.
pub type SectionForm = BTreeMap<String, String>;

/// Reply to a section update or signature confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionUpdate {
    pub status: SectionStatus,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub document_urls: BTreeMap<DocumentKind, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_percent: Option<u8>,
}

impl SectionUpdate {
    /// Provisional patch carrying the submitted values along.
    pub fn into_patch(self, values: SectionForm) -> SectionPatch {
        SectionPatch {
            status: Some(self.status),
            feedback: Some(self.feedback),
            document_urls: self.document_urls,
            values,
            completion_percent: self.completion_percent,
        }
    }
}

/// Reply to a single document upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub url: String,
    pub status: SectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_percent: Option<u8>,
}

impl DocumentUpload {
    /// A reply that resubmits the section also clears reviewer feedback.
    pub fn into_patch(self, kind: DocumentKind) -> SectionPatch {
        let mut patch = SectionPatch::default()
            .with_status(self.status)
            .with_document(kind, self.url)
            .with_completion(self.completion_percent);
        if self.status == SectionStatus::Submitted {
            patch.feedback = Some(None);
        }
        patch
    }
}

/// A file picked by the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// The external service the engine persists through.
#[async_trait]
pub trait OnboardingService: Send + Sync {
    /// GET onboarding-record.
    async fn fetch_record(&self) -> Result<OnboardingRecord, ServiceError>;

    /// POST section-update.
    async fn update_section(
        &self,
        section: SectionId,
        fields: &SectionForm,
    ) -> Result<SectionUpdate, ServiceError>;

    /// POST document-upload.
    async fn upload_document(
        &self,
        section: SectionId,
        kind: DocumentKind,
        file: UploadFile,
    ) -> Result<DocumentUpload, ServiceError>;

    /// POST signature-confirm: accept the previously captured signature.
    async fn confirm_signature(&self, section: SectionId) -> Result<SectionUpdate, ServiceError>;
}
