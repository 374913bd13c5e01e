//! Section registry: the static, ordered catalogue of onboarding sections.
//!
//! Registry order is load-bearing: it is both the display order and the
//! tie-break used when picking the section a subject lands on.

use serde::{Deserialize, Serialize};

/// Identifier of an onboarding section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    PersonalInfo,
    Resume,
    GovernmentIds,
    Education,
    MedicalCertificate,
    DataPrivacy,
    Signature,
    EmergencyContact,
}

impl SectionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalInfo => "personal_info",
            Self::Resume => "resume",
            Self::GovernmentIds => "government_ids",
            Self::Education => "education",
            Self::MedicalCertificate => "medical_certificate",
            Self::DataPrivacy => "data_privacy",
            Self::Signature => "signature",
            Self::EmergencyContact => "emergency_contact",
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SectionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FULL_SECTIONS
            .iter()
            .map(|spec| spec.id)
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown section: {s}"))
    }
}

/// A named document attachment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    SssId,
    TinId,
    PhilhealthId,
    PagibigId,
    Diploma,
    Transcript,
    MedicalCertificate,
    Signature,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::SssId => "sss_id",
            Self::TinId => "tin_id",
            Self::PhilhealthId => "philhealth_id",
            Self::PagibigId => "pagibig_id",
            Self::Diploma => "diploma",
            Self::Transcript => "transcript",
            Self::MedicalCertificate => "medical_certificate",
            Self::Signature => "signature",
        }
    }

    /// Record key holding this slot's URL.
    pub fn url_field(&self) -> &'static str {
        match self {
            Self::Resume => "resumeUrl",
            Self::SssId => "sssIdUrl",
            Self::TinId => "tinIdUrl",
            Self::PhilhealthId => "philhealthIdUrl",
            Self::PagibigId => "pagibigIdUrl",
            Self::Diploma => "diplomaUrl",
            Self::Transcript => "transcriptUrl",
            Self::MedicalCertificate => "medicalCertificateUrl",
            Self::Signature => "signatureUrl",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FULL_SECTIONS
            .iter()
            .flat_map(|spec| spec.document_slots.iter().copied())
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown document kind: {s}"))
    }
}

/// Shape a field value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// `YYYY-MM-DD`.
    Date,
    Phone,
    /// Four-digit year.
    Year,
}

/// One form field a section reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

/// Static description of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub id: SectionId,
    pub display_name: &'static str,
    /// Record key holding the section status.
    pub status_field: &'static str,
    /// Record key holding reviewer feedback.
    pub feedback_field: &'static str,
    pub fields: &'static [FieldSpec],
    pub document_slots: &'static [DocumentKind],
}

impl SectionSpec {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_slot(&self, kind: DocumentKind) -> bool {
        self.document_slots.contains(&kind)
    }
}

const PERSONAL_INFO: SectionSpec = SectionSpec {
    id: SectionId::PersonalInfo,
    display_name: "Personal Information",
    status_field: "personalInfoStatus",
    feedback_field: "personalInfoFeedback",
    fields: &[
        required("firstName", FieldKind::Text),
        optional("middleName", FieldKind::Text),
        required("lastName", FieldKind::Text),
        required("birthDate", FieldKind::Date),
        required("mobileNumber", FieldKind::Phone),
        required("address", FieldKind::Text),
    ],
    document_slots: &[],
};

const RESUME: SectionSpec = SectionSpec {
    id: SectionId::Resume,
    display_name: "Resume",
    status_field: "resumeStatus",
    feedback_field: "resumeFeedback",
    fields: &[],
    document_slots: &[DocumentKind::Resume],
};

const GOVERNMENT_IDS: SectionSpec = SectionSpec {
    id: SectionId::GovernmentIds,
    display_name: "Government IDs",
    status_field: "governmentIdsStatus",
    feedback_field: "governmentIdsFeedback",
    fields: &[
        optional("sssNumber", FieldKind::Text),
        optional("tinNumber", FieldKind::Text),
        optional("philhealthNumber", FieldKind::Text),
        optional("pagibigNumber", FieldKind::Text),
    ],
    document_slots: &[
        DocumentKind::SssId,
        DocumentKind::TinId,
        DocumentKind::PhilhealthId,
        DocumentKind::PagibigId,
    ],
};

const EDUCATION: SectionSpec = SectionSpec {
    id: SectionId::Education,
    display_name: "Education",
    status_field: "educationStatus",
    feedback_field: "educationFeedback",
    fields: &[
        required("highestAttainment", FieldKind::Text),
        required("schoolName", FieldKind::Text),
        optional("yearGraduated", FieldKind::Year),
    ],
    document_slots: &[DocumentKind::Diploma, DocumentKind::Transcript],
};

const MEDICAL_CERTIFICATE: SectionSpec = SectionSpec {
    id: SectionId::MedicalCertificate,
    display_name: "Medical Certificate",
    status_field: "medicalCertificateStatus",
    feedback_field: "medicalCertificateFeedback",
    fields: &[],
    document_slots: &[DocumentKind::MedicalCertificate],
};

const DATA_PRIVACY: SectionSpec = SectionSpec {
    id: SectionId::DataPrivacy,
    display_name: "Data Privacy & Bank Details",
    status_field: "dataPrivacyStatus",
    feedback_field: "dataPrivacyFeedback",
    fields: &[
        required("dataPrivacyConsent", FieldKind::Text),
        required("bankName", FieldKind::Text),
        required("bankAccountName", FieldKind::Text),
        required("bankAccountNumber", FieldKind::Text),
    ],
    document_slots: &[],
};

const SIGNATURE: SectionSpec = SectionSpec {
    id: SectionId::Signature,
    display_name: "Signature",
    status_field: "signatureStatus",
    feedback_field: "signatureFeedback",
    fields: &[],
    document_slots: &[DocumentKind::Signature],
};

const EMERGENCY_CONTACT: SectionSpec = SectionSpec {
    id: SectionId::EmergencyContact,
    display_name: "Emergency Contact",
    status_field: "emergencyContactStatus",
    feedback_field: "emergencyContactFeedback",
    fields: &[
        required("contactName", FieldKind::Text),
        required("contactRelationship", FieldKind::Text),
        required("contactNumber", FieldKind::Phone),
    ],
    document_slots: &[],
};

static FULL_SECTIONS: [SectionSpec; 8] = [
    PERSONAL_INFO,
    RESUME,
    GOVERNMENT_IDS,
    EDUCATION,
    MEDICAL_CERTIFICATE,
    DATA_PRIVACY,
    SIGNATURE,
    EMERGENCY_CONTACT,
];

static LEGACY_SECTIONS: [SectionSpec; 5] = [
    PERSONAL_INFO,
    RESUME,
    GOVERNMENT_IDS,
    EDUCATION,
    MEDICAL_CERTIFICATE,
];

/// An ordered, immutable set of sections driving one wizard variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRegistry {
    name: &'static str,
    sections: &'static [SectionSpec],
}

impl SectionRegistry {
    /// The current 8-section wizard.
    pub fn full() -> Self {
        Self {
            name: "full",
            sections: &FULL_SECTIONS,
        }
    }

    /// The older 5-section wizard.
    pub fn legacy() -> Self {
        Self {
            name: "legacy",
            sections: &LEGACY_SECTIONS,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All sections in priority order.
    pub fn list_sections(&self) -> &'static [SectionSpec] {
        self.sections
    }

    pub fn ids(&self) -> impl Iterator<Item = SectionId> + '_ {
        self.sections.iter().map(|s| s.id)
    }

    pub fn get(&self, id: SectionId) -> Option<&'static SectionSpec> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// 1-based priority of a section.
    pub fn position(&self, id: SectionId) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id).map(|i| i + 1)
    }

    pub fn contains(&self, id: SectionId) -> bool {
        self.get(id).is_some()
    }

    pub fn first(&self) -> SectionId {
        self.sections[0].id
    }

    pub fn last(&self) -> SectionId {
        self.sections[self.sections.len() - 1].id
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Whether `(section, kind)` names a document slot of this registry.
    pub fn has_slot(&self, section: SectionId, kind: DocumentKind) -> bool {
        self.get(section).is_some_and(|s| s.has_slot(kind))
    }

    /// Every `(section, kind)` slot, in registry order.
    pub fn slots(&self) -> impl Iterator<Item = (SectionId, DocumentKind)> + '_ {
        self.sections
            .iter()
            .flat_map(|s| s.document_slots.iter().map(move |k| (s.id, *k)))
    }
}

impl Default for SectionRegistry {
    fn default() -> Self {
        Self::full()
    }
}
