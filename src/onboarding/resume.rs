//! Resume resolver: picks the section a subject lands on at entry.

use super::model::{OnboardingRecord, SectionStatus};
use super::registry::{SectionId, SectionRegistry};

/// First section in registry order that is not approved, or the last
/// section when everything is approved.
///
/// Only run this on the initial load. Re-running it after a save would pull
/// the subject away from the section they are working in.
pub fn resolve(record: &OnboardingRecord, registry: &SectionRegistry) -> SectionId {
    registry
        .ids()
        .find(|id| record.status(*id) != SectionStatus::Approved)
        .unwrap_or_else(|| registry.last())
}
