//! Editability gate: whether a section's inputs may be changed.

use super::model::SectionStatus;

/// A section is editable unless it has been approved.
///
/// REJECTED is the resubmission path and SUBMITTED stays open for
/// corrections until review finishes. Every field and file slot of a
/// section goes through this one check.
pub fn is_editable(status: SectionStatus) -> bool {
    status != SectionStatus::Approved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_approved_is_locked() {
        use SectionStatus::*;
        for status in [Pending, Submitted, Rejected, Approved] {
            assert_eq!(is_editable(status), status != Approved, "{status}");
        }
    }
}
