//! Upload coordinator: per-document-slot in-flight tracking.
//!
//! Every `(section, kind)` slot known to the registry has its own entry.
//! Begin/end on one slot never touch another, so uploads to different slots
//! proceed side by side.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::{DocumentKind, SectionId, SectionRegistry};
use crate::error::WorkflowError;

/// Key of one document slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SlotKey {
    pub section: SectionId,
    pub kind: DocumentKind,
}

impl SlotKey {
    pub fn new(section: SectionId, kind: DocumentKind) -> Self {
        Self { section, kind }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.section, self.kind)
    }
}

/// Handle for one in-flight upload, returned by [`UploadCoordinator::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub id: Uuid,
    pub slot: SlotKey,
    pub started_at: DateTime<Utc>,
}

/// How an upload finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    /// Carries the message to show next to the slot.
    Failure(String),
}

#[derive(Debug, Clone, Default)]
struct SlotEntry {
    in_flight: Option<UploadTicket>,
    error: Option<String>,
}

/// Enum-keyed table of upload slots.
#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    slots: BTreeMap<SlotKey, SlotEntry>,
}

impl UploadCoordinator {
    /// One idle entry per slot in `registry`.
    pub fn new(registry: &SectionRegistry) -> Self {
        let slots = registry
            .slots()
            .map(|(section, kind)| (SlotKey::new(section, kind), SlotEntry::default()))
            .collect();
        Self { slots }
    }

    /// Mark a slot as in flight.
    ///
    /// A second upload to a slot that is already busy is rejected rather
    /// than queued.
    pub fn begin(
        &mut self,
        section: SectionId,
        kind: DocumentKind,
    ) -> Result<UploadTicket, WorkflowError> {
        let slot = SlotKey::new(section, kind);
        let entry = self
            .slots
            .get_mut(&slot)
            .ok_or(WorkflowError::UnknownSlot { section, kind })?;

        if entry.in_flight.is_some() {
            warn!(slot = %slot, "Upload already in flight, rejecting");
            return Err(WorkflowError::SlotBusy { section, kind });
        }

        let ticket = UploadTicket {
            id: Uuid::new_v4(),
            slot,
            started_at: Utc::now(),
        };
        entry.in_flight = Some(ticket.clone());
        entry.error = None;

        info!(slot = %slot, ticket = %ticket.id, "Upload started");
        Ok(ticket)
    }

    /// Clear the in-flight flag for `ticket`'s slot.
    ///
    /// Returns `false` (and changes nothing) when the ticket is not the
    /// slot's current upload.
    pub fn end(&mut self, ticket: &UploadTicket, outcome: UploadOutcome) -> bool {
        let Some(entry) = self.slots.get_mut(&ticket.slot) else {
            debug!(slot = %ticket.slot, "End for unknown slot ignored");
            return false;
        };
        if entry.in_flight.as_ref().map(|t| t.id) != Some(ticket.id) {
            debug!(slot = %ticket.slot, ticket = %ticket.id, "Stale upload ticket ignored");
            return false;
        }

        entry.in_flight = None;
        let elapsed_ms = (Utc::now() - ticket.started_at).num_milliseconds();
        match outcome {
            UploadOutcome::Success => {
                entry.error = None;
                info!(slot = %ticket.slot, elapsed_ms, "Upload finished");
            }
            UploadOutcome::Failure(message) => {
                warn!(slot = %ticket.slot, elapsed_ms, error = %message, "Upload failed");
                entry.error = Some(message);
            }
        }
        true
    }

    pub fn is_busy(&self, section: SectionId, kind: DocumentKind) -> bool {
        self.slots
            .get(&SlotKey::new(section, kind))
            .is_some_and(|e| e.in_flight.is_some())
    }

    /// Inline error for a slot, if its last upload failed.
    pub fn error(&self, section: SectionId, kind: DocumentKind) -> Option<&str> {
        self.slots
            .get(&SlotKey::new(section, kind))
            .and_then(|e| e.error.as_deref())
    }

    pub fn busy_slots(&self) -> impl Iterator<Item = SlotKey> + '_ {
        self.slots
            .iter()
            .filter(|(_, e)| e.in_flight.is_some())
            .map(|(k, _)| *k)
    }

    pub fn any_busy(&self) -> bool {
        self.busy_slots().next().is_some()
    }

    /// Forget all in-flight uploads and errors. Late `end` calls for the
    /// dropped tickets become no-ops.
    pub fn reset(&mut self) {
        for entry in self.slots.values_mut() {
            *entry = SlotEntry::default();
        }
    }
}
