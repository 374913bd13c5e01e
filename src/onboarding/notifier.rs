//! Completion notifier: fires once when progress crosses into 100%.

use serde::{Deserialize, Serialize};

/// Phases of the "all done" notification.
///
/// NotComplete → PendingAck → Acked. Acked is terminal for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPhase {
    #[default]
    NotComplete,
    PendingAck,
    Acked,
}

impl CompletionPhase {
    pub fn can_transition_to(&self, target: CompletionPhase) -> bool {
        use CompletionPhase::*;
        matches!((self, target), (NotComplete, PendingAck) | (PendingAck, Acked))
    }
}

impl std::fmt::Display for CompletionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotComplete => "not_complete",
            Self::PendingAck => "pending_ack",
            Self::Acked => "acked",
        };
        write!(f, "{s}")
    }
}

/// Edge-triggered detector over successive `completionPercent` observations.
#[derive(Debug, Clone, Default)]
pub struct CompletionNotifier {
    phase: CompletionPhase,
    last_seen: Option<u8>,
}

impl CompletionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CompletionPhase {
        self.phase
    }

    pub fn last_seen(&self) -> Option<u8> {
        self.last_seen
    }

    /// Feed a freshly observed percent. Returns `true` when this observation
    /// is the <100 → 100 edge and the notification should be shown.
    ///
    /// The first observation only sets the baseline, so a record that is
    /// already complete on entry never fires.
    pub fn observe(&mut self, percent: u8) -> bool {
        let previous = self.last_seen.replace(percent);
        let crossed = matches!(previous, Some(p) if p < 100) && percent >= 100;
        if crossed && self.phase.can_transition_to(CompletionPhase::PendingAck) {
            self.phase = CompletionPhase::PendingAck;
            tracing::info!(from = previous, "Onboarding reached 100%");
            return true;
        }
        false
    }

    /// User dismissed the notification. Returns `false` if nothing was pending.
    pub fn acknowledge(&mut self) -> bool {
        if !self.phase.can_transition_to(CompletionPhase::Acked) {
            return false;
        }
        self.phase = CompletionPhase::Acked;
        true
    }

    /// Back to a blank session with no baseline.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
