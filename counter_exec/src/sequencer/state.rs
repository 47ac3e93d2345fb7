//! Run state of the PoseSequencer

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::action::ProgressEvent;
use log::{info, warn};
use std::fmt;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Phases of a counting run.
///
/// ```text
/// Idle -> OpeningHand -> Fisting1 -> Fisting2 -> CountingStep(0) -> .. -> CountingStep(n-1)
///                                                       |
///                                   Completed | Preempted | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    OpeningHand,
    Fisting1,
    Fisting2,

    /// Moving to the numbered pose with this zero-based index.
    CountingStep(u32),

    Completed,
    Preempted,
    Failed,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of a single run. Created when the run starts and dropped when it ends.
#[derive(Debug)]
pub struct SequenceState {
    phase: Phase,
    completed_steps: u32,
    cancel_observed: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Preempted | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::CountingStep(i) => write!(f, "CountingStep({})", i),
            p => write!(f, "{:?}", p),
        }
    }
}

impl SequenceState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            completed_steps: 0,
            cancel_observed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn completed_steps(&self) -> u32 {
        self.completed_steps
    }

    pub fn cancel_observed(&self) -> bool {
        self.cancel_observed
    }

    /// Move to the next phase.
    pub fn transition(&mut self, next: Phase) {
        if self.phase.is_terminal() {
            warn!("Sequencer leaving terminal phase {} for {}", self.phase, next);
        }

        info!("Sequencer {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Record that the cancellation request has been seen at a checkpoint.
    pub fn observe_cancel(&mut self) {
        self.cancel_observed = true;
    }

    /// Record the completion of the current numbered pose, returning the event to report.
    pub fn complete_step(&mut self) -> ProgressEvent {
        self.completed_steps += 1;
        ProgressEvent {
            completed_steps: self.completed_steps,
        }
    }
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_state_tracks_run() {
        let mut state = SequenceState::new();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.phase().is_terminal());

        state.transition(Phase::CountingStep(0));
        assert_eq!(state.complete_step(), ProgressEvent { completed_steps: 1 });
        state.transition(Phase::CountingStep(1));
        assert_eq!(state.complete_step(), ProgressEvent { completed_steps: 2 });
        assert!(!state.cancel_observed());

        state.observe_cancel();
        state.transition(Phase::Preempted);

        assert!(state.cancel_observed());
        assert!(state.phase().is_terminal());
        assert_eq!(state.completed_steps(), 2);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::CountingStep(3).to_string(), "CountingStep(3)");
        assert_eq!(Phase::Fisting1.to_string(), "Fisting1");
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::OpeningHand.is_terminal());
    }
}
