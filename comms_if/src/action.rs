//! # Counting Action Interface
//!
//! Messages exchanged between a goal client (such as `counter_cli`) and the goal host in
//! `counter_exec`. The protocol follows the usual action pattern:
//!
//! - The client sends a [`GoalRequest`] on the request socket and receives a [`GoalResponse`].
//! - The host publishes [`GoalEvent`]s on the event socket: zero or more feedback messages per
//!   goal, followed by exactly one result.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identifier assigned to a goal by the goal host when it is accepted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoalId(pub u64);

/// A request to count from one up to `target`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Goal {
    /// Number of numbered poses to count through.
    pub target: u32,
}

/// Progress of a running goal, emitted once per numbered pose reached.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Number of numbered poses reached so far.
    pub completed_steps: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Terminal outcome of a goal. Exactly one is produced per goal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Outcome {
    /// All requested poses were reached.
    Succeeded { completed_steps: u32 },

    /// The goal was cancelled at a step checkpoint.
    Preempted { completed_steps: u32 },

    /// The run was aborted by an error.
    Failed { reason: String },
}

/// Requests accepted by the goal host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum GoalRequest {
    /// Submit a new goal.
    Submit(Goal),

    /// Request cancellation of a goal.
    Cancel(GoalId),

    /// Ask for the active and pending goals.
    Status,
}

/// Responses sent by the goal host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum GoalResponse {
    /// The goal was accepted and given this ID.
    Accepted(GoalId),

    /// The goal was rejected.
    Rejected { reason: String },

    /// Cancellation of the goal has been requested, it will take effect at the next step
    /// checkpoint.
    CancelRequested(GoalId),

    /// The goal is not active or pending.
    UnknownGoal(GoalId),

    /// Current goals of the host.
    Status {
        active: Option<GoalId>,
        pending: Option<GoalId>,
    },

    /// The request could not be parsed.
    Invalid,
}

/// Events published by the goal host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum GoalEvent {
    Feedback { id: GoalId, progress: ProgressEvent },
    Result { id: GoalId, outcome: Outcome },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Outcome {
    /// Number of poses completed before the outcome was reached, `None` for failures.
    pub fn completed_steps(&self) -> Option<u32> {
        match self {
            Outcome::Succeeded { completed_steps } | Outcome::Preempted { completed_steps } => {
                Some(*completed_steps)
            }
            Outcome::Failed { .. } => None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded { completed_steps } => {
                write!(f, "Succeeded after {} step(s)", completed_steps)
            }
            Outcome::Preempted { completed_steps } => {
                write!(f, "Preempted after {} step(s)", completed_steps)
            }
            Outcome::Failed { reason } => write!(f, "Failed: {}", reason),
        }
    }
}

impl GoalEvent {
    /// The goal this event belongs to.
    pub fn id(&self) -> GoalId {
        match self {
            GoalEvent::Feedback { id, .. } | GoalEvent::Result { id, .. } => *id,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let req = GoalRequest::Submit(Goal { target: 3 });
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"Submit":{"target":3}}"#
        );

        let cancel: GoalRequest = serde_json::from_str(r#"{"Cancel":4}"#).unwrap();
        assert_eq!(cancel, GoalRequest::Cancel(GoalId(4)));
    }

    #[test]
    fn test_outcome_steps() {
        assert_eq!(
            Outcome::Succeeded { completed_steps: 5 }.completed_steps(),
            Some(5)
        );
        assert_eq!(
            Outcome::Preempted { completed_steps: 2 }.completed_steps(),
            Some(2)
        );
        assert_eq!(
            Outcome::Failed { reason: "timed out".into() }.completed_steps(),
            None
        );
        assert_eq!(
            Outcome::Failed { reason: "timed out".into() }.to_string(),
            "Failed: timed out"
        );
    }
}
