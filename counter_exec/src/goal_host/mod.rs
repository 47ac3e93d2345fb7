//! # Goal Host
//!
//! The goal host sits between the goal clients and the sequencer. It assigns IDs to submitted
//! goals, checks their targets, hands them to the sequencer worker one at a time and relays the
//! worker's feedback and results.
//!
//! [`GoalHost`] itself holds no sockets or threads: requests and worker events are fed into it and
//! it returns the responses and events which must be published. This keeps the goal bookkeeping
//! testable on its own, [`server::GoalServer`] and [`worker`] provide the transport and the
//! execution.
//!
//! Only one goal is ever active. When a goal is submitted while another is running the
//! [`NewGoalPolicy`] decides what happens:
//! - `Reject`: the new goal is refused.
//! - `PreemptActive`: the active goal is cancelled and the new one is queued, starting once the
//!   active goal has reported its result. A goal which was already queued is superseded and
//!   reported as preempted without having moved.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod server;
pub mod worker;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use comms_if::action::{Goal, GoalEvent, GoalId, GoalRequest, GoalResponse, Outcome};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

// Internal
use crate::sequencer::CancelToken;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Something which can execute a goal in the background.
///
/// Feedback and the result of a dispatched goal must be fed back into
/// [`GoalHost::handle_worker_event`].
pub trait RunDispatcher {
    fn dispatch(&mut self, id: GoalId, goal: Goal, cancel: CancelToken)
        -> Result<(), GoalHostError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GoalHostParams {
    pub new_goal_policy: NewGoalPolicy,

    /// If true a [`RunReport`] is saved in the session for every finished goal.
    pub save_run_reports: bool,
}

/// Summary of a finished goal, saved in the session directory.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub goal_id: GoalId,
    pub target: u32,
    pub progress_events: u32,
    pub outcome: Outcome,

    /// Time between dispatch and result.
    ///
    /// Units: seconds
    pub duration_s: f64,

    pub finished_at: DateTime<Utc>,
}

/// Bookkeeping for goals and their feedback.
pub struct GoalHost<D> {
    policy: NewGoalPolicy,

    /// Largest target which can be counted to
    max_target: u32,

    next_id: u64,

    dispatcher: D,

    active: Option<ActiveGoal>,

    pending: Option<(GoalId, Goal)>,

    reports: Vec<RunReport>,
}

struct ActiveGoal {
    id: GoalId,
    goal: Goal,
    cancel: CancelToken,
    last_progress: u32,
    started: Instant,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What to do with a goal submitted while another is active.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum NewGoalPolicy {
    Reject,
    PreemptActive,
}

#[derive(Debug, thiserror::Error)]
pub enum GoalHostError {
    #[error("The sequencer worker has stopped")]
    WorkerStopped,

    #[error("Could not send an event to the goal host, it has stopped")]
    HostStopped,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for GoalHostParams {
    fn default() -> Self {
        Self {
            new_goal_policy: NewGoalPolicy::Reject,
            save_run_reports: true,
        }
    }
}

impl RunReport {
    /// Path of the report relative to the session root. Goal IDs are unique within a session so
    /// no two reports share a file.
    pub fn save_path(&self) -> PathBuf {
        PathBuf::from(format!("runs/goal_{}.json", self.goal_id.0))
    }
}

impl<D: RunDispatcher> GoalHost<D> {
    /// Create a new host accepting targets between 1 and `max_target`.
    pub fn new(policy: NewGoalPolicy, max_target: u32, dispatcher: D) -> Self {
        Self {
            policy,
            max_target,
            next_id: 1,
            dispatcher,
            active: None,
            pending: None,
            reports: Vec::new(),
        }
    }

    /// Process a request from a client.
    ///
    /// Returns the response to send to the client and any events to publish.
    pub fn handle_request(&mut self, request: GoalRequest) -> (GoalResponse, Vec<GoalEvent>) {
        match request {
            GoalRequest::Submit(goal) => self.submit(goal),
            GoalRequest::Cancel(id) => self.cancel(id),
            GoalRequest::Status => (
                GoalResponse::Status {
                    active: self.active(),
                    pending: self.pending(),
                },
                vec![],
            ),
        }
    }

    /// Process an event from the worker.
    ///
    /// Feedback must belong to the active goal and count up by one each time, otherwise it is
    /// dropped. Returns the events to publish.
    pub fn handle_worker_event(&mut self, event: GoalEvent) -> Vec<GoalEvent> {
        let active = match self.active.as_mut() {
            Some(a) if a.id == event.id() => a,
            _ => {
                warn!("Dropping worker event for goal {} which is not active", event.id());
                return vec![];
            }
        };

        match event {
            GoalEvent::Feedback { id, progress } => {
                if progress.completed_steps != active.last_progress + 1 {
                    warn!(
                        "Dropping out of order feedback for goal {}: {} steps after {}",
                        id, progress.completed_steps, active.last_progress
                    );
                    return vec![];
                }

                active.last_progress = progress.completed_steps;

                vec![GoalEvent::Feedback { id, progress }]
            }
            GoalEvent::Result { id, outcome } => {
                let mut events = vec![GoalEvent::Result {
                    id,
                    outcome: outcome.clone(),
                }];

                if let Some(a) = self.active.take() {
                    if let Some(steps) = outcome.completed_steps() {
                        if steps != a.last_progress {
                            warn!(
                                "Goal {} reported {} completed steps but {} were fed back",
                                id, steps, a.last_progress
                            );
                        }
                    }

                    info!("Goal {} finished: {}", id, outcome);

                    self.reports.push(RunReport {
                        goal_id: id,
                        target: a.goal.target,
                        progress_events: a.last_progress,
                        outcome,
                        duration_s: a.started.elapsed().as_secs_f64(),
                        finished_at: Utc::now(),
                    });
                }

                if let Some((next_id, next_goal)) = self.pending.take() {
                    if let Err(e) = self.start(next_id, next_goal) {
                        events.push(GoalEvent::Result {
                            id: next_id,
                            outcome: Outcome::Failed {
                                reason: e.to_string(),
                            },
                        });
                    }
                }

                events
            }
        }
    }

    /// Cancel the active goal and drop the pending one, used when shutting down.
    pub fn cancel_all(&mut self) -> Vec<GoalEvent> {
        if let Some(a) = self.active.as_ref() {
            a.cancel.request();
        }

        self.pending
            .take()
            .map(|(id, _)| preempted_before_start(id))
            .into_iter()
            .collect()
    }

    pub fn active(&self) -> Option<GoalId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn pending(&self) -> Option<GoalId> {
        self.pending.as_ref().map(|(id, _)| *id)
    }

    /// Take the reports of all goals finished since the last call.
    pub fn take_reports(&mut self) -> Vec<RunReport> {
        std::mem::take(&mut self.reports)
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    fn submit(&mut self, goal: Goal) -> (GoalResponse, Vec<GoalEvent>) {
        if goal.target < 1 || goal.target > self.max_target {
            warn!("Rejecting goal with target {}", goal.target);
            return (
                GoalResponse::Rejected {
                    reason: format!(
                        "Target must be between 1 and {}, got {}",
                        self.max_target, goal.target
                    ),
                },
                vec![],
            );
        }

        let (active_id, active_cancel) = match self.active.as_ref() {
            Some(a) => (a.id, a.cancel.clone()),
            None => {
                let id = self.next_id();

                return match self.start(id, goal) {
                    Ok(()) => (GoalResponse::Accepted(id), vec![]),
                    Err(e) => (
                        GoalResponse::Rejected {
                            reason: e.to_string(),
                        },
                        vec![],
                    ),
                };
            }
        };

        match self.policy {
            NewGoalPolicy::Reject => {
                info!("Rejecting new goal, goal {} is still active", active_id);
                (
                    GoalResponse::Rejected {
                        reason: format!("Goal {} is still active", active_id),
                    },
                    vec![],
                )
            }
            NewGoalPolicy::PreemptActive => {
                active_cancel.request();

                let mut events = vec![];

                if let Some((superseded, _)) = self.pending.take() {
                    info!("Pending goal {} superseded", superseded);
                    events.push(preempted_before_start(superseded));
                }

                let id = self.next_id();
                info!("Goal {} queued, preempting goal {}", id, active_id);
                self.pending = Some((id, goal));

                (GoalResponse::Accepted(id), events)
            }
        }
    }

    fn cancel(&mut self, id: GoalId) -> (GoalResponse, Vec<GoalEvent>) {
        if let Some(a) = self.active.as_ref().filter(|a| a.id == id) {
            info!("Cancellation of goal {} requested", id);
            a.cancel.request();
            return (GoalResponse::CancelRequested(id), vec![]);
        }

        if self.pending() == Some(id) {
            info!("Pending goal {} cancelled", id);
            self.pending = None;
            return (
                GoalResponse::CancelRequested(id),
                vec![preempted_before_start(id)],
            );
        }

        (GoalResponse::UnknownGoal(id), vec![])
    }

    fn start(&mut self, id: GoalId, goal: Goal) -> Result<(), GoalHostError> {
        let cancel = CancelToken::new();

        self.dispatcher.dispatch(id, goal, cancel.clone())?;

        info!("Goal {} started, counting to {}", id, goal.target);

        self.active = Some(ActiveGoal {
            id,
            goal,
            cancel,
            last_progress: 0,
            started: Instant::now(),
        });

        Ok(())
    }

    fn next_id(&mut self) -> GoalId {
        let id = GoalId(self.next_id);
        self.next_id += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn preempted_before_start(id: GoalId) -> GoalEvent {
    GoalEvent::Result {
        id,
        outcome: Outcome::Preempted { completed_steps: 0 },
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::action::ProgressEvent;

    #[derive(Default)]
    struct FakeDispatcher {
        runs: Vec<(GoalId, Goal, CancelToken)>,
        stopped: bool,
    }

    impl RunDispatcher for FakeDispatcher {
        fn dispatch(
            &mut self,
            id: GoalId,
            goal: Goal,
            cancel: CancelToken,
        ) -> Result<(), GoalHostError> {
            if self.stopped {
                return Err(GoalHostError::WorkerStopped);
            }
            self.runs.push((id, goal, cancel));
            Ok(())
        }
    }

    fn host(policy: NewGoalPolicy) -> GoalHost<FakeDispatcher> {
        GoalHost::new(policy, 5, FakeDispatcher::default())
    }

    fn submit(target: u32) -> GoalRequest {
        GoalRequest::Submit(Goal { target })
    }

    fn feedback(id: u64, steps: u32) -> GoalEvent {
        GoalEvent::Feedback {
            id: GoalId(id),
            progress: ProgressEvent {
                completed_steps: steps,
            },
        }
    }

    fn result(id: u64, outcome: Outcome) -> GoalEvent {
        GoalEvent::Result {
            id: GoalId(id),
            outcome,
        }
    }

    #[test]
    fn test_target_validation() {
        let mut h = host(NewGoalPolicy::Reject);

        for t in &[0, 6, 100] {
            let (resp, events) = h.handle_request(submit(*t));
            assert!(matches!(resp, GoalResponse::Rejected { .. }), "{:?}", resp);
            assert!(events.is_empty());
        }
        assert!(h.dispatcher().runs.is_empty());

        for t in 1..=5 {
            let mut h = host(NewGoalPolicy::Reject);
            assert_eq!(h.handle_request(submit(t)).0, GoalResponse::Accepted(GoalId(1)));
        }
    }

    #[test]
    fn test_goal_lifecycle() {
        let mut h = host(NewGoalPolicy::Reject);

        assert_eq!(h.handle_request(submit(2)).0, GoalResponse::Accepted(GoalId(1)));
        assert_eq!(h.active(), Some(GoalId(1)));

        assert_eq!(h.handle_worker_event(feedback(1, 1)), vec![feedback(1, 1)]);
        assert_eq!(h.handle_worker_event(feedback(1, 2)), vec![feedback(1, 2)]);

        let done = result(1, Outcome::Succeeded { completed_steps: 2 });
        assert_eq!(h.handle_worker_event(done.clone()), vec![done]);
        assert_eq!(h.active(), None);

        let reports = h.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].goal_id, GoalId(1));
        assert_eq!(reports[0].progress_events, 2);
        assert!(h.take_reports().is_empty());

        // IDs keep increasing
        assert_eq!(h.handle_request(submit(1)).0, GoalResponse::Accepted(GoalId(2)));
    }

    #[test]
    fn test_feedback_ordering_enforced() {
        let mut h = host(NewGoalPolicy::Reject);
        h.handle_request(submit(3));

        // Gap
        assert!(h.handle_worker_event(feedback(1, 2)).is_empty());

        assert_eq!(h.handle_worker_event(feedback(1, 1)).len(), 1);

        // Duplicate
        assert!(h.handle_worker_event(feedback(1, 1)).is_empty());

        // Unknown goal
        assert!(h.handle_worker_event(feedback(7, 2)).is_empty());
        assert!(h
            .handle_worker_event(result(7, Outcome::Preempted { completed_steps: 0 }))
            .is_empty());

        assert_eq!(h.handle_worker_event(feedback(1, 2)).len(), 1);
        assert_eq!(h.active(), Some(GoalId(1)));
    }

    #[test]
    fn test_reject_policy() {
        let mut h = host(NewGoalPolicy::Reject);
        h.handle_request(submit(3));

        let (resp, events) = h.handle_request(submit(2));
        assert!(matches!(resp, GoalResponse::Rejected { .. }));
        assert!(events.is_empty());
        assert_eq!(h.dispatcher().runs.len(), 1);
        assert!(!h.dispatcher().runs[0].2.is_requested());
    }

    #[test]
    fn test_preempt_policy() {
        let mut h = host(NewGoalPolicy::PreemptActive);
        h.handle_request(submit(5));

        assert_eq!(h.handle_request(submit(2)).0, GoalResponse::Accepted(GoalId(2)));
        assert!(h.dispatcher().runs[0].2.is_requested());
        assert_eq!(h.pending(), Some(GoalId(2)));

        // A third goal supersedes the second one
        let (resp, events) = h.handle_request(submit(4));
        assert_eq!(resp, GoalResponse::Accepted(GoalId(3)));
        assert_eq!(
            events,
            vec![result(2, Outcome::Preempted { completed_steps: 0 })]
        );

        // Once the first goal reports the queued one starts
        let events =
            h.handle_worker_event(result(1, Outcome::Preempted { completed_steps: 0 }));
        assert_eq!(events.len(), 1);
        assert_eq!(h.active(), Some(GoalId(3)));
        assert_eq!(h.pending(), None);
        assert_eq!(h.dispatcher().runs[1].0, GoalId(3));
        assert_eq!(h.dispatcher().runs[1].1, Goal { target: 4 });
    }

    #[test]
    fn test_cancel() {
        let mut h = host(NewGoalPolicy::PreemptActive);
        h.handle_request(submit(3));
        h.handle_request(submit(3));

        // Cancelling the active goal twice is the same as once
        for _ in 0..2 {
            assert_eq!(
                h.handle_request(GoalRequest::Cancel(GoalId(1))),
                (GoalResponse::CancelRequested(GoalId(1)), vec![])
            );
        }
        assert!(h.dispatcher().runs[0].2.is_requested());

        // Pending goals are dropped straight away
        assert_eq!(
            h.handle_request(GoalRequest::Cancel(GoalId(2))),
            (
                GoalResponse::CancelRequested(GoalId(2)),
                vec![result(2, Outcome::Preempted { completed_steps: 0 })]
            )
        );
        assert_eq!(
            h.handle_request(GoalRequest::Cancel(GoalId(2))).0,
            GoalResponse::UnknownGoal(GoalId(2))
        );

        assert_eq!(
            h.handle_request(GoalRequest::Status).0,
            GoalResponse::Status {
                active: Some(GoalId(1)),
                pending: None
            }
        );

        // Nothing is started after the active goal finishes
        h.handle_worker_event(result(1, Outcome::Preempted { completed_steps: 0 }));
        assert_eq!(h.active(), None);
        assert_eq!(h.dispatcher().runs.len(), 1);

        assert_eq!(
            h.handle_request(GoalRequest::Cancel(GoalId(1))).0,
            GoalResponse::UnknownGoal(GoalId(1))
        );
    }

    #[test]
    fn test_stopped_worker() {
        let mut h = GoalHost::new(
            NewGoalPolicy::Reject,
            5,
            FakeDispatcher {
                stopped: true,
                ..Default::default()
            },
        );

        let (resp, _) = h.handle_request(submit(1));
        assert!(matches!(resp, GoalResponse::Rejected { .. }));
        assert_eq!(h.active(), None);
    }

    #[test]
    fn test_cancel_all() {
        let mut h = host(NewGoalPolicy::PreemptActive);
        h.handle_request(submit(3));
        h.handle_request(submit(3));

        assert_eq!(
            h.cancel_all(),
            vec![result(2, Outcome::Preempted { completed_steps: 0 })]
        );
        assert!(h.dispatcher().runs[0].2.is_requested());
        assert_eq!(h.pending(), None);
    }

    #[test]
    fn test_reports_have_distinct_paths() {
        let mut h = host(NewGoalPolicy::PreemptActive);
        h.handle_request(submit(2));
        h.handle_request(submit(2));

        // Both finish at once, for example when the hand is disconnected
        let failed = Outcome::Failed {
            reason: String::from("not connected"),
        };
        h.handle_worker_event(result(1, failed.clone()));
        h.handle_worker_event(result(2, failed));

        let reports = h.take_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].save_path(), PathBuf::from("runs/goal_1.json"));
        assert_eq!(reports[1].save_path(), PathBuf::from("runs/goal_2.json"));
        assert!(h.take_reports().is_empty());
    }
}
