//! # Pose Sequencer
//!
//! The sequencer drives the hand through a counting run. It opens the hand, makes a fist in two
//! steps and then moves through the numbered poses one by one, waiting after each command until
//! the measured joint state has converged onto the pose.
//!
//! Waiting is a blocking poll of the [`JointStateSource`] at the configured sample period (10 Hz
//! by default). Cancellation is cooperative: the [`CancelToken`] is only looked at when a counting
//! step begins, never while the hand is moving. The setup poses are not cancellable unless
//! `cancellable_setup` is set, in which case the token is also checked before each of them.
//!
//! A run always ends with exactly one [`Outcome`]. Every failure (missing pose, incomplete joint
//! state, transport failure, timeout) is mapped onto `Outcome::Failed` using the error's message.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cancel;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use comms_if::action::{Goal, Outcome, ProgressEvent};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

// Internal
pub use cancel::*;
pub use params::*;
pub use state::*;

use crate::catalog::{CatalogError, Pose, PoseCatalog};
use crate::convergence::{ConvergenceChecker, ConvergenceError};
use crate::hand_if::{ActuatorSink, JointStateSource, TransportError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drives the hand through counting runs, one at a time.
pub struct PoseSequencer<A, J> {
    params: SequencerParams,

    checker: ConvergenceChecker,

    catalog: Arc<PoseCatalog>,

    actuator: A,

    joint_states: J,

    /// Phase the last run finished in, `Idle` if no run has been made yet.
    last_phase: Phase,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which end a run with `Outcome::Failed`.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("Could not command pose \"{pose}\": {source}")]
    Command {
        pose: String,
        source: TransportError,
    },

    #[error("Joint state unavailable after {failures} consecutive failed queries: {source}")]
    Transport {
        failures: u32,
        source: TransportError,
    },

    #[error(
        "TimedOut waiting for pose \"{pose}\" after {waited_s:.2} s (last error: {})",
        fmt_last_error(.last_error_rad)
    )]
    TimedOut {
        pose: String,
        waited_s: f64,
        last_error_rad: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<A, J> PoseSequencer<A, J>
where
    A: ActuatorSink,
    J: JointStateSource,
{
    pub fn new(
        params: SequencerParams,
        catalog: Arc<PoseCatalog>,
        actuator: A,
        joint_states: J,
    ) -> Self {
        Self {
            checker: ConvergenceChecker::new(params.threshold_rad),
            params,
            catalog,
            actuator,
            joint_states,
            last_phase: Phase::Idle,
        }
    }

    /// Execute a counting run up to `goal.target`.
    ///
    /// `on_progress` is called once for each numbered pose reached, before this function returns.
    /// Taking `&mut self` means a sequencer can only ever execute one run at a time.
    pub fn run<F>(&mut self, goal: Goal, cancel: &CancelToken, mut on_progress: F) -> Outcome
    where
        F: FnMut(ProgressEvent),
    {
        info!("Starting counting run to {}", goal.target);

        let mut state = SequenceState::new();

        let outcome = match self.execute(goal, cancel, &mut state, &mut on_progress) {
            Ok(o) => {
                info!("Counting run finished: {}", o);
                o
            }
            Err(e) => {
                state.transition(Phase::Failed);
                error!(
                    "Counting run failed after {} steps: {}",
                    state.completed_steps(),
                    e
                );
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.last_phase = state.phase();

        outcome
    }

    /// Phase the last run finished in.
    pub fn phase(&self) -> Phase {
        self.last_phase
    }

    pub fn params(&self) -> &SequencerParams {
        &self.params
    }

    pub fn joint_states(&self) -> &J {
        &self.joint_states
    }

    fn execute<F>(
        &mut self,
        goal: Goal,
        cancel: &CancelToken,
        state: &mut SequenceState,
        on_progress: &mut F,
    ) -> Result<Outcome, SequenceError>
    where
        F: FnMut(ProgressEvent),
    {
        // All poses are resolved before the hand is moved at all
        let sequence = self.catalog.resolve_goal_sequence(goal.target)?;

        let setup = [
            (Phase::OpeningHand, &sequence.hand_extended),
            (Phase::Fisting1, &sequence.fist_step1),
            (Phase::Fisting2, &sequence.fist_step2),
        ];

        for (phase, pose) in setup.iter() {
            if self.params.cancellable_setup && checkpoint(cancel, state) {
                return Ok(Outcome::Preempted { completed_steps: 0 });
            }

            state.transition(*phase);
            self.drive_to(pose)?;
        }

        for (i, pose) in sequence.numbers.iter().enumerate() {
            if checkpoint(cancel, state) {
                return Ok(Outcome::Preempted {
                    completed_steps: state.completed_steps(),
                });
            }

            state.transition(Phase::CountingStep(i as u32));
            self.drive_to(pose)?;

            on_progress(state.complete_step());
        }

        state.transition(Phase::Completed);

        Ok(Outcome::Succeeded {
            completed_steps: state.completed_steps(),
        })
    }

    /// Command the pose and block until the hand has reached it.
    fn drive_to(&mut self, pose: &Pose) -> Result<(), SequenceError> {
        debug!("Commanding pose \"{}\"", pose.name());

        self.actuator
            .command(pose)
            .map_err(|source| SequenceError::Command {
                pose: pose.name().into(),
                source,
            })?;

        self.wait_for_convergence(pose)
    }

    fn wait_for_convergence(&mut self, pose: &Pose) -> Result<(), SequenceError> {
        let period = self.params.sample_period();
        let max_wait = self.params.max_wait();
        let start = Instant::now();

        let mut failures = 0u32;
        let mut last_error_rad = None;

        loop {
            match self.joint_states.query() {
                Ok(measured) => {
                    failures = 0;

                    let err = self.checker.error(pose, &measured)?;
                    trace!("Pose \"{}\" error: {:.6} rad", pose.name(), err);

                    if err < self.checker.threshold_rad {
                        debug!("Pose \"{}\" reached", pose.name());
                        return Ok(());
                    }

                    last_error_rad = Some(err);
                }
                Err(source) => {
                    failures += 1;

                    if failures > self.params.max_query_failures {
                        return Err(SequenceError::Transport { failures, source });
                    }

                    warn!(
                        "Joint state query failed ({}/{} tolerated): {}",
                        failures, self.params.max_query_failures, source
                    );
                }
            }

            let waited = start.elapsed();
            let mut sleep_dur = period;

            if let Some(max) = max_wait {
                if waited >= max {
                    return Err(SequenceError::TimedOut {
                        pose: pose.name().into(),
                        waited_s: waited.as_secs_f64(),
                        last_error_rad,
                    });
                }

                sleep_dur = sleep_dur.min(max - waited);
            }

            thread::sleep(sleep_dur);
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// The only place cancellation is observed. Returns true if the run must stop.
fn checkpoint(cancel: &CancelToken, state: &mut SequenceState) -> bool {
    if !cancel.is_requested() {
        return false;
    }

    info!(
        "Cancellation requested, stopping after {} steps",
        state.completed_steps()
    );
    state.observe_cancel();
    state.transition(Phase::Preempted);

    true
}

fn fmt_last_error(last_error_rad: &Option<f64>) -> String {
    match last_error_rad {
        Some(e) => format!("{:.6} rad", e),
        None => String::from("no valid sample"),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{
        single_joint_catalog, CatalogParams, FIST_STEP1, FIST_STEP2, HAND_EXTENDED_POS,
    };
    use crate::convergence::MeasuredState;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::rc::Rc;

    /// Hand which reaches every commanded pose after `lag` queries.
    #[derive(Default)]
    struct HandModel {
        commands: Vec<String>,
        target: BTreeMap<String, f64>,
        lag: usize,
        lag_left: usize,
        fail_queries: usize,
        queries: usize,
        fail_commands: bool,
    }

    struct FakeSink(Rc<RefCell<HandModel>>);

    struct FakeSource(Rc<RefCell<HandModel>>);

    impl ActuatorSink for FakeSink {
        fn command(&mut self, pose: &Pose) -> Result<(), TransportError> {
            let mut hand = self.0.borrow_mut();
            if hand.fail_commands {
                return Err(TransportError::command("not connected"));
            }
            hand.commands.push(pose.name().to_string());
            hand.target = pose.targets().clone();
            hand.lag_left = hand.lag;
            Ok(())
        }
    }

    impl JointStateSource for FakeSource {
        fn query(&mut self) -> Result<MeasuredState, TransportError> {
            let mut hand = self.0.borrow_mut();
            hand.queries += 1;

            if hand.fail_queries > 0 {
                hand.fail_queries -= 1;
                return Err(TransportError::joint_state("no reply"));
            }

            if hand.lag_left > 0 {
                hand.lag_left -= 1;
                return Ok(hand.target.iter().map(|(j, a)| (j.clone(), a + 0.5)).collect());
            }

            Ok(hand.target.iter().map(|(j, a)| (j.clone(), *a)).collect())
        }
    }

    /// Source replaying a fixed list of samples.
    struct ScriptedSource(VecDeque<MeasuredState>);

    impl JointStateSource for ScriptedSource {
        fn query(&mut self) -> Result<MeasuredState, TransportError> {
            self.0
                .pop_front()
                .ok_or_else(|| TransportError::joint_state("script exhausted"))
        }
    }

    fn test_params() -> SequencerParams {
        SequencerParams {
            sample_period_s: 0.0,
            max_wait_s: Some(5.0),
            ..Default::default()
        }
    }

    fn fake_sequencer(
        params: SequencerParams,
        hand: &Rc<RefCell<HandModel>>,
    ) -> PoseSequencer<FakeSink, FakeSource> {
        PoseSequencer::new(
            params,
            Arc::new(single_joint_catalog()),
            FakeSink(hand.clone()),
            FakeSource(hand.clone()),
        )
    }

    fn sample(ffj0: f64) -> MeasuredState {
        let mut s = HashMap::new();
        s.insert("ffj0".to_string(), ffj0);
        s
    }

    fn collect_run<A: ActuatorSink, J: JointStateSource>(
        seq: &mut PoseSequencer<A, J>,
        target: u32,
        cancel: &CancelToken,
    ) -> (Vec<u32>, Outcome) {
        let mut progress = Vec::new();
        let outcome = seq.run(Goal { target }, cancel, |e| progress.push(e.completed_steps));
        (progress, outcome)
    }

    #[test]
    fn test_successful_runs() {
        for target in 1..=5 {
            let hand = Rc::new(RefCell::new(HandModel {
                lag: 2,
                ..Default::default()
            }));
            let mut seq = fake_sequencer(test_params(), &hand);

            let (progress, outcome) = collect_run(&mut seq, target, &CancelToken::new());

            assert_eq!(progress, (1..=target).collect::<Vec<_>>());
            assert_eq!(
                outcome,
                Outcome::Succeeded {
                    completed_steps: target
                }
            );
            assert_eq!(seq.phase(), Phase::Completed);

            let mut expected = vec![HAND_EXTENDED_POS, FIST_STEP1, FIST_STEP2];
            expected.extend(&crate::catalog::NUMBERED_POSES[..target as usize]);
            assert_eq!(hand.borrow().commands, expected);

            // Every pose needs the lagging samples plus the converged one
            assert_eq!(hand.borrow().queries, 3 * (3 + target as usize));
        }
    }

    #[test]
    fn test_two_sample_scenario() {
        let hand = Rc::new(RefCell::new(HandModel::default()));
        let samples = vec![sample(0.0), sample(0.5), sample(1.0), sample(0.5), sample(0.1001)];

        let mut seq = PoseSequencer::new(
            test_params(),
            Arc::new(single_joint_catalog()),
            FakeSink(hand.clone()),
            ScriptedSource(samples.into_iter().collect()),
        );

        let (progress, outcome) = collect_run(&mut seq, 1, &CancelToken::new());

        assert_eq!(progress, vec![1]);
        assert_eq!(outcome, Outcome::Succeeded { completed_steps: 1 });

        // The far sample must not have been accepted, so both were consumed
        assert!(seq.joint_states().0.is_empty());
    }

    #[test]
    fn test_cancel_between_steps() {
        let hand = Rc::new(RefCell::new(HandModel {
            lag: 1,
            ..Default::default()
        }));
        let mut seq = fake_sequencer(test_params(), &hand);

        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        let mut progress = Vec::new();

        let outcome = seq.run(Goal { target: 3 }, &cancel, |e| {
            if e.completed_steps == 2 {
                canceller.request();
            }
            progress.push(e.completed_steps);
        });

        assert_eq!(progress, vec![1, 2]);
        assert_eq!(outcome, Outcome::Preempted { completed_steps: 2 });
        assert_eq!(seq.phase(), Phase::Preempted);

        // Pose three is never commanded
        assert_eq!(hand.borrow().commands.last().map(|s| s.as_str()), Some("two"));
    }

    #[test]
    fn test_cancel_before_run() {
        let hand = Rc::new(RefCell::new(HandModel::default()));
        let mut seq = fake_sequencer(test_params(), &hand);

        let cancel = CancelToken::new();
        cancel.request();
        cancel.request();

        let (progress, outcome) = collect_run(&mut seq, 4, &cancel);

        // Setup is not cancellable by default
        assert!(progress.is_empty());
        assert_eq!(outcome, Outcome::Preempted { completed_steps: 0 });
        assert_eq!(
            hand.borrow().commands,
            vec![HAND_EXTENDED_POS, FIST_STEP1, FIST_STEP2]
        );
    }

    #[test]
    fn test_cancellable_setup() {
        let hand = Rc::new(RefCell::new(HandModel::default()));
        let mut seq = fake_sequencer(
            SequencerParams {
                cancellable_setup: true,
                ..test_params()
            },
            &hand,
        );

        let cancel = CancelToken::new();
        cancel.request();

        let (progress, outcome) = collect_run(&mut seq, 2, &cancel);

        assert!(progress.is_empty());
        assert_eq!(outcome, Outcome::Preempted { completed_steps: 0 });
        assert!(hand.borrow().commands.is_empty());
    }

    #[test]
    fn test_incomplete_state_fails() {
        let hand = Rc::new(RefCell::new(HandModel::default()));
        let mut wrong_joint = HashMap::new();
        wrong_joint.insert("mfj0".to_string(), 0.0);

        let mut seq = PoseSequencer::new(
            test_params(),
            Arc::new(single_joint_catalog()),
            FakeSink(hand.clone()),
            ScriptedSource(vec![wrong_joint].into_iter().collect()),
        );

        let (progress, outcome) = collect_run(&mut seq, 1, &CancelToken::new());

        assert!(progress.is_empty());
        match outcome {
            Outcome::Failed { reason } => assert!(reason.contains("ffj0"), "{}", reason),
            o => panic!("Expected failure, got {:?}", o),
        }
        assert_eq!(seq.phase(), Phase::Failed);
    }

    #[test]
    fn test_query_failures() {
        // Tolerated
        let hand = Rc::new(RefCell::new(HandModel {
            fail_queries: 2,
            ..Default::default()
        }));
        let mut seq = fake_sequencer(
            SequencerParams {
                max_query_failures: 2,
                ..test_params()
            },
            &hand,
        );
        let (progress, outcome) = collect_run(&mut seq, 2, &CancelToken::new());
        assert_eq!(progress, vec![1, 2]);
        assert_eq!(outcome, Outcome::Succeeded { completed_steps: 2 });

        // Not tolerated
        let hand = Rc::new(RefCell::new(HandModel {
            fail_queries: 2,
            ..Default::default()
        }));
        let mut seq = fake_sequencer(
            SequencerParams {
                max_query_failures: 1,
                ..test_params()
            },
            &hand,
        );
        let (progress, outcome) = collect_run(&mut seq, 2, &CancelToken::new());
        assert!(progress.is_empty());
        match outcome {
            Outcome::Failed { reason } => {
                assert!(reason.contains("Joint state channel failure"), "{}", reason)
            }
            o => panic!("Expected failure, got {:?}", o),
        }
    }

    #[test]
    fn test_command_failure() {
        let hand = Rc::new(RefCell::new(HandModel {
            fail_commands: true,
            ..Default::default()
        }));
        let mut seq = fake_sequencer(test_params(), &hand);

        let (_, outcome) = collect_run(&mut seq, 1, &CancelToken::new());

        match outcome {
            Outcome::Failed { reason } => assert!(reason.contains(HAND_EXTENDED_POS)),
            o => panic!("Expected failure, got {:?}", o),
        }
        assert_eq!(hand.borrow().queries, 0);
    }

    #[test]
    fn test_timeout() {
        // The hand never gets close enough
        let hand = Rc::new(RefCell::new(HandModel {
            lag: usize::MAX,
            ..Default::default()
        }));
        let mut seq = fake_sequencer(
            SequencerParams {
                max_wait_s: Some(0.0),
                ..test_params()
            },
            &hand,
        );

        let (progress, outcome) = collect_run(&mut seq, 3, &CancelToken::new());

        assert!(progress.is_empty());
        match outcome {
            Outcome::Failed { reason } => {
                assert!(reason.starts_with("TimedOut"), "{}", reason);
                assert!(reason.contains("0.500000 rad"), "{}", reason);
            }
            o => panic!("Expected failure, got {:?}", o),
        }
        assert_eq!(hand.borrow().commands, vec![HAND_EXTENDED_POS]);
    }

    #[test]
    fn test_unbounded_wait() {
        for max_wait_s in [None, Some(f64::INFINITY), Some(1e20)].iter() {
            let hand = Rc::new(RefCell::new(HandModel {
                lag: 3,
                ..Default::default()
            }));
            let mut seq = fake_sequencer(
                SequencerParams {
                    max_wait_s: *max_wait_s,
                    ..test_params()
                },
                &hand,
            );

            let (progress, outcome) = collect_run(&mut seq, 2, &CancelToken::new());

            assert_eq!(progress, vec![1, 2], "max_wait_s = {:?}", max_wait_s);
            assert_eq!(outcome, Outcome::Succeeded { completed_steps: 2 });
        }
    }

    #[test]
    fn test_missing_pose_fails_before_moving() {
        let mut params: CatalogParams = util::params::from_str(
            r#"
            [poses.hand_extended_pos]
            ffj0 = 0.0
            [poses.fist_step1]
            ffj0 = 0.5
            [poses.fist_step2]
            ffj0 = 1.0
            [poses.one]
            ffj0 = 0.1
            "#,
        )
        .unwrap();
        params.known_joints = vec!["ffj0".into()];

        let hand = Rc::new(RefCell::new(HandModel::default()));
        let mut seq = PoseSequencer::new(
            test_params(),
            Arc::new(PoseCatalog::new(params).unwrap()),
            FakeSink(hand.clone()),
            FakeSource(hand.clone()),
        );

        let (progress, outcome) = collect_run(&mut seq, 2, &CancelToken::new());

        assert!(progress.is_empty());
        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: CatalogError::UnknownPose("two".into()).to_string()
            }
        );
        assert!(hand.borrow().commands.is_empty());

        // The sequencer is reusable after a failed run
        let (progress, outcome) = collect_run(&mut seq, 1, &CancelToken::new());
        assert_eq!(progress, vec![1]);
        assert!(outcome.is_succeeded());
    }
}
