//! Worker thread executing goals so the goal host can keep serving requests during a run.

// -----------------------------------------------------------------------------------------------
// INCLUDES
// -----------------------------------------------------------------------------------------------

use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

use comms_if::action::{Goal, GoalEvent, GoalId};
use log::{debug, error, warn};

use super::{GoalHostError, RunDispatcher};
use crate::hand_if::{ActuatorSink, JointStateSource};
use crate::sequencer::{CancelToken, PoseSequencer};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Handle to a running worker thread. Dropping the handle stops the thread, waiting for the
/// current run to reach its outcome first.
pub struct WorkerHandle {
    sender: Sender<WorkerSignal>,

    thread: Option<JoinHandle<Result<(), GoalHostError>>>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug)]
pub enum WorkerSignal {
    /// The worker should stop it's operations
    Stop,

    /// Execute the goal, reporting events under the given ID
    Run {
        id: GoalId,
        goal: Goal,
        cancel: CancelToken,
    },
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl WorkerHandle {
    /// Spawn the worker thread, moving the sequencer into it.
    ///
    /// Returns the handle used to dispatch goals and the receiver on which the worker's feedback
    /// and results arrive.
    pub fn spawn<A, J>(sequencer: PoseSequencer<A, J>) -> (Self, Receiver<GoalEvent>)
    where
        A: ActuatorSink + Send + 'static,
        J: JointStateSource + Send + 'static,
    {
        let (signal_sender, signal_receiver) = channel();
        let (event_sender, event_receiver) = channel();

        let thread =
            thread::spawn(move || worker_thread(sequencer, event_sender, signal_receiver));

        (
            Self {
                sender: signal_sender,
                thread: Some(thread),
            },
            event_receiver,
        )
    }

    /// Give up on the thread so that dropping the handle no longer waits for the current run.
    ///
    /// The thread keeps running until its run ends or the process exits.
    pub fn detach(&mut self) {
        if self.thread.take().is_some() {
            warn!("Worker thread detached");
        }
    }
}

impl RunDispatcher for WorkerHandle {
    fn dispatch(
        &mut self,
        id: GoalId,
        goal: Goal,
        cancel: CancelToken,
    ) -> Result<(), GoalHostError> {
        self.sender
            .send(WorkerSignal::Run { id, goal, cancel })
            .map_err(|_| GoalHostError::WorkerStopped)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // The worker may already have exited, in which case there is nothing to stop
        self.sender.send(WorkerSignal::Stop).ok();

        if let Some(t) = self.thread.take() {
            match t.join() {
                Ok(Ok(())) => debug!("Worker thread stopped"),
                Ok(Err(e)) => warn!("Worker thread stopped with an error: {}", e),
                Err(_) => error!("Worker thread panicked"),
            }
        }
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn worker_thread<A, J>(
    mut sequencer: PoseSequencer<A, J>,
    main_sender: Sender<GoalEvent>,
    main_receiver: Receiver<WorkerSignal>,
) -> Result<(), GoalHostError>
where
    A: ActuatorSink,
    J: JointStateSource,
{
    // Wait for commands from main
    while let Ok(signal) = main_receiver.recv() {
        match signal {
            WorkerSignal::Stop => break,
            WorkerSignal::Run { id, goal, cancel } => {
                let outcome = sequencer.run(goal, &cancel, |progress| {
                    if main_sender
                        .send(GoalEvent::Feedback { id, progress })
                        .is_err()
                    {
                        warn!("Could not send feedback for goal {}, host has stopped", id);
                    }
                });

                main_sender
                    .send(GoalEvent::Result { id, outcome })
                    .map_err(|_| GoalHostError::HostStopped)?;
            }
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{single_joint_catalog, Pose};
    use crate::convergence::MeasuredState;
    use crate::hand_if::TransportError;
    use crate::sequencer::SequencerParams;
    use comms_if::action::{Outcome, ProgressEvent};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Hand which is at its demand as soon as it is commanded.
    #[derive(Clone, Default)]
    struct InstantHand(Arc<Mutex<MeasuredState>>);

    impl ActuatorSink for InstantHand {
        fn command(&mut self, pose: &Pose) -> Result<(), TransportError> {
            let mut state = self.0.lock().unwrap();
            for (j, a) in pose.targets() {
                state.insert(j.clone(), *a);
            }
            Ok(())
        }
    }

    impl JointStateSource for InstantHand {
        fn query(&mut self) -> Result<MeasuredState, TransportError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn spawn_worker() -> (WorkerHandle, Receiver<GoalEvent>) {
        let hand = InstantHand::default();
        let params = SequencerParams {
            sample_period_s: 0.001,
            ..Default::default()
        };

        WorkerHandle::spawn(PoseSequencer::new(
            params,
            Arc::new(single_joint_catalog()),
            hand.clone(),
            hand,
        ))
    }

    fn recv_until_result(events: &Receiver<GoalEvent>) -> Vec<GoalEvent> {
        let mut received = Vec::new();
        loop {
            let e = events.recv_timeout(Duration::from_secs(5)).unwrap();
            let done = matches!(e, GoalEvent::Result { .. });
            received.push(e);
            if done {
                return received;
            }
        }
    }

    #[test]
    fn test_worker_runs_goals_in_order() {
        let (mut handle, events) = spawn_worker();

        handle
            .dispatch(GoalId(1), Goal { target: 3 }, CancelToken::new())
            .unwrap();

        let received = recv_until_result(&events);
        let mut expected: Vec<GoalEvent> = (1..=3)
            .map(|s| GoalEvent::Feedback {
                id: GoalId(1),
                progress: ProgressEvent { completed_steps: s },
            })
            .collect();
        expected.push(GoalEvent::Result {
            id: GoalId(1),
            outcome: Outcome::Succeeded { completed_steps: 3 },
        });
        assert_eq!(received, expected);

        // A cancelled goal only runs the setup
        let cancel = CancelToken::new();
        cancel.request();
        handle.dispatch(GoalId(2), Goal { target: 5 }, cancel).unwrap();

        assert_eq!(
            recv_until_result(&events),
            vec![GoalEvent::Result {
                id: GoalId(2),
                outcome: Outcome::Preempted { completed_steps: 0 }
            }]
        );
    }

    #[test]
    fn test_dropping_handle_stops_worker() {
        let (handle, events) = spawn_worker();
        drop(handle);

        // The thread has exited so its event sender is gone
        assert!(events.recv_timeout(Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_detached_worker_does_not_block_drop() {
        /// Hand which never gets to its demand.
        struct StuckHand;

        impl ActuatorSink for StuckHand {
            fn command(&mut self, _pose: &Pose) -> Result<(), TransportError> {
                Ok(())
            }
        }

        impl JointStateSource for StuckHand {
            fn query(&mut self) -> Result<MeasuredState, TransportError> {
                let mut state = MeasuredState::new();
                state.insert("ffj0".to_string(), 10.0);
                Ok(state)
            }
        }

        let params = SequencerParams {
            sample_period_s: 0.01,
            max_wait_s: Some(2.0),
            ..Default::default()
        };
        let (mut handle, _events) = WorkerHandle::spawn(PoseSequencer::new(
            params,
            Arc::new(single_joint_catalog()),
            StuckHand,
            StuckHand,
        ));

        handle
            .dispatch(GoalId(1), Goal { target: 1 }, CancelToken::new())
            .unwrap();

        let start = std::time::Instant::now();
        handle.detach();
        drop(handle);

        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
