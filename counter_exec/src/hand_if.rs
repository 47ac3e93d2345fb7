//! # Hand Interfaces
//!
//! The sequencer talks to the hand through two traits: an [`ActuatorSink`] which accepts pose
//! commands, and a [`JointStateSource`] which returns the latest measured joint state. The network
//! clients implement them for real use, the tests implement them with scripted fakes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt;

use crate::{catalog::Pose, convergence::MeasuredState};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Accepts pose commands for the hand.
///
/// Commands are fire-and-forget, success only means the command was handed over to the
/// transport, not that the hand has moved.
pub trait ActuatorSink {
    fn command(&mut self, pose: &Pose) -> Result<(), TransportError>;
}

/// Provides the most recently measured joint state of the hand.
pub trait JointStateSource {
    fn query(&mut self) -> Result<MeasuredState, TransportError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Failure of the channel to the hand.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{channel} channel failure: {reason}")]
pub struct TransportError {
    pub channel: Channel,
    pub reason: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Pose commands to the hand
    Command,

    /// Joint state queries
    JointState,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TransportError {
    pub fn command<R: fmt::Display>(reason: R) -> Self {
        Self {
            channel: Channel::Command,
            reason: reason.to_string(),
        }
    }

    pub fn joint_state<R: fmt::Display>(reason: R) -> Self {
        Self {
            channel: Channel::JointState,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Command => write!(f, "Command"),
            Channel::JointState => write!(f, "Joint state"),
        }
    }
}

impl<T: ActuatorSink + ?Sized> ActuatorSink for &mut T {
    fn command(&mut self, pose: &Pose) -> Result<(), TransportError> {
        (**self).command(pose)
    }
}

impl<T: ActuatorSink + ?Sized> ActuatorSink for Box<T> {
    fn command(&mut self, pose: &Pose) -> Result<(), TransportError> {
        (**self).command(pose)
    }
}

impl<T: JointStateSource + ?Sized> JointStateSource for &mut T {
    fn query(&mut self) -> Result<MeasuredState, TransportError> {
        (**self).query()
    }
}

impl<T: JointStateSource + ?Sized> JointStateSource for Box<T> {
    fn query(&mut self) -> Result<MeasuredState, TransportError> {
        (**self).query()
    }
}
