//! # Convergence Checks
//!
//! Decides whether the hand has reached a target pose. The error between a pose and a measured
//! joint state is the sum of the absolute per-joint differences over the joints of the pose.
//! Joints the pose does not reference are ignored.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use crate::catalog::Pose;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default tolerance under which a pose is considered reached.
///
/// Units: radians
pub const DEFAULT_THRESHOLD_RAD: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A snapshot of the measured joint positions, joint name to radians.
pub type MeasuredState = HashMap<String, f64>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Convergence checker with a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceChecker {
    /// Units: radians
    pub threshold_rad: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConvergenceError {
    #[error("Measured state has no sample for joint \"{joint}\" required by pose \"{pose}\"")]
    IncompleteState { pose: String, joint: String },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConvergenceChecker {
    pub fn new(threshold_rad: f64) -> Self {
        Self { threshold_rad }
    }

    /// See [`error`].
    pub fn error(&self, target: &Pose, measured: &MeasuredState) -> Result<f64, ConvergenceError> {
        error(target, measured)
    }

    /// See [`reached`].
    pub fn reached(&self, target: &Pose, measured: &MeasuredState) -> Result<bool, ConvergenceError> {
        reached(target, measured, self.threshold_rad)
    }
}

impl Default for ConvergenceChecker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_RAD)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Compute the error between the target pose and the measured state.
///
/// Fails with [`ConvergenceError::IncompleteState`] if any joint of the target is missing from
/// the measured state, a pose must never converge without data for all its joints.
pub fn error(target: &Pose, measured: &MeasuredState) -> Result<f64, ConvergenceError> {
    let mut sum = 0.0;

    for (joint, target_rad) in target.targets() {
        let measured_rad = measured
            .get(joint)
            .ok_or_else(|| ConvergenceError::IncompleteState {
                pose: target.name().into(),
                joint: joint.clone(),
            })?;

        sum += (target_rad - measured_rad).abs();
    }

    Ok(sum)
}

/// Returns true if the error between target and measured is strictly below `threshold`.
pub fn reached(
    target: &Pose,
    measured: &MeasuredState,
    threshold: f64,
) -> Result<bool, ConvergenceError> {
    Ok(error(target, measured)? < threshold)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn pose(pairs: &[(&str, f64)]) -> Pose {
        Pose::new("test", pairs.iter().map(|(j, a)| (j.to_string(), *a)).collect()).unwrap()
    }

    fn state(pairs: &[(&str, f64)]) -> MeasuredState {
        pairs.iter().map(|(j, a)| (j.to_string(), *a)).collect()
    }

    #[test]
    fn test_error_sums_abs_differences() {
        let target = pose(&[("ffj0", 1.0), ("thj1", -0.5)]);
        let measured = state(&[("ffj0", 0.75), ("thj1", -0.25), ("wrj1", 3.0)]);

        // Extra joints in the measurement are ignored
        assert_eq!(error(&target, &measured).unwrap(), 0.5);
    }

    #[test]
    fn test_reached_is_strict() {
        let target = pose(&[("ffj0", 0.0)]);
        let measured = state(&[("ffj0", 0.01)]);

        assert_eq!(error(&target, &measured).unwrap(), 0.01);
        assert!(!reached(&target, &measured, 0.01).unwrap());
        assert!(reached(&target, &measured, 0.0101).unwrap());
    }

    #[test]
    fn test_reached_monotone_in_threshold() {
        let target = pose(&[("ffj0", 0.1)]);
        let measured = state(&[("ffj0", 0.105)]);
        let err = error(&target, &measured).unwrap();

        assert!(reached(&target, &measured, err * 2.0).unwrap());
        assert!(!reached(&target, &measured, err / 2.0).unwrap());
    }

    #[test]
    fn test_counting_scenario_samples() {
        let one = pose(&[("ffj0", 0.1)]);
        let checker = ConvergenceChecker::default();

        let far = state(&[("ffj0", 0.5)]);
        assert!((checker.error(&one, &far).unwrap() - 0.4).abs() < 1e-12);
        assert!(!checker.reached(&one, &far).unwrap());

        let close = state(&[("ffj0", 0.1001)]);
        assert!((checker.error(&one, &close).unwrap() - 0.0001).abs() < 1e-12);
        assert!(checker.reached(&one, &close).unwrap());
    }

    #[test]
    fn test_incomplete_state() {
        let target = pose(&[("ffj0", 0.1), ("mfj0", 0.2)]);

        assert_eq!(
            error(&target, &state(&[("ffj0", 0.1)])),
            Err(ConvergenceError::IncompleteState {
                pose: "test".into(),
                joint: "mfj0".into()
            })
        );
        assert!(error(&target, &state(&[])).is_err());

        // Only raised when a joint is actually missing
        assert!(error(&target, &state(&[("ffj0", 0.1), ("mfj0", 0.2)])).is_ok());
    }
}
