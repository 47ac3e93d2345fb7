//! Parameters structure for the PoseSequencer

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::time::Duration;
use util::time::seconds_to_duration;

use crate::convergence::DEFAULT_THRESHOLD_RAD;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the PoseSequencer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SequencerParams {
    /// Error under which a pose is considered reached.
    ///
    /// Units: radians
    pub threshold_rad: f64,

    /// Period at which the joint state is sampled while waiting for a pose.
    ///
    /// Units: seconds
    pub sample_period_s: f64,

    /// Maximum time to wait for a single pose before the run fails. `None`, or a value too large
    /// to be represented as a duration (such as `inf`), waits forever.
    ///
    /// Units: seconds
    pub max_wait_s: Option<f64>,

    /// Number of consecutive joint state query failures tolerated while waiting for a pose. The
    /// failure after the last tolerated one aborts the run.
    pub max_query_failures: u32,

    /// If true cancellation is also checked before each of the setup poses (opening the hand and
    /// making the fist). By default the setup always runs to completion.
    pub cancellable_setup: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SequencerParamsError {
    #[error("threshold_rad must be finite and positive, found {0}")]
    InvalidThreshold(f64),

    #[error("sample_period_s must be finite and not negative, found {0}")]
    InvalidSamplePeriod(f64),

    #[error("max_wait_s must not be negative or NaN, found {0}")]
    InvalidMaxWait(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SequencerParams {
    /// Check the values which cannot be expressed through the types alone.
    pub fn validate(&self) -> Result<(), SequencerParamsError> {
        if !(self.threshold_rad.is_finite() && self.threshold_rad > 0.0) {
            return Err(SequencerParamsError::InvalidThreshold(self.threshold_rad));
        }

        if !(self.sample_period_s.is_finite() && self.sample_period_s >= 0.0) {
            return Err(SequencerParamsError::InvalidSamplePeriod(
                self.sample_period_s,
            ));
        }

        match self.max_wait_s {
            Some(w) if w.is_nan() || w < 0.0 => Err(SequencerParamsError::InvalidMaxWait(w)),
            _ => Ok(()),
        }
    }

    pub fn sample_period(&self) -> Duration {
        seconds_to_duration(self.sample_period_s)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_s
            .map(seconds_to_duration)
            .filter(|d| *d != Duration::MAX)
    }
}

impl Default for SequencerParams {
    fn default() -> Self {
        Self {
            threshold_rad: DEFAULT_THRESHOLD_RAD,
            sample_period_s: 0.1,
            max_wait_s: Some(60.0),
            max_query_failures: 0,
            cancellable_setup: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_params_use_defaults() {
        let p: SequencerParams =
            util::params::from_str("threshold_rad = 0.02\ncancellable_setup = true").unwrap();

        assert_eq!(p.threshold_rad, 0.02);
        assert!(p.cancellable_setup);
        assert_eq!(p.sample_period(), Duration::from_millis(100));
        assert_eq!(p.max_wait(), Some(Duration::from_secs(60)));
        assert_eq!(p.validate(), Ok(()));
    }

    #[test]
    fn test_huge_max_wait_is_unbounded() {
        let p: SequencerParams = util::params::from_str("max_wait_s = inf").unwrap();
        assert_eq!(p.max_wait(), None);
        assert_eq!(p.validate(), Ok(()));

        let p: SequencerParams = util::params::from_str("max_wait_s = 1e20").unwrap();
        assert_eq!(p.max_wait(), None);

        let p = SequencerParams {
            max_wait_s: None,
            ..Default::default()
        };
        assert_eq!(p.max_wait(), None);
    }

    #[test]
    fn test_invalid_params() {
        let p: SequencerParams = util::params::from_str("max_wait_s = -1.0").unwrap();
        assert_eq!(p.validate(), Err(SequencerParamsError::InvalidMaxWait(-1.0)));

        let p: SequencerParams = util::params::from_str("max_wait_s = nan").unwrap();
        assert!(matches!(
            p.validate(),
            Err(SequencerParamsError::InvalidMaxWait(_))
        ));

        let p: SequencerParams = util::params::from_str("sample_period_s = inf").unwrap();
        assert!(matches!(
            p.validate(),
            Err(SequencerParamsError::InvalidSamplePeriod(_))
        ));

        let p: SequencerParams = util::params::from_str("threshold_rad = 0.0").unwrap();
        assert_eq!(p.validate(), Err(SequencerParamsError::InvalidThreshold(0.0)));
    }
}
