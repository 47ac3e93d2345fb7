//! # Simulated Hand
//!
//! Every joint moves towards its demanded position at no more than the configured rate. There is
//! no dynamics, the position is reached exactly once it is within one cycle's travel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::hand::{HandDems, JointStateMsg};
use log::warn;
use std::collections::BTreeMap;

use crate::params::HandSimExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SimHand {
    /// Maximum travel of a joint in one cycle
    ///
    /// Units: radians
    max_step_rad: f64,

    current_pos_rad: BTreeMap<String, f64>,

    target_pos_rad: BTreeMap<String, f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimHand {
    pub fn new(params: &HandSimExecParams) -> Self {
        Self {
            max_step_rad: (params.max_rate_rads * params.cycle_period_s).abs(),
            current_pos_rad: params.initial_pos_rad.clone(),
            target_pos_rad: params.initial_pos_rad.clone(),
        }
    }

    /// Set new targets. Joints not in the demands keep their previous target, joints the hand
    /// does not have are ignored.
    pub fn set_demands(&mut self, dems: &HandDems) {
        for (joint, pos) in dems.pos_rad.iter() {
            match self.target_pos_rad.get_mut(joint) {
                Some(t) if pos.is_finite() => *t = *pos,
                Some(_) => warn!("Ignoring non-finite demand for joint {}", joint),
                None => warn!("Ignoring demand for unknown joint {}", joint),
            }
        }
    }

    /// Advance the simulation by one cycle.
    pub fn step(&mut self) {
        for (joint, current) in self.current_pos_rad.iter_mut() {
            if let Some(target) = self.target_pos_rad.get(joint) {
                *current += (target - *current).clamp(-self.max_step_rad, self.max_step_rad);
            }
        }
    }

    /// Returns true if every joint is at its target.
    pub fn settled(&self) -> bool {
        self.current_pos_rad
            .iter()
            .all(|(j, c)| self.target_pos_rad.get(j) == Some(c))
    }

    pub fn joint_state(&self) -> JointStateMsg {
        JointStateMsg {
            name: self.current_pos_rad.keys().cloned().collect(),
            position: self.current_pos_rad.values().cloned().collect(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn params() -> HandSimExecParams {
        let mut initial_pos_rad = BTreeMap::new();
        initial_pos_rad.insert("ffj0".to_string(), 0.0);
        initial_pos_rad.insert("thj1".to_string(), 0.5);

        HandSimExecParams {
            cycle_period_s: 0.1,
            max_rate_rads: 2.0,
            initial_pos_rad,
        }
    }

    fn dems(pairs: &[(&str, f64)]) -> HandDems {
        HandDems {
            pos_rad: pairs
                .iter()
                .map(|(j, p)| (j.to_string(), *p))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_rate_limited_motion() {
        let mut hand = SimHand::new(&params());
        assert!(hand.settled());

        hand.set_demands(&dems(&[("ffj0", 0.5)]));
        assert!(!hand.settled());

        // 0.2 rad per cycle
        hand.step();
        assert!((hand.current_pos_rad["ffj0"] - 0.2).abs() < 1e-12);
        hand.step();
        hand.step();
        assert_eq!(hand.current_pos_rad["ffj0"], 0.5);
        assert!(hand.settled());

        // Untouched joint
        assert_eq!(hand.current_pos_rad["thj1"], 0.5);
    }

    #[test]
    fn test_unknown_joints_ignored() {
        let mut hand = SimHand::new(&params());
        hand.set_demands(&dems(&[("wrj9", 1.0), ("ffj0", f64::NAN)]));

        hand.step();
        assert!(hand.settled());
        assert_eq!(hand.joint_state().name, vec!["ffj0", "thj1"]);
    }

    #[test]
    fn test_joint_state_msg_is_valid() {
        let hand = SimHand::new(&params());
        let state = hand.joint_state().to_map().unwrap();
        assert_eq!(state["thj1"], 0.5);
    }
}
