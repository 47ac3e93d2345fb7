//! # Simulated Hand Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::BTreeMap;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
pub struct HandSimExecParams {
    /// Period of the simulation cycle, a joint state is published every cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Maximum rotation rate of every joint.
    ///
    /// Units: radians/second
    pub max_rate_rads: f64,

    /// Joints of the simulated hand and their position at startup.
    ///
    /// Units: radians
    pub initial_pos_rad: BTreeMap<String, f64>,
}
