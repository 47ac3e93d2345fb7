//! Parameters structure for the counter executable

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::{goal_host::GoalHostParams, sequencer::SequencerParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the counter executable, loaded from `counter_exec.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct CounterExecParams {
    /// Parameter file holding the pose table
    pub poses_file: String,

    #[serde(default)]
    pub sequencer: SequencerParams,

    #[serde(default)]
    pub goal_host: GoalHostParams,
}
