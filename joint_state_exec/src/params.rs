//! # Joint State Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JointStateExecParams {
    /// Maximum time to wait for activity on either socket before checking for shutdown.
    ///
    /// Units: milliseconds
    pub poll_timeout_ms: i64,

    /// If set, a sample older than this is no longer served and queries get `NoData` instead.
    ///
    /// Units: seconds
    pub stale_after_s: Option<f64>,
}

impl Default for JointStateExecParams {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            stale_after_s: None,
        }
    }
}
