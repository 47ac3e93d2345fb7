//! # Counter library.
//!
//! This library contains everything the counter executable is built from, allowing other crates
//! in the workspace (and the tests) to use the pose catalog, convergence checks and the sequencer
//! without going through the network.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Pose catalog - resolves pose names into joint targets
pub mod catalog;

/// Convergence checks between a target pose and a measured joint state
pub mod convergence;

/// Interfaces to the hand used by the sequencer
pub mod hand_if;

/// Pose sequencer - drives the hand through the counting sequence
pub mod sequencer;

/// Goal host - accepts goals and relays feedback and results
pub mod goal_host;

/// Hand client - publishes position demands to the hand
pub mod hand_client;

/// Joint state client - queries the joint state cache
pub mod joint_state_client;

/// Parameters for the counter executable
pub mod params;
