//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the counting demo software: the messages
//! exchanged with the hand and the joint state cache, the goal protocol spoken by the counter
//! executable, and the networking layer they travel over.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Goal, feedback and result messages for the counting action
pub mod action;

/// Command and state definitions for equipment (the hand)
pub mod eqpt;

/// Network module
pub mod net;
