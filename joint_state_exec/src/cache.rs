//! # Joint State Cache
//!
//! Holds the most recent joint state published by the hand so that it can be queried at any time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::hand::{JointStateMsg, JointStateMsgError, JointStateQuery, JointStateResponse};
use std::collections::HashMap;
use std::time::{Duration, Instant};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct JointStateCache {
    latest: Option<Sample>,

    stale_after: Option<Duration>,

    /// Number of messages accepted into the cache
    pub num_accepted: u64,

    /// Number of messages rejected as invalid
    pub num_rejected: u64,
}

#[derive(Debug)]
struct Sample {
    state: HashMap<String, f64>,
    received: Instant,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointStateCache {
    pub fn new(stale_after: Option<Duration>) -> Self {
        Self {
            stale_after,
            ..Default::default()
        }
    }

    /// Replace the cached state with the one in the message.
    ///
    /// Invalid messages are rejected and leave the cache untouched.
    pub fn update(&mut self, msg: &JointStateMsg) -> Result<(), JointStateMsgError> {
        self.update_at(msg, Instant::now())
    }

    /// Answer a query from the cache.
    pub fn respond(&self, query: &JointStateQuery) -> JointStateResponse {
        self.respond_at(query, Instant::now())
    }

    fn update_at(&mut self, msg: &JointStateMsg, now: Instant) -> Result<(), JointStateMsgError> {
        match msg.to_map() {
            Ok(state) => {
                self.latest = Some(Sample {
                    state,
                    received: now,
                });
                self.num_accepted += 1;
                Ok(())
            }
            Err(e) => {
                self.num_rejected += 1;
                Err(e)
            }
        }
    }

    fn respond_at(&self, query: &JointStateQuery, now: Instant) -> JointStateResponse {
        match query {
            JointStateQuery::Latest => match &self.latest {
                Some(s) if !self.is_stale(s, now) => JointStateResponse::State(s.state.clone()),
                _ => JointStateResponse::NoData,
            },
        }
    }

    fn is_stale(&self, sample: &Sample, now: Instant) -> bool {
        match self.stale_after {
            Some(max) => now.saturating_duration_since(sample.received) > max,
            None => false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
