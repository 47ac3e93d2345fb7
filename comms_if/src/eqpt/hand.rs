//! # Hand Equipment Messages
//!
//! Demands sent to the hand, raw joint state published by the hand, and the query/response pair
//! used to ask the joint state cache for the latest sample.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Position demands published to the hand.
///
/// Joints not included in the map keep their previous demand.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct HandDems {
    /// The demanded position of each joint.
    ///
    /// Units: radians
    pub pos_rad: HashMap<String, f64>,
}

/// Raw joint state as published by the hand (or the hand simulation).
///
/// Names and positions are parallel arrays, the i-th name corresponds to the i-th position.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JointStateMsg {
    /// Joint names
    pub name: Vec<String>,

    /// Measured position of each named joint.
    ///
    /// Units: radians
    pub position: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Request sent to the joint state cache.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointStateQuery {
    /// Get the most recently received joint state.
    Latest,
}

/// Response from the joint state cache.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum JointStateResponse {
    /// The latest joint state, joint name to measured position in radians.
    State(HashMap<String, f64>),

    /// No joint state has been received by the cache yet.
    NoData,

    /// The query could not be understood.
    Invalid,
}

/// Errors which can occur when interpreting a [`JointStateMsg`].
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum JointStateMsgError {
    #[error("Expected one position per joint name, found {names} names and {positions} positions")]
    LengthMismatch { names: usize, positions: usize },

    #[error("Joint {0} appears more than once in the message")]
    DuplicateJoint(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HandDems {
    /// Build a set of demands from any iterator of joint/position pairs.
    pub fn from_positions<I, S>(positions: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            pos_rad: positions.into_iter().map(|(n, p)| (n.into(), p)).collect(),
        }
    }
}

impl JointStateMsg {
    /// Convert the parallel name/position arrays into a name to position map.
    pub fn to_map(&self) -> Result<HashMap<String, f64>, JointStateMsgError> {
        if self.name.len() != self.position.len() {
            return Err(JointStateMsgError::LengthMismatch {
                names: self.name.len(),
                positions: self.position.len(),
            });
        }

        let mut map = HashMap::with_capacity(self.name.len());

        for (name, pos) in self.name.iter().zip(self.position.iter()) {
            if map.insert(name.clone(), *pos).is_some() {
                return Err(JointStateMsgError::DuplicateJoint(name.clone()));
            }
        }

        Ok(map)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_joint_state_to_map() {
        let msg = JointStateMsg {
            name: vec!["ffj0".into(), "thj1".into()],
            position: vec![0.5, -0.25],
        };

        let map = msg.to_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["ffj0"], 0.5);
        assert_eq!(map["thj1"], -0.25);
    }

    #[test]
    fn test_joint_state_rejects_bad_messages() {
        let short = JointStateMsg {
            name: vec!["ffj0".into(), "thj1".into()],
            position: vec![0.5],
        };
        assert_eq!(
            short.to_map(),
            Err(JointStateMsgError::LengthMismatch { names: 2, positions: 1 })
        );

        let dup = JointStateMsg {
            name: vec!["ffj0".into(), "ffj0".into()],
            position: vec![0.5, 0.6],
        };
        assert_eq!(
            dup.to_map(),
            Err(JointStateMsgError::DuplicateJoint("ffj0".into()))
        );
    }

    #[test]
    fn test_query_wire_format() {
        let resp = JointStateResponse::State(
            vec![("ffj0".to_string(), 0.1)].into_iter().collect()
        );
        let s = serde_json::to_string(&resp).unwrap();
        assert_eq!(s, r#"{"State":{"ffj0":0.1}}"#);

        let q: JointStateQuery = serde_json::from_str(r#""Latest""#).unwrap();
        assert_eq!(q, JointStateQuery::Latest);
    }
}
