//! # Pose Catalog
//!
//! The catalog maps pose names onto joint targets. It is built once from the `poses.toml`
//! parameter file and is read-only afterwards, so a single instance can be shared (behind an
//! `Arc`) between the goal host and the sequencer.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::hand::HandDems;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pose with all fingers and the thumb extended, used to open the hand.
pub const HAND_EXTENDED_POS: &str = "hand_extended_pos";

/// First half of the fist, the thumb is brought across the palm.
pub const FIST_STEP1: &str = "fist_step1";

/// Second half of the fist, the fingers close over the thumb.
pub const FIST_STEP2: &str = "fist_step2";

/// Names of the numbered poses, in counting order.
pub const NUMBERED_POSES: [&str; 5] = ["one", "two", "three", "four", "five"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Catalog parameters, as found in `poses.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogParams {
    /// Joints the hand accepts demands for. If empty no joint name check is performed.
    #[serde(default)]
    pub known_joints: Vec<String>,

    /// Pose name to joint targets in radians.
    pub poses: HashMap<String, BTreeMap<String, f64>>,
}

/// A named target configuration of the hand.
///
/// Poses are never empty and never contain non-finite angles. Targets are kept sorted by joint
/// name so aggregations over them are deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    name: String,
    targets: BTreeMap<String, f64>,
}

/// The catalog itself.
#[derive(Debug, Clone)]
pub struct PoseCatalog {
    poses: HashMap<String, Pose>,
}

/// All poses needed by one counting run, resolved up front.
#[derive(Debug, Clone)]
pub struct PoseSequence {
    pub hand_extended: Pose,
    pub fist_step1: Pose,
    pub fist_step2: Pose,

    /// The first `target` numbered poses, in counting order.
    pub numbers: Vec<Pose>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("Unknown pose \"{0}\"")]
    UnknownPose(String),

    #[error("Pose \"{0}\" has no joint targets")]
    EmptyPose(String),

    #[error("Pose \"{pose}\" targets joint \"{joint}\" which is not known to the hand")]
    UnknownJoint { pose: String, joint: String },

    #[error("Pose \"{pose}\" has a non-finite target for joint \"{joint}\"")]
    NonFiniteAngle { pose: String, joint: String },

    #[error("Cannot count to {target}, only {available} numbered poses are defined")]
    TargetOutOfRange { target: u32, available: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("Could not load the pose table: {0}")]
    Load(#[from] util::params::LoadError),

    #[error("Invalid pose table: {0}")]
    Invalid(#[from] CatalogError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    /// Create a new pose, checking that it is not empty and that all targets are finite.
    pub fn new<S: Into<String>>(
        name: S,
        targets: BTreeMap<String, f64>,
    ) -> Result<Self, CatalogError> {
        let name = name.into();

        if targets.is_empty() {
            return Err(CatalogError::EmptyPose(name));
        }

        if let Some((joint, _)) = targets.iter().find(|(_, a)| !a.is_finite()) {
            return Err(CatalogError::NonFiniteAngle {
                pose: name,
                joint: joint.clone(),
            });
        }

        Ok(Self { name, targets })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Joint targets in radians, sorted by joint name.
    pub fn targets(&self) -> &BTreeMap<String, f64> {
        &self.targets
    }

    /// Target of a single joint.
    pub fn target(&self, joint: &str) -> Option<f64> {
        self.targets.get(joint).copied()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false, poses cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Build the demands which command this pose.
    pub fn to_dems(&self) -> HandDems {
        HandDems::from_positions(self.targets.iter().map(|(j, a)| (j.clone(), *a)))
    }
}

impl PoseCatalog {
    /// Build the catalog, validating every pose in the table.
    pub fn new(params: CatalogParams) -> Result<Self, CatalogError> {
        let known: HashSet<&str> = params.known_joints.iter().map(|s| s.as_str()).collect();

        let mut poses = HashMap::with_capacity(params.poses.len());

        for (name, targets) in params.poses {
            if !known.is_empty() {
                if let Some(joint) = targets.keys().find(|j| !known.contains(j.as_str())) {
                    return Err(CatalogError::UnknownJoint {
                        pose: name,
                        joint: joint.clone(),
                    });
                }
            }

            let pose = Pose::new(name.clone(), targets)?;
            poses.insert(name, pose);
        }

        Ok(Self { poses })
    }

    /// Load and validate the pose table from the given parameter file.
    pub fn load(param_file: &str) -> Result<Self, CatalogLoadError> {
        let params: CatalogParams = util::params::load(param_file)?;
        Ok(Self::new(params)?)
    }

    /// Resolve a pose by name.
    pub fn resolve(&self, name: &str) -> Result<Pose, CatalogError> {
        self.poses
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownPose(name.into()))
    }

    /// Returns true if the catalog contains the named pose.
    pub fn contains(&self, name: &str) -> bool {
        self.poses.contains_key(name)
    }

    /// Names of all poses in the catalog, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.poses.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Number of numbered poses that can be counted through.
    ///
    /// Counting must be contiguous, so this is the length of the leading run of
    /// [`NUMBERED_POSES`] present in the catalog.
    pub fn numbered_pose_count(&self) -> u32 {
        NUMBERED_POSES
            .iter()
            .take_while(|n| self.poses.contains_key(**n))
            .count() as u32
    }

    /// Resolve every pose needed to count up to `target`.
    pub fn resolve_goal_sequence(&self, target: u32) -> Result<PoseSequence, CatalogError> {
        if target == 0 || target as usize > NUMBERED_POSES.len() {
            return Err(CatalogError::TargetOutOfRange {
                target,
                available: self.numbered_pose_count(),
            });
        }

        let numbers = NUMBERED_POSES[..target as usize]
            .iter()
            .map(|n| self.resolve(n))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PoseSequence {
            hand_extended: self.resolve(HAND_EXTENDED_POS)?,
            fist_step1: self.resolve(FIST_STEP1)?,
            fist_step2: self.resolve(FIST_STEP2)?,
            numbers,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TEST FIXTURES
// ------------------------------------------------------------------------------------------------

/// Small single-joint catalog used by the tests of this crate.
///
/// Every pose targets `ffj0` only: the setup poses at 0.0, 0.5 and 1.0 and pose `n` at `0.1 * n`.
#[cfg(test)]
pub(crate) fn single_joint_catalog() -> PoseCatalog {
    let mut poses = HashMap::new();

    let mut add = |name: &str, angle: f64| {
        let mut t = BTreeMap::new();
        t.insert("ffj0".to_string(), angle);
        poses.insert(name.to_string(), t);
    };

    add(HAND_EXTENDED_POS, 0.0);
    add(FIST_STEP1, 0.5);
    add(FIST_STEP2, 1.0);
    for (i, n) in NUMBERED_POSES.iter().enumerate() {
        add(n, 0.1 * (i + 1) as f64);
    }

    PoseCatalog::new(CatalogParams {
        known_joints: vec!["ffj0".into()],
        poses,
    })
    .unwrap()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
