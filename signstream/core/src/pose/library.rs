//! Pose Library
//!
//! Static, hand-authored poses for the supported gloss vocabulary. Lookups are
//! case-insensitive and total: any token without an entry resolves to the
//! [`DEFAULT_POSE`], a neutral rest position.

use std::collections::HashMap;

use super::{JointPositions, KeyFrame, Pose, PoseError, Vec3};

/// Name of the neutral rest pose
pub const DEFAULT_POSE: &str = "DEFAULT";

const NEUTRAL_JOINTS: [(&str, Vec3); 4] = [
    ("head", [0.0, 0.0, 0.0]),
    ("right_hand", [0.3, 0.5, 0.0]),
    ("left_hand", [-0.3, 0.5, 0.0]),
    ("torso", [0.0, 0.0, 0.0]),
];

/// Joint positions of the built-in rest pose
#[must_use]
pub fn neutral_joints() -> JointPositions {
    NEUTRAL_JOINTS
        .iter()
        .map(|&(name, pos)| (name.to_string(), pos))
        .collect()
}

/// Token to pose mapping with a guaranteed default
///
/// The default pose lives outside the map so it can be replaced but never
/// removed.
#[derive(Clone, Debug)]
pub struct PoseLibrary {
    poses: HashMap<String, Pose>,
    default: Pose,
}

impl Default for PoseLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PoseLibrary {
    /// Library holding only the default pose
    #[must_use]
    pub fn empty() -> Self {
        Self {
            poses: HashMap::new(),
            default: default_pose(),
        }
    }

    /// Library with the built-in vocabulary
    /// (HELLO, HOW, YOU, THANK-YOU, YES, NO and DEFAULT)
    #[must_use]
    pub fn builtin() -> Self {
        let mut library = Self::empty();
        for pose in [hello(), how(), you(), thank_you(), yes(), no()] {
            library.poses.insert(pose.name.clone(), pose);
        }
        library
    }

    /// Look up the pose for a gloss token
    ///
    /// Case-insensitive; unknown tokens (including the empty string) get the
    /// default pose.
    #[must_use]
    pub fn get_pose(&self, token: &str) -> &Pose {
        let key = token.to_uppercase();
        if key == DEFAULT_POSE {
            return &self.default;
        }
        self.poses.get(&key).unwrap_or(&self.default)
    }

    /// The neutral rest pose
    #[must_use]
    pub fn default_pose(&self) -> &Pose {
        &self.default
    }

    /// Whether a dedicated pose exists for this token
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        let key = token.to_uppercase();
        key == DEFAULT_POSE || self.poses.contains_key(&key)
    }

    /// Add or replace a pose, returning the previous one
    ///
    /// Inserting a pose named `DEFAULT` replaces the rest pose.
    ///
    /// # Errors
    ///
    /// Returns a [`PoseError`] and leaves the library untouched if the pose
    /// fails [`Pose::validate`].
    pub fn insert(&mut self, pose: Pose) -> Result<Option<Pose>, PoseError> {
        pose.validate()?;
        let key = pose.name.to_uppercase();
        if key == DEFAULT_POSE {
            return Ok(Some(std::mem::replace(&mut self.default, pose)));
        }
        Ok(self.poses.insert(key, pose))
    }

    /// Remove a pose; the default pose cannot be removed
    pub fn remove(&mut self, token: &str) -> Option<Pose> {
        let key = token.to_uppercase();
        if key == DEFAULT_POSE {
            return None;
        }
        self.poses.remove(&key)
    }

    /// Sorted list of every token with a pose, including `DEFAULT`
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.poses.keys().cloned().collect();
        names.push(DEFAULT_POSE.to_string());
        names.sort();
        names
    }

    /// Number of poses, including the default pose
    #[must_use]
    pub fn len(&self) -> usize {
        self.poses.len() + 1
    }

    /// Always false: the default pose is always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

// ============================================================================
// Built-in Poses
// ============================================================================

fn hello() -> Pose {
    Pose::from_parts(
        "HELLO",
        vec![
            KeyFrame::new(
                0.0,
                [
                    ("right_hand", [0.3, 0.8, 0.0]),
                    ("right_wrist", [0.35, 0.75, 0.0]),
                    ("head", [0.0, 0.0, 0.05]),
                ],
                0.5,
            ),
            KeyFrame::new(
                0.5,
                [
                    ("right_hand", [0.4, 0.9, 0.1]),
                    ("right_wrist", [0.45, 0.85, 0.1]),
                    ("head", [0.0, 0.0, -0.05]),
                ],
                0.5,
            ),
            KeyFrame::new(
                1.0,
                [
                    ("right_hand", [0.3, 0.8, 0.0]),
                    ("right_wrist", [0.35, 0.75, 0.0]),
                    ("head", [0.0, 0.0, 0.0]),
                ],
                0.3,
            ),
        ],
        0.2,
    )
}

fn how() -> Pose {
    Pose::from_parts(
        "HOW",
        vec![
            KeyFrame::new(
                0.0,
                [
                    ("both_hands", [0.0, 0.6, 0.0]),
                    ("right_hand", [0.2, 0.6, 0.0]),
                    ("left_hand", [-0.2, 0.6, 0.0]),
                    ("eyebrows", [0.0, 0.1, 0.0]),
                ],
                0.8,
            ),
            KeyFrame::new(
                0.8,
                [
                    ("both_hands", [0.0, 0.7, 0.1]),
                    ("right_hand", [0.25, 0.7, 0.1]),
                    ("left_hand", [-0.25, 0.7, 0.1]),
                    ("eyebrows", [0.0, 0.15, 0.0]),
                ],
                0.4,
            ),
        ],
        0.3,
    )
}

fn you() -> Pose {
    Pose::from_parts(
        "YOU",
        vec![
            KeyFrame::new(
                0.0,
                [
                    ("right_hand", [0.0, 0.7, 0.3]),
                    ("right_index", [0.0, 0.75, 0.35]),
                    ("head", [0.0, 0.0, 0.0]),
                    ("eyes", [0.0, 0.0, 0.1]),
                ],
                0.6,
            ),
            KeyFrame::new(
                0.6,
                [
                    ("right_hand", [0.05, 0.7, 0.4]),
                    ("right_index", [0.05, 0.75, 0.45]),
                    ("head", [0.0, 0.02, 0.0]),
                    ("eyes", [0.0, 0.0, 0.15]),
                ],
                0.4,
            ),
        ],
        0.2,
    )
}

fn thank_you() -> Pose {
    Pose::from_parts(
        "THANK-YOU",
        vec![
            KeyFrame::new(
                0.0,
                [
                    ("right_hand", [0.0, 0.9, 0.2]),
                    ("right_palm", [0.0, 0.95, 0.25]),
                    ("head", [0.0, -0.1, 0.0]),
                ],
                0.5,
            ),
            KeyFrame::new(
                0.5,
                [
                    ("right_hand", [0.0, 0.7, 0.4]),
                    ("right_palm", [0.0, 0.75, 0.45]),
                    ("head", [0.0, -0.15, 0.0]),
                ],
                0.8,
            ),
            KeyFrame::new(
                1.3,
                [
                    ("right_hand", [0.0, 0.6, 0.2]),
                    ("right_palm", [0.0, 0.65, 0.25]),
                    ("head", [0.0, 0.0, 0.0]),
                ],
                0.4,
            ),
        ],
        0.3,
    )
}

/// Nod: head and neck dip, rise, settle
fn yes() -> Pose {
    Pose::from_parts(
        "YES",
        vec![
            KeyFrame::new(0.0, [("head", [0.0, 0.0, 0.0]), ("neck", [0.0, 0.0, 0.0])], 0.2),
            KeyFrame::new(0.2, [("head", [0.0, -0.2, 0.0]), ("neck", [0.0, -0.1, 0.0])], 0.3),
            KeyFrame::new(0.5, [("head", [0.0, 0.1, 0.0]), ("neck", [0.0, 0.05, 0.0])], 0.3),
            KeyFrame::new(0.8, [("head", [0.0, 0.0, 0.0]), ("neck", [0.0, 0.0, 0.0])], 0.2),
        ],
        0.1,
    )
}

/// Shake: head and neck swing left, right, settle
fn no() -> Pose {
    Pose::from_parts(
        "NO",
        vec![
            KeyFrame::new(0.0, [("head", [0.0, 0.0, 0.0]), ("neck", [0.0, 0.0, 0.0])], 0.1),
            KeyFrame::new(0.1, [("head", [-0.15, 0.0, 0.0]), ("neck", [-0.1, 0.0, 0.0])], 0.3),
            KeyFrame::new(0.4, [("head", [0.15, 0.0, 0.0]), ("neck", [0.1, 0.0, 0.0])], 0.3),
            KeyFrame::new(0.7, [("head", [0.0, 0.0, 0.0]), ("neck", [0.0, 0.0, 0.0])], 0.2),
        ],
        0.1,
    )
}

fn default_pose() -> Pose {
    Pose::from_parts(
        DEFAULT_POSE,
        vec![KeyFrame::new(0.0, NEUTRAL_JOINTS, 1.0)],
        0.2,
    )
}
