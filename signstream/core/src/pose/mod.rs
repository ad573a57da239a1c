//! Pose Data Model
//!
//! Keyframes and poses are the authored building blocks of every animation.
//! A [`Pose`] is the keyframe sequence for one gloss token; the
//! [`PoseLibrary`] maps tokens to poses and the [`TransitionTable`] decides
//! how long the avatar takes to move from one pose into the next.
//!
//! # Coordinate Space
//!
//! Joint positions are `[x, y, z]` triples in a normalized space where the
//! body centre sits at the origin and hands reach roughly `[-1, 1]` on each
//! axis. Joint maps are ordered so that equal poses always serialize to the
//! same bytes.

pub mod library;
pub mod transitions;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use library::{PoseLibrary, DEFAULT_POSE};
pub use transitions::{TransitionError, TransitionTable, DEFAULT_TRANSITION_SECS};

/// A joint position in normalized avatar space
pub type Vec3 = [f64; 3];

/// Joint name to position mapping for a single keyframe
pub type JointPositions = BTreeMap<String, Vec3>;

/// A single animation keyframe
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame {
    /// Seconds from the start of the owning sequence
    pub timestamp: f64,
    /// Target joint positions at this keyframe
    pub joint_positions: JointPositions,
    /// Seconds this frame holds or interpolates towards the next one
    pub duration: f64,
}

impl KeyFrame {
    /// Create a keyframe from a timestamp, joint list and duration
    #[must_use]
    pub fn new<'a>(
        timestamp: f64,
        joints: impl IntoIterator<Item = (&'a str, Vec3)>,
        duration: f64,
    ) -> Self {
        Self {
            timestamp,
            joint_positions: joints
                .into_iter()
                .map(|(name, pos)| (name.to_string(), pos))
                .collect(),
            duration,
        }
    }

    /// Copy of this keyframe shifted forward by `offset` seconds
    #[must_use]
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            timestamp: offset + self.timestamp,
            joint_positions: self.joint_positions.clone(),
            duration: self.duration,
        }
    }

    /// Whether every joint coordinate is a finite number
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.duration.is_finite()
            && self
                .joint_positions
                .values()
                .all(|pos| pos.iter().all(|c| c.is_finite()))
    }
}

/// Errors raised when authoring a pose
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoseError {
    /// A pose needs at least one keyframe
    #[error("pose {0} has no keyframes")]
    Empty(String),

    /// The first keyframe must start at zero
    #[error("pose {name} starts at {timestamp}s, expected 0")]
    NonZeroStart {
        /// Pose name
        name: String,
        /// Offending first timestamp
        timestamp: f64,
    },

    /// Keyframe durations must be positive and finite
    #[error("pose {name} keyframe {index} has invalid duration {duration}")]
    InvalidDuration {
        /// Pose name
        name: String,
        /// Keyframe index within the pose
        index: usize,
        /// Offending duration
        duration: f64,
    },

    /// Keyframe timestamps must be numbers that never go backwards
    #[error("pose {name} keyframe {index} goes back in time")]
    OutOfOrder {
        /// Pose name
        name: String,
        /// Keyframe index within the pose
        index: usize,
    },
}

/// The keyframe sequence for one gloss token
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Gloss token this pose renders (uppercase)
    pub name: String,
    /// Ordered keyframes; the first one starts at zero
    pub keyframes: Vec<KeyFrame>,
    /// Authored default transition time into this pose
    pub transition_duration: f64,
}

impl Pose {
    /// Create a validated pose
    ///
    /// The name is uppercased so lookups stay case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns the first [`PoseError`] found by [`Pose::validate`].
    pub fn new(
        name: impl Into<String>,
        keyframes: Vec<KeyFrame>,
        transition_duration: f64,
    ) -> Result<Self, PoseError> {
        let pose = Self::from_parts(name.into().to_uppercase(), keyframes, transition_duration);
        pose.validate()?;
        Ok(pose)
    }

    /// Check the keyframe structure of a pose
    ///
    /// Joint coordinates are not checked here; non-finite joints surface when
    /// the animation is packaged.
    ///
    /// # Errors
    ///
    /// Returns a [`PoseError`] if the keyframe list is empty, does not start at
    /// zero, has a duration that is not a positive finite number or goes back
    /// in time.
    pub fn validate(&self) -> Result<(), PoseError> {
        let name = &self.name;
        let Some(first) = self.keyframes.first() else {
            return Err(PoseError::Empty(name.clone()));
        };
        if first.timestamp != 0.0 {
            return Err(PoseError::NonZeroStart {
                name: name.clone(),
                timestamp: first.timestamp,
            });
        }

        for (index, frame) in self.keyframes.iter().enumerate() {
            if frame.duration <= 0.0 || !frame.duration.is_finite() {
                return Err(PoseError::InvalidDuration {
                    name: name.clone(),
                    index,
                    duration: frame.duration,
                });
            }
            if index > 0 && (frame.timestamp.is_nan() || frame.timestamp < self.keyframes[index - 1].timestamp) {
                return Err(PoseError::OutOfOrder {
                    name: name.clone(),
                    index,
                });
            }
        }
        Ok(())
    }

    /// Build a pose from trusted built-in data without validation
    pub(crate) fn from_parts(
        name: impl Into<String>,
        keyframes: Vec<KeyFrame>,
        transition_duration: f64,
    ) -> Self {
        Self {
            name: name.into(),
            keyframes,
            transition_duration,
        }
    }

    /// Sum of all keyframe durations
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.keyframes.iter().map(|kf| kf.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp: f64, duration: f64) -> KeyFrame {
        KeyFrame::new(timestamp, [("head", [0.0, 0.0, 0.0])], duration)
    }

    #[test]
    fn test_pose_name_is_uppercased() {
        let pose = Pose::new("wave", vec![frame(0.0, 0.5)], 0.2).unwrap();
        assert_eq!(pose.name, "WAVE");
    }

    #[test]
    fn test_pose_rejects_empty() {
        let err = Pose::new("WAVE", Vec::new(), 0.2).unwrap_err();
        assert_eq!(err, PoseError::Empty("WAVE".to_string()));
    }

    #[test]
    fn test_pose_rejects_late_start() {
        let err = Pose::new("WAVE", vec![frame(0.1, 0.5)], 0.2).unwrap_err();
        assert!(matches!(err, PoseError::NonZeroStart { .. }));
    }

    #[test]
    fn test_pose_rejects_zero_duration() {
        let err = Pose::new("WAVE", vec![frame(0.0, 0.5), frame(0.5, 0.0)], 0.2).unwrap_err();
        assert!(matches!(err, PoseError::InvalidDuration { index: 1, .. }));
    }

    #[test]
    fn test_pose_rejects_backwards_timestamps() {
        let err = Pose::new("WAVE", vec![frame(0.0, 0.5), frame(0.6, 0.5), frame(0.4, 0.5)], 0.2)
            .unwrap_err();
        assert!(matches!(err, PoseError::OutOfOrder { index: 2, .. }));
    }

    #[test]
    fn test_validate_catches_hand_built_poses() {
        let negative = Pose {
            name: "WAVE".to_string(),
            keyframes: vec![frame(0.0, -1.0)],
            transition_duration: 0.2,
        };
        assert!(matches!(
            negative.validate(),
            Err(PoseError::InvalidDuration { index: 0, .. })
        ));

        let nan_timestamp = Pose {
            name: "WAVE".to_string(),
            keyframes: vec![frame(0.0, 0.5), frame(f64::NAN, 0.5)],
            transition_duration: 0.2,
        };
        assert!(matches!(
            nan_timestamp.validate(),
            Err(PoseError::OutOfOrder { index: 1, .. })
        ));

        let infinite = Pose::new("WAVE", vec![frame(0.0, f64::INFINITY)], 0.2);
        assert!(infinite.is_err());
    }

    #[test]
    fn test_shifted_keeps_joints_and_duration() {
        let kf = KeyFrame::new(0.5, [("right_hand", [0.3, 0.8, 0.0])], 0.25);
        let moved = kf.shifted(2.0);
        assert_eq!(moved.timestamp, 2.5);
        assert_eq!(moved.duration, 0.25);
        assert_eq!(moved.joint_positions, kf.joint_positions);
    }

    #[test]
    fn test_is_finite_detects_nan_joint() {
        let kf = KeyFrame::new(0.0, [("head", [f64::NAN, 0.0, 0.0])], 0.5);
        assert!(!kf.is_finite());
        assert!(frame(0.0, 0.5).is_finite());
    }

    #[test]
    fn test_total_duration() {
        let pose = Pose::new("WAVE", vec![frame(0.0, 0.5), frame(0.5, 0.25)], 0.2).unwrap();
        assert!((pose.total_duration() - 0.75).abs() < 1e-12);
    }
}
