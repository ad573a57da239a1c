//! Timeline Builder
//!
//! Flattens a sequence of gloss tokens into one time-ordered keyframe list.
//!
//! ```text
//!   HELLO                      YOU                 rest
//!   |kf0----|kf1----|kf2--|~~~~|kf0-----|kf1---|    |kf|
//!   0                     1.3  1.5              2.5 3.0
//!                         ^^^^ transition (HELLO -> YOU)
//! ```
//!
//! The clock only moves forward, so timestamps are non-decreasing. A trailing
//! rest keyframe is always appended, so even an empty token list yields one
//! frame.

use serde::{Deserialize, Serialize};

use crate::pose::library::neutral_joints;
use crate::pose::{KeyFrame, PoseLibrary, TransitionTable, DEFAULT_POSE};

/// Gap between the last sign and the trailing rest keyframe
pub const REST_GAP_SECS: f64 = 0.5;

/// Duration of the trailing rest keyframe
pub const REST_DURATION_SECS: f64 = 0.5;

/// Split a gloss string into tokens
///
/// Splits on any whitespace and keeps hyphenated compounds intact.
#[must_use]
pub fn parse_gloss(gloss: &str) -> Vec<String> {
    gloss.split_whitespace().map(str::to_string).collect()
}

/// Ordered keyframes for a whole utterance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    keyframes: Vec<KeyFrame>,
}

impl Timeline {
    /// All keyframes in playback order
    #[must_use]
    pub fn keyframes(&self) -> &[KeyFrame] {
        &self.keyframes
    }

    /// Number of keyframes
    #[must_use]
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Whether the timeline has no keyframes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Last keyframe timestamp plus its duration
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.keyframes
            .last()
            .map_or(0.0, |kf| kf.timestamp + kf.duration)
    }

    /// Consume the timeline, returning its keyframes
    #[must_use]
    pub fn into_keyframes(self) -> Vec<KeyFrame> {
        self.keyframes
    }
}

/// Builds timelines from a pose library and transition table
#[derive(Clone, Copy, Debug)]
pub struct TimelineBuilder<'a> {
    library: &'a PoseLibrary,
    transitions: &'a TransitionTable,
}

impl<'a> TimelineBuilder<'a> {
    /// Create a builder over the given lookup tables
    #[must_use]
    pub fn new(library: &'a PoseLibrary, transitions: &'a TransitionTable) -> Self {
        Self {
            library,
            transitions,
        }
    }

    /// Build the timeline for an ordered token sequence
    #[must_use]
    pub fn build<S: AsRef<str>>(&self, tokens: &[S]) -> Timeline {
        let mut keyframes = Vec::new();
        let mut clock = 0.0_f64;
        let mut previous = DEFAULT_POSE;

        for (i, token) in tokens.iter().enumerate() {
            let token = token.as_ref();
            if i > 0 {
                clock += self.transitions.get_transition_duration(previous, token);
            }

            let pose = self.library.get_pose(token);
            keyframes.extend(pose.keyframes.iter().map(|kf| kf.shifted(clock)));

            clock += pose.total_duration();
            previous = token;
        }

        let rest = self
            .library
            .default_pose()
            .keyframes
            .first()
            .map_or_else(neutral_joints, |kf| kf.joint_positions.clone());
        keyframes.push(KeyFrame {
            timestamp: clock + REST_GAP_SECS,
            joint_positions: rest,
            duration: REST_DURATION_SECS,
        });

        Timeline { keyframes }
    }
}
