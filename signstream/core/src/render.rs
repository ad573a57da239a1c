//! Frame Renderer
//!
//! Turns keyframes into transport-ready frames. Each frame carries its timing
//! metadata, the raw joint positions and a flat SVG figure drawn from three
//! joints (head and both hands) on a fixed canvas.
//!
//! # Canvas Mapping
//!
//! ```text
//!   head_x = w/2 + x * w * 0.3        hand_x = w/2 + x * w
//!   head_y = h * 0.25 + y * h * 0.1   hand_y = h * 0.4 + (1 - y) * h * 0.4
//! ```
//!
//! Joints missing from a keyframe are drawn at fixed neutral coordinates.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::codec::base64_encode;
use crate::pose::{JointPositions, KeyFrame, Vec3};

/// Default canvas width in pixels
pub const DEFAULT_WIDTH: u32 = 400;

/// Default canvas height in pixels
pub const DEFAULT_HEIGHT: u32 = 600;

const NEUTRAL_HEAD: Vec3 = [0.0, 0.0, 0.0];
const NEUTRAL_RIGHT_HAND: Vec3 = [0.3, 0.5, 0.0];
const NEUTRAL_LEFT_HAND: Vec3 = [-0.3, 0.5, 0.0];

const SKIN: &str = "#fdbcb4";
const INK: &str = "#333";

/// How the client should move from this frame to the next
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Blend linearly towards the next frame
    Linear,
    /// Hold this frame (last frame of a sequence)
    Hold,
}

/// Self-contained vector snapshot of one frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisualFrame {
    /// Image kind, always `svg`
    #[serde(rename = "type")]
    pub kind: String,
    /// `data:image/svg+xml;base64,...` URI of the image
    pub data_url: String,
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// Raw SVG markup
    pub svg_content: String,
}

/// One frame ready for transport
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedFrame {
    /// Zero-based position in the sequence
    pub frame_number: usize,
    /// Seconds from sequence start
    pub timestamp: f64,
    /// Seconds this frame holds or interpolates
    pub duration: f64,
    /// Joint positions copied from the keyframe
    pub joint_positions: JointPositions,
    /// Interpolation towards the next frame
    pub interpolation: Interpolation,
    /// Vector snapshot
    #[serde(rename = "visual_frame")]
    pub visual: VisualFrame,
}

/// Draws keyframes onto a fixed-size canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRenderer {
    width: u32,
    height: u32,
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl FrameRenderer {
    /// Create a renderer for a `width` x `height` canvas
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Canvas width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Render the keyframe at `index` of a `total_frames` long sequence
    #[must_use]
    pub fn render_frame(&self, keyframe: &KeyFrame, index: usize, total_frames: usize) -> RenderedFrame {
        let interpolation = if index + 1 < total_frames {
            Interpolation::Linear
        } else {
            Interpolation::Hold
        };

        RenderedFrame {
            frame_number: index,
            timestamp: keyframe.timestamp,
            duration: keyframe.duration,
            joint_positions: keyframe.joint_positions.clone(),
            interpolation,
            visual: self.visual_frame(keyframe, index),
        }
    }

    /// Render a whole keyframe sequence
    #[must_use]
    pub fn render_all(&self, keyframes: &[KeyFrame]) -> Vec<RenderedFrame> {
        let total = keyframes.len();
        keyframes
            .iter()
            .enumerate()
            .map(|(i, kf)| self.render_frame(kf, i, total))
            .collect()
    }

    fn visual_frame(&self, keyframe: &KeyFrame, frame_number: usize) -> VisualFrame {
        let svg_content = self.svg(keyframe, frame_number);
        VisualFrame {
            kind: "svg".to_string(),
            data_url: format!("data:image/svg+xml;base64,{}", base64_encode(svg_content.as_bytes())),
            width: self.width,
            height: self.height,
            svg_content,
        }
    }

    fn svg(&self, keyframe: &KeyFrame, frame_number: usize) -> String {
        let joint = |name: &str, neutral: Vec3| {
            keyframe.joint_positions.get(name).copied().unwrap_or(neutral)
        };
        let (head_x, head_y) = self.head_point(joint("head", NEUTRAL_HEAD));
        let (rh_x, rh_y) = self.hand_point(joint("right_hand", NEUTRAL_RIGHT_HAND));
        let (lh_x, lh_y) = self.hand_point(joint("left_hand", NEUTRAL_LEFT_HAND));

        let (w, h) = (self.width, self.height);
        let (cx, cy) = (i64::from(w / 2), i64::from(h / 2));

        let mut svg = String::with_capacity(1600);
        // Writing into a String cannot fail
        let _ = write!(
            svg,
            concat!(
                r#"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">"#,
                r##"<rect width="{w}" height="{h}" fill="#f0f8ff"/>"##,
                r#"<ellipse cx="{cx}" cy="{cy}" rx="40" ry="80" fill="{skin}" stroke="{ink}" stroke-width="2"/>"#,
                r#"<circle cx="{hx}" cy="{hy}" r="35" fill="{skin}" stroke="{ink}" stroke-width="2"/>"#,
                r#"<circle cx="{eye_l}" cy="{eye_y}" r="3" fill="{ink}"/>"#,
                r#"<circle cx="{eye_r}" cy="{eye_y}" r="3" fill="{ink}"/>"#,
                r#"<ellipse cx="{hx}" cy="{nose_y}" rx="2" ry="4" fill="{ink}"/>"#,
                r#"<path d="M {mouth_l} {mouth_y} Q {hx} {mouth_q} {mouth_r} {mouth_y}" stroke="{ink}" stroke-width="2" fill="none"/>"#,
                r#"<line x1="{arm_r}" y1="{shoulder}" x2="{rh_x}" y2="{rh_y}" stroke="{skin}" stroke-width="15" stroke-linecap="round"/>"#,
                r#"<line x1="{arm_l}" y1="{shoulder}" x2="{lh_x}" y2="{lh_y}" stroke="{skin}" stroke-width="15" stroke-linecap="round"/>"#,
                r#"<circle cx="{rh_x}" cy="{rh_y}" r="12" fill="{skin}" stroke="{ink}" stroke-width="2"/>"#,
                r#"<circle cx="{lh_x}" cy="{lh_y}" r="12" fill="{skin}" stroke="{ink}" stroke-width="2"/>"#,
                r##"<text x="10" y="25" font-family="Arial" font-size="14" fill="#666">Frame {frame}</text>"##,
                r##"<text x="10" y="45" font-family="Arial" font-size="12" fill="#666">T: {ts:.2}s</text>"##,
                "</svg>",
            ),
            w = w,
            h = h,
            cx = cx,
            cy = cy,
            skin = SKIN,
            ink = INK,
            hx = head_x,
            hy = head_y,
            eye_l = head_x - 12,
            eye_r = head_x + 12,
            eye_y = head_y - 5,
            nose_y = head_y + 5,
            mouth_l = head_x - 8,
            mouth_r = head_x + 8,
            mouth_y = head_y + 15,
            mouth_q = head_y + 20,
            arm_r = cx + 25,
            arm_l = cx - 25,
            shoulder = cy - 40,
            rh_x = rh_x,
            rh_y = rh_y,
            lh_x = lh_x,
            lh_y = lh_y,
            frame = frame_number,
            ts = keyframe.timestamp,
        );
        svg
    }

    #[allow(clippy::cast_possible_truncation)]
    fn head_point(&self, pos: Vec3) -> (i64, i64) {
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let x = i64::from(self.width / 2) + (pos[0] * w * 0.3) as i64;
        let y = (h * 0.25 + pos[1] * h * 0.1) as i64;
        (x, y)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn hand_point(&self, pos: Vec3) -> (i64, i64) {
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let x = i64::from(self.width / 2) + (pos[0] * w) as i64;
        let y = (h * 0.4 + (1.0 - pos[1]) * h * 0.4) as i64;
        (x, y)
    }
}
