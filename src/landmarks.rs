// src/landmarks.rs - Per-frame hand observations as produced by the detector
use crate::geometry::{self, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of points in one detected hand.
pub const LANDMARK_COUNT: usize = 21;

// MediaPipe hand landmark indices
pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

pub type Landmarks = [Point; LANDMARK_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    #[serde(alias = "left")]
    Left,
    #[serde(alias = "right")]
    Right,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Left => write!(f, "left"),
            Handedness::Right => write!(f, "right"),
        }
    }
}

/// One detected hand in one frame, already in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub landmarks: Landmarks,
    pub handedness: Handedness,
    /// Detector confidence in `handedness`, 0..1.
    pub confidence: f64,
}

impl Observation {
    pub fn new(landmarks: Landmarks, handedness: Handedness, confidence: f64) -> Self {
        Self {
            landmarks,
            handedness,
            confidence,
        }
    }

    /// Build from a point list of arbitrary length. Returns `None` unless
    /// exactly [`LANDMARK_COUNT`] points are given.
    pub fn from_points(points: &[Point], handedness: Handedness, confidence: f64) -> Option<Self> {
        let landmarks: Landmarks = points.try_into().ok()?;
        Some(Self::new(landmarks, handedness, confidence))
    }

    pub fn wrist(&self) -> Point {
        self.landmarks[WRIST]
    }

    pub fn thumb_tip(&self) -> Point {
        self.landmarks[THUMB_TIP]
    }

    pub fn index_tip(&self) -> Point {
        self.landmarks[INDEX_TIP]
    }

    /// Thumb-tip to index-fingertip distance.
    pub fn pinch_distance(&self) -> f64 {
        geometry::finger_to_finger_distance(&self.landmarks, 1, 2)
    }

    /// Where a pinched item would be picked up or dropped.
    pub fn pinch_midpoint(&self) -> Point {
        geometry::midpoint(&self.landmarks[THUMB_TIP], &self.landmarks[INDEX_TIP])
    }

    /// Orientation of the hand from the wrist to the middle fingertip,
    /// squashed into (-1, 1).
    pub fn slope(&self) -> f64 {
        let wrist = self.landmarks[WRIST];
        let tip = self.landmarks[MIDDLE_TIP];
        let dx = wrist.x - tip.x;
        let dy = wrist.y - tip.y;
        if dx == 0.0 {
            // Vertical hand: the limit of tanh as the ratio diverges
            if dy == 0.0 {
                0.0
            } else {
                dy.signum()
            }
        } else {
            (dy / dx).tanh()
        }
    }
}

/// Which fingers look extended, judged from joint ordering in the image.
///
/// A finger counts as open when both its last two joints lie above (lower
/// image coordinate than) the joint two before the tip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerOpenness {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerOpenness {
    pub fn from_landmarks(lm: &Landmarks) -> Self {
        let above = |pivot: usize, a: usize, b: usize| lm[a].y < lm[pivot].y && lm[b].y < lm[pivot].y;
        let left_of = |pivot: usize, a: usize, b: usize| lm[a].x < lm[pivot].x && lm[b].x < lm[pivot].x;

        Self {
            thumb: left_of(THUMB_MCP, THUMB_IP, THUMB_TIP),
            index: above(INDEX_PIP, INDEX_DIP, INDEX_TIP) || left_of(INDEX_PIP, INDEX_DIP, INDEX_TIP),
            middle: above(MIDDLE_PIP, MIDDLE_DIP, MIDDLE_TIP),
            ring: above(RING_PIP, RING_DIP, RING_TIP),
            pinky: above(PINKY_PIP, PINKY_DIP, PINKY_TIP),
        }
    }
}
