// src/config.rs - Tunable constants for the board, hands and session

/// When a hand is allowed to report a grab or release edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmissionPolicy {
    /// Report every edge unless the hand is unstable.
    Immediate,
    /// Additionally wait out a grace period after the hand appears and a
    /// stability period after every state change.
    Debounced {
        grace_timer_threshold: u32,
        stability_timer_threshold: u32,
    },
}

impl EmissionPolicy {
    pub fn debounced() -> Self {
        EmissionPolicy::Debounced {
            grace_timer_threshold: 1,
            stability_timer_threshold: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Cell size used when calibration finds no reference shape.
    pub default_side_length: u32,
    /// Reserved: how much smaller than the side length a contour may be.
    pub side_deviation_threshold: f64,
    /// Reserved: board edge band (board / ratio) treated as held items.
    pub border_ratio: u32,
    /// Tag journaled for every placed item.
    pub default_tag: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            default_side_length: 30,
            side_deviation_threshold: 0.8,
            border_ratio: 6,
            default_tag: "wood".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HandConfig {
    /// Wrist travel below `side * still_fraction` counts as standing still.
    pub still_fraction: f64,
    /// Wrist travel at or past `side * moving_fraction` is a different hand.
    pub moving_fraction: f64,
    pub pinch_low: f64,
    /// Pinch upper bound as a multiple of the side length; roomy enough to
    /// hold an item by its diagonal.
    pub pinch_high_factor: f64,
    /// Largest orientation change still accepted as the same hand.
    pub rotation_threshold: f64,
    /// Handedness confidence needed to overwrite the sticky best guess.
    pub best_hand_confidence: f64,
    /// Fraction of landmarks that must jump for the hand to count as unstable.
    pub spazzing_ratio: f64,
    /// Frames of continuous instability before a warning is logged.
    pub spazzing_threshold: u32,
    /// Calm frames needed before an unstable hand may report again.
    pub focused_threshold: u32,
    pub policy: EmissionPolicy,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            still_fraction: 0.25,
            moving_fraction: 0.5,
            pinch_low: 0.0,
            pinch_high_factor: 2.0,
            rotation_threshold: 0.25,
            best_hand_confidence: 0.7,
            spazzing_ratio: 0.4,
            spazzing_threshold: 300,
            focused_threshold: 60,
            policy: EmissionPolicy::Immediate,
        }
    }
}

impl HandConfig {
    /// `[still, moving]` wrist travel bounds for a board cell size.
    pub fn distance_bounds(&self, side_length: u32) -> [f64; 2] {
        let side = side_length as f64;
        [side * self.still_fraction, side * self.moving_fraction]
    }

    /// Exclusive thumb-to-index distance range that counts as a pinch.
    pub fn pinch_bounds(&self, side_length: u32) -> [f64; 2] {
        [self.pinch_low, side_length as f64 * self.pinch_high_factor]
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub board: BoardConfig,
    pub hand: HandConfig,
    /// Two hands overlap when more than `21 * overlap_ratio` landmark pairs
    /// sit within the still distance of each other.
    pub overlap_ratio: f64,
    /// Consecutive empty frames after which the session flags itself idle.
    pub idle_trigger_frames: u32,
    /// Re-read the surface for placed items whenever the session goes idle.
    pub reconcile_when_idle: bool,
    /// Frame size assumed when replaying landmarks without images.
    pub frame_size: (u32, u32),
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            board: BoardConfig::default(),
            hand: HandConfig::default(),
            overlap_ratio: 0.2,
            idle_trigger_frames: 10,
            reconcile_when_idle: false,
            frame_size: (640, 480),
        }
    }
}
