// src/hand.rs - One tracked hand: identity, pinch classification and debounce timers
use crate::config::{EmissionPolicy, HandConfig};
use crate::geometry::{self, Point};
use crate::landmarks::{FingerOpenness, Handedness, Landmarks, Observation, LANDMARK_COUNT};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionKind {
    /// Thumb and index closed on an item.
    Grab,
    /// Thumb and index opened again.
    Release,
}

impl TransitionKind {
    pub fn is_release(self) -> bool {
        self == TransitionKind::Release
    }
}

/// A grab or release edge located between the thumb and index fingertips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub location: Point,
    pub kind: TransitionKind,
}

/// Tracking state for one physical hand across frames.
///
/// A hand is created from an unclaimed observation and lives until a frame
/// arrives with no observation it can plausibly be.
#[derive(Debug, Clone)]
pub struct HandState {
    id: Uuid,
    last_location: Point,
    // Landmarks of the last observation, for jitter and overlap checks
    landmarks: Landmarks,
    slope: f64,
    handedness: Handedness,
    handedness_confidence: f64,
    best_handedness: Option<Handedness>,
    moving: bool,
    grabbing: bool,
    grace_timer: u32,
    stability_timer: u32,
    spazzing: bool,
    spazzing_timer: u32,
    focused_timer: u32,
    focus_notice: bool,
    instability_reported: bool,
    distance_bounds: [f64; 2],
    pinch_bounds: [f64; 2],
    config: HandConfig,
}

impl HandState {
    pub fn new(observation: &Observation, side_length: u32, config: HandConfig) -> Self {
        let best_handedness = (observation.confidence >= config.best_hand_confidence)
            .then_some(observation.handedness);

        let hand = Self {
            id: Uuid::new_v4(),
            last_location: observation.wrist(),
            landmarks: observation.landmarks,
            slope: observation.slope(),
            handedness: observation.handedness,
            handedness_confidence: observation.confidence,
            best_handedness,
            moving: false,
            grabbing: false,
            grace_timer: 0,
            stability_timer: 0,
            spazzing: false,
            spazzing_timer: 0,
            focused_timer: 0,
            focus_notice: false,
            instability_reported: false,
            distance_bounds: config.distance_bounds(side_length),
            pinch_bounds: config.pinch_bounds(side_length),
            config,
        };
        tracing::debug!(hand = %hand.id, x = hand.last_location.x, y = hand.last_location.y, "hand created");
        hand
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn last_location(&self) -> Point {
        self.last_location
    }

    pub fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn handedness_confidence(&self) -> f64 {
        self.handedness_confidence
    }

    /// Last handedness reported with high confidence, if any.
    pub fn best_handedness(&self) -> Option<Handedness> {
        self.best_handedness
    }

    pub fn is_moving_now(&self) -> bool {
        self.moving
    }

    pub fn is_grabbing(&self) -> bool {
        self.grabbing
    }

    pub fn grace_timer(&self) -> u32 {
        self.grace_timer
    }

    pub fn stability_timer(&self) -> u32 {
        self.stability_timer
    }

    pub fn is_spazzing(&self) -> bool {
        self.spazzing
    }

    pub fn spazzing_timer(&self) -> u32 {
        self.spazzing_timer
    }

    pub fn focused_timer(&self) -> u32 {
        self.focused_timer
    }

    /// Whether an overlay should flag this hand as "Not Focused".
    pub fn needs_focus_notice(&self) -> bool {
        self.focus_notice
    }

    pub fn distance_bounds(&self) -> [f64; 2] {
        self.distance_bounds
    }

    pub fn pinch_bounds(&self) -> [f64; 2] {
        self.pinch_bounds
    }

    /// The wrist has barely moved since the last frame.
    pub fn is_still(&self, location: &Point) -> bool {
        geometry::distance(location, &self.last_location) <= self.distance_bounds[0]
    }

    /// The wrist moved, but not so far that this must be another hand.
    pub fn is_moving(&self, location: &Point) -> bool {
        let d = geometry::distance(location, &self.last_location);
        self.distance_bounds[0] < d && d < self.distance_bounds[1]
    }

    /// The orientation changed little enough to still be this hand.
    pub fn is_rotation_compatible(&self, observation: &Observation) -> bool {
        (self.slope - observation.slope()).abs() < self.config.rotation_threshold
    }

    /// Whether `observation` could be this hand in the current frame.
    pub fn accepts(&self, observation: &Observation) -> bool {
        let wrist = observation.wrist();
        (self.is_still(&wrist) || self.is_moving(&wrist)) && self.is_rotation_compatible(observation)
    }

    /// Index of the first observation this hand accepts.
    pub fn find_match(&self, observations: &[Observation]) -> Option<usize> {
        observations.iter().position(|obs| self.accepts(obs))
    }

    /// Find this hand among `observations` and take over the matched
    /// observation's handedness and orientation.
    pub fn match_observation(&mut self, observations: &[Observation]) -> Option<(Point, usize)> {
        let index = self.find_match(observations)?;
        let observation = &observations[index];
        self.adopt_identity(observation);
        Some((observation.wrist(), index))
    }

    fn adopt_identity(&mut self, observation: &Observation) {
        if observation.confidence > self.config.best_hand_confidence {
            self.best_handedness = Some(observation.handedness);
        }
        self.handedness = observation.handedness;
        self.handedness_confidence = observation.confidence;
        self.slope = observation.slope();
    }

    /// Whether the hand is pinching, judged against its matched observation.
    pub fn classify_grab(&self, observations: &[Observation]) -> bool {
        if self.moving {
            return self.grabbing;
        }
        match self.find_match(observations) {
            Some(index) => self.classify_observation(&observations[index]),
            None => false,
        }
    }

    /// A hand in transit keeps its previous state: nothing is picked up or
    /// dropped mid-motion.
    pub fn classify_observation(&self, observation: &Observation) -> bool {
        if self.moving {
            return self.grabbing;
        }
        let openness = FingerOpenness::from_landmarks(&observation.landmarks);
        let pinch = observation.pinch_distance();
        tracing::trace!(hand = %self.id, pinch, ?openness, "classifying grab");

        let [low, high] = self.pinch_bounds;
        low < pinch && pinch < high
    }

    /// Recompute the grab state; a change restarts the stability timer.
    pub fn update_grabbing(&mut self, observation: &Observation) {
        let grabbing = self.classify_observation(observation);
        if grabbing != self.grabbing {
            self.stability_timer = 0;
        }
        self.grabbing = grabbing;
    }

    /// Report a grab or release if the pinch state flipped since the last
    /// frame and the hand is trusted to report.
    pub fn emit_transition(&self, observations: &[Observation]) -> Option<Transition> {
        let index = self.find_match(observations)?;
        self.transition_for(&observations[index])
    }

    pub fn transition_for(&self, observation: &Observation) -> Option<Transition> {
        if self.spazzing {
            return None;
        }
        if let EmissionPolicy::Debounced {
            grace_timer_threshold,
            stability_timer_threshold,
        } = self.config.policy
        {
            if self.grace_timer <= grace_timer_threshold || self.stability_timer < stability_timer_threshold {
                return None;
            }
        }

        let grabbing = self.classify_observation(observation);
        let kind = match (self.grabbing, grabbing) {
            (false, true) => TransitionKind::Grab,
            (true, false) => TransitionKind::Release,
            _ => return None,
        };
        Some(Transition {
            location: observation.pinch_midpoint(),
            kind,
        })
    }

    /// Per-frame update. Returns the index of the consumed observation, or
    /// `None` when this hand is gone.
    pub fn advance(&mut self, observations: &[Observation]) -> Option<usize> {
        let index = self.find_match(observations)?;
        self.advance_with(&observations[index]);
        Some(index)
    }

    /// Per-frame update against an observation already assigned to this hand.
    pub fn advance_with(&mut self, observation: &Observation) {
        let unstable = self.is_jittering(observation);
        self.landmarks = observation.landmarks;
        self.update_focus(unstable);

        self.adopt_identity(observation);
        let wrist = observation.wrist();
        self.moving = self.is_moving(&wrist);
        self.update_grabbing(observation);
        self.last_location = wrist;

        self.grace_timer += 1;
        self.stability_timer += 1;
    }

    /// Too many landmarks jumped further than a hand can move in a frame.
    pub fn is_jittering(&self, observation: &Observation) -> bool {
        let jumped = self
            .landmarks
            .iter()
            .zip(observation.landmarks.iter())
            .filter(|(old, new)| geometry::distance(old, new) >= self.distance_bounds[1])
            .count();
        jumped as f64 / LANDMARK_COUNT as f64 > self.config.spazzing_ratio
    }

    /// Flag the hand unstable, e.g. because another hand covers it.
    pub fn mark_unstable(&mut self) {
        self.update_focus(true);
    }

    fn update_focus(&mut self, unstable: bool) {
        if unstable {
            if !self.spazzing {
                tracing::debug!(hand = %self.id, "hand became unstable");
            }
            self.spazzing = true;
            self.spazzing_timer += 1;
            self.focused_timer = 0;
        } else {
            self.focused_timer += 1;
            self.spazzing_timer = 0;
            self.instability_reported = false;
        }

        self.focus_notice = unstable;
        if self.spazzing_timer > self.config.spazzing_threshold {
            if !self.instability_reported {
                tracing::warn!(
                    hand = %self.id,
                    frames = self.spazzing_timer,
                    "hand has been unstable for too long"
                );
                self.instability_reported = true;
            }
        } else if self.focused_timer > self.config.focused_threshold {
            if self.spazzing {
                tracing::debug!(hand = %self.id, "hand refocused");
            }
            self.spazzing = false;
        } else if self.focused_timer < self.config.focused_threshold {
            self.focus_notice = true;
        }
    }

    /// More than `21 * ratio` landmarks of the two hands sit on top of each
    /// other.
    pub fn overlaps(&self, other: &HandState, ratio: f64) -> bool {
        let close = self
            .landmarks
            .iter()
            .zip(other.landmarks.iter())
            .filter(|(a, b)| geometry::distance(a, b) <= self.distance_bounds[0])
            .count();
        close > (LANDMARK_COUNT as f64 * ratio) as usize
    }

    pub fn trace_state(&self) {
        tracing::trace!(
            hand = %self.id,
            x = self.last_location.x,
            y = self.last_location.y,
            handedness = %self.handedness,
            grabbing = self.grabbing,
            slope = self.slope,
            spazzing = self.spazzing,
            "hand state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_support::{hand_at, hand_with_middle};

    const SIDE: u32 = 30;
    const OPEN: f64 = 100.0;
    const PINCH: f64 = 20.0;

    fn tracked(x: f64, y: f64, pinch: f64) -> HandState {
        HandState::new(&hand_at(x, y, pinch), SIDE, HandConfig::default())
    }

    #[test]
    fn starts_from_first_observation() {
        let mut obs = hand_at(100.0, 200.0, OPEN);
        obs.confidence = 0.5;
        let hand = HandState::new(&obs, SIDE, HandConfig::default());
        assert_eq!(hand.last_location(), Point::new(100.0, 200.0));
        assert_eq!(hand.distance_bounds(), [7.5, 15.0]);
        assert_eq!(hand.pinch_bounds(), [0.0, 60.0]);
        assert_eq!(hand.best_handedness(), None);
        assert!(!hand.is_grabbing());
        assert!(!hand.is_spazzing());
    }

    #[test]
    fn still_moving_and_rejected_boundaries() {
        let hand = tracked(100.0, 200.0, OPEN);

        let at_low = Point::new(107.5, 200.0);
        assert!(hand.is_still(&at_low));
        assert!(!hand.is_moving(&at_low));

        let between = Point::new(110.0, 200.0);
        assert!(!hand.is_still(&between));
        assert!(hand.is_moving(&between));

        let at_high = hand_at(115.0, 200.0, OPEN);
        assert!(!hand.accepts(&at_high));
        assert_eq!(hand.find_match(&[at_high]), None);
    }

    #[test]
    fn rotation_rejects_other_hands() {
        let hand = tracked(100.0, 200.0, OPEN);
        let turned = hand_with_middle(101.0, 200.0, OPEN, (-5.0, -60.0));
        assert!(!hand.accepts(&turned));
        let same = hand_at(101.0, 200.0, OPEN);
        assert!(hand.accepts(&same));
    }

    #[test]
    fn matches_first_compatible_observation() {
        let mut hand = tracked(100.0, 200.0, OPEN);
        let mut confident = hand_at(103.0, 200.0, OPEN);
        confident.handedness = Handedness::Left;
        confident.confidence = 0.95;
        let observations = [hand_at(300.0, 200.0, OPEN), confident, hand_at(101.0, 200.0, OPEN)];

        let (location, index) = hand.match_observation(&observations).unwrap();
        assert_eq!(index, 1);
        assert_eq!(location, Point::new(103.0, 200.0));
        assert_eq!(hand.handedness(), Handedness::Left);
        assert_eq!(hand.best_handedness(), Some(Handedness::Left));
    }

    #[test]
    fn pinch_inside_bounds_is_a_grab() {
        let hand = tracked(100.0, 200.0, OPEN);
        assert!(hand.classify_grab(&[hand_at(100.0, 200.0, PINCH)]));
        assert!(!hand.classify_grab(&[hand_at(100.0, 200.0, OPEN)]));
        assert!(!hand.classify_grab(&[hand_at(100.0, 200.0, 60.0)]));
        assert!(!hand.classify_grab(&[hand_at(400.0, 200.0, PINCH)]));
    }

    #[test]
    fn moving_hand_keeps_grab_state() {
        let mut hand = tracked(100.0, 200.0, OPEN);
        hand.advance_with(&hand_at(110.0, 200.0, OPEN));
        assert!(hand.is_moving_now());
        assert!(!hand.classify_observation(&hand_at(110.0, 200.0, PINCH)));
    }

    #[test]
    fn emits_one_grab_on_the_rising_edge() {
        let mut hand = tracked(100.0, 200.0, OPEN);
        let open = [hand_at(100.0, 200.0, OPEN)];
        let pinched = [hand_at(100.0, 200.0, PINCH)];

        assert_eq!(hand.emit_transition(&open), None);
        hand.advance(&open).unwrap();

        let grab = hand.emit_transition(&pinched).unwrap();
        assert_eq!(grab.kind, TransitionKind::Grab);
        assert_eq!(grab.location, Point::new(100.0, 160.0));
        hand.advance(&pinched).unwrap();

        for _ in 0..3 {
            assert_eq!(hand.emit_transition(&pinched), None);
            hand.advance(&pinched).unwrap();
        }

        let release = hand.emit_transition(&open).unwrap();
        assert_eq!(release.kind, TransitionKind::Release);
        assert!(release.kind.is_release());
    }

    #[test]
    fn state_change_restarts_stability_timer() {
        let mut hand = tracked(100.0, 200.0, OPEN);
        let open = hand_at(100.0, 200.0, OPEN);
        hand.advance_with(&open);
        hand.advance_with(&open);
        assert_eq!(hand.stability_timer(), 2);
        hand.advance_with(&hand_at(100.0, 200.0, PINCH));
        assert!(hand.is_grabbing());
        assert_eq!(hand.stability_timer(), 1);
        assert_eq!(hand.grace_timer(), 3);
    }

    #[test]
    fn debounced_policy_waits_for_stability() {
        let config = HandConfig {
            policy: EmissionPolicy::debounced(),
            ..HandConfig::default()
        };
        let open = hand_at(100.0, 200.0, OPEN);
        let pinched = hand_at(100.0, 200.0, PINCH);

        // An edge right after the hand appears is swallowed
        let mut early = HandState::new(&open, SIDE, config);
        early.advance_with(&open);
        assert_eq!(early.transition_for(&pinched), None);

        let mut settled = HandState::new(&open, SIDE, config);
        for _ in 0..4 {
            settled.advance_with(&open);
            assert_eq!(settled.transition_for(&pinched), None);
        }
        settled.advance_with(&open);
        assert_eq!(settled.stability_timer(), 5);
        assert_eq!(
            settled.transition_for(&pinched).map(|t| t.kind),
            Some(TransitionKind::Grab)
        );
    }

    #[test]
    fn jitter_marks_hand_unstable_until_refocused() {
        let config = HandConfig {
            focused_threshold: 3,
            ..HandConfig::default()
        };
        let base = hand_at(100.0, 200.0, OPEN);
        let mut hand = HandState::new(&base, SIDE, config);

        // Every landmark but the wrist jumps well past the moving bound
        let mut shaky = base.clone();
        for lm in shaky.landmarks.iter_mut().skip(1) {
            lm.y += 40.0;
        }
        assert!(hand.is_jittering(&shaky));
        hand.advance_with(&shaky);
        assert!(hand.is_spazzing());
        assert!(hand.needs_focus_notice());
        assert_eq!(hand.transition_for(&hand_at(100.0, 200.0, PINCH)), None);

        for _ in 0..3 {
            hand.advance_with(&shaky);
            assert!(hand.is_spazzing());
        }
        hand.advance_with(&shaky);
        assert_eq!(hand.focused_timer(), 4);
        assert!(!hand.is_spazzing());
        assert!(!hand.needs_focus_notice());
    }

    #[test]
    fn overlapping_hands_are_detected() {
        let a = tracked(100.0, 200.0, OPEN);
        let b = tracked(102.0, 201.0, OPEN);
        let c = tracked(300.0, 200.0, OPEN);
        assert!(a.overlaps(&b, 0.2));
        assert!(!a.overlaps(&c, 0.2));
    }
}
