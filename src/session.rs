// src/session.rs - Per-frame orchestration of live hands and the board
use crate::board::{Board, Cell};
use crate::config::SessionConfig;
use crate::geometry::Point;
use crate::hand::{HandState, Transition, TransitionKind};
use crate::landmarks::Observation;
use crate::matching::{GreedyMatcher, MatchStrategy};
use serde::Serialize;

/// A grab or release applied to the board, as recorded in the session log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridEvent {
    pub frame: u64,
    pub x: f64,
    pub y: f64,
    pub kind: TransitionKind,
}

impl GridEvent {
    pub fn location(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_release(&self) -> bool {
        self.kind.is_release()
    }
}

/// What happened during one call to [`TrackingSession::process_frame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub events: Vec<GridEvent>,
    pub created: usize,
    pub retired: usize,
    pub live_hands: usize,
    /// The no-hands counter just passed the idle trigger.
    pub idle_triggered: bool,
}

pub struct TrackingSession {
    board: Board,
    hands: Vec<HandState>,
    matcher: Box<dyn MatchStrategy>,
    config: SessionConfig,
    // Consecutive frames without hands; counting starts once a hand was seen
    no_hands: Option<u32>,
    frame: u64,
    log: Vec<GridEvent>,
}

impl TrackingSession {
    pub fn new(board: Board, config: SessionConfig) -> Self {
        Self::with_matcher(board, config, Box::new(GreedyMatcher))
    }

    pub fn with_matcher(board: Board, config: SessionConfig, matcher: Box<dyn MatchStrategy>) -> Self {
        tracing::info!(
            matcher = matcher.name(),
            side_length = board.side_length(),
            rows = board.rows(),
            cols = board.cols(),
            "tracking session started"
        );
        Self {
            board,
            hands: Vec::new(),
            matcher,
            config,
            no_hands: None,
            frame: 0,
            log: Vec::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn hands(&self) -> &[HandState] {
        &self.hands
    }

    /// Every event applied so far, in order.
    pub fn log(&self) -> &[GridEvent] {
        &self.log
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame
    }

    pub fn no_hands_frames(&self) -> Option<u32> {
        self.no_hands
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Advance the session by one frame's worth of detected hands.
    pub fn process_frame(&mut self, observations: Vec<Observation>) -> FrameReport {
        self.process_frame_at(self.frame, observations)
    }

    /// Like [`process_frame`](Self::process_frame), but events are stamped
    /// with the capture index `frame` instead of the processed-frame count.
    pub fn process_frame_at(&mut self, frame: u64, observations: Vec<Observation>) -> FrameReport {
        self.frame += 1;
        let mut report = FrameReport {
            frame,
            ..FrameReport::default()
        };

        if observations.is_empty() {
            // Hands left the scene; do not try to carry identities across the gap
            report.retired = self.hands.len();
            self.hands.clear();
            if let Some(count) = self.no_hands.as_mut() {
                *count += 1;
                if *count > self.config.idle_trigger_frames {
                    *count = 0;
                    report.idle_triggered = true;
                    tracing::debug!(frame, "no hands for a while, session idle");
                }
            }
            return report;
        }

        let assignments = self.matcher.assign(&self.hands, &observations);
        let mut claimed = vec![false; observations.len()];
        let previous = std::mem::take(&mut self.hands);

        for (mut hand, slot) in previous.into_iter().zip(assignments) {
            let Some(index) = slot.filter(|&i| !claimed[i]) else {
                tracing::debug!(hand = %hand.id(), frame, "hand lost, retiring");
                report.retired += 1;
                continue;
            };
            claimed[index] = true;
            let observation = &observations[index];

            if let Some(transition) = hand.transition_for(observation) {
                let event = self.apply_transition(frame, &hand, transition);
                report.events.push(event);
            }
            hand.advance_with(observation);
            hand.trace_state();
            self.hands.push(hand);
        }

        let side_length = self.board.side_length();
        for (observation, _) in observations.iter().zip(&claimed).filter(|(_, c)| !**c) {
            self.hands.push(HandState::new(observation, side_length, self.config.hand));
            report.created += 1;
        }

        self.flag_overlapping_hands();
        self.no_hands = Some(0);
        report.live_hands = self.hands.len();
        report
    }

    fn apply_transition(&mut self, frame: u64, hand: &HandState, transition: Transition) -> GridEvent {
        let Transition { location, kind } = transition;
        tracing::info!(hand = %hand.id(), frame, x = location.x, y = location.y, ?kind, "hand transition");

        if let Err(e) = self.board.apply(kind, &location) {
            tracing::warn!(hand = %hand.id(), frame, "board not updated: {e}");
        }
        let event = GridEvent {
            frame,
            x: location.x,
            y: location.y,
            kind,
        };
        self.log.push(event);
        event
    }

    fn flag_overlapping_hands(&mut self) {
        let ratio = self.config.overlap_ratio;
        for i in 0..self.hands.len() {
            let (head, tail) = self.hands.split_at_mut(i + 1);
            let first = &mut head[i];
            for second in tail.iter_mut() {
                if first.overlaps(second, ratio) {
                    tracing::debug!(first = %first.id(), second = %second.id(), "hands overlap");
                    first.mark_unstable();
                    second.mark_unstable();
                }
            }
        }
    }

    /// Reconcile the board with items seen resting on the surface: fill empty
    /// cells under `items` and clear stacks nobody saw.
    pub fn reconcile_surface(&mut self, items: &[Point]) -> Vec<Cell> {
        self.board.begin_presence_pass();
        for point in items {
            if let Err(e) = self.board.apply_low_layer_heuristic(point) {
                tracing::warn!("surface item ignored: {e}");
            }
        }
        let cleared = self.board.prune_unconfirmed();
        if !cleared.is_empty() {
            tracing::info!(cells = cleared.len(), "cleared stacks missing from the surface");
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;
    use crate::landmarks::test_support::hand_at;
    use crate::matching::OptimalMatcher;

    const OPEN: f64 = 100.0;
    const PINCH: f64 = 20.0;

    fn session() -> TrackingSession {
        let board = Board::new(640, 480, 30, BoardConfig::default());
        TrackingSession::new(board, SessionConfig::default())
    }

    #[test]
    fn grab_then_release_moves_an_item() {
        let mut s = session();
        let drop_cell = s.board().center_of(&Point::new(310.0, 160.0)).unwrap();
        assert_eq!(drop_cell, Cell { row: 5, col: 10 });

        let frames = [OPEN, OPEN, PINCH, PINCH, OPEN, OPEN];
        let mut events = Vec::new();
        for pinch in frames {
            events.extend(s.process_frame(vec![hand_at(310.0, 200.0, pinch)]).events);
        }

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, TransitionKind::Grab);
        assert_eq!(events[0].frame, 2);
        assert_eq!(events[1].kind, TransitionKind::Release);
        assert_eq!(events[1].frame, 4);
        assert_eq!(events[1].location(), Point::new(310.0, 160.0));
        assert_eq!(s.log(), events.as_slice());
        // The grab found an empty cell; the release left one item behind
        assert_eq!(s.board().height_at(drop_cell), Some(1));
    }

    #[test]
    fn picking_up_a_placed_item_empties_the_cell() {
        let mut s = session();
        let cell = s.board.place(&Point::new(310.0, 160.0)).unwrap();

        for pinch in [OPEN, OPEN, PINCH] {
            s.process_frame(vec![hand_at(310.0, 200.0, pinch)]);
        }
        assert_eq!(s.board().height_at(cell), Some(0));
        assert!(s.board().journal().is_empty());
    }

    #[test]
    fn single_event_while_pinch_persists() {
        let mut s = session();
        s.process_frame(vec![hand_at(310.0, 200.0, OPEN)]);
        s.process_frame(vec![hand_at(310.0, 200.0, OPEN)]);
        let counts: Vec<usize> = (0..5)
            .map(|_| s.process_frame(vec![hand_at(310.0, 200.0, PINCH)]).events.len())
            .collect();
        assert_eq!(counts, vec![1, 0, 0, 0, 0]);
    }

    #[test]
    fn unmatched_observation_spawns_then_empty_frame_retires() {
        let mut s = session();
        let first = s.process_frame(vec![hand_at(100.0, 100.0, OPEN)]);
        assert_eq!(first.created, 1);
        assert_eq!(first.live_hands, 1);

        let second = s.process_frame(Vec::new());
        assert_eq!(second.retired, 1);
        assert!(s.hands().is_empty());
        assert_eq!(s.no_hands_frames(), Some(1));
    }

    #[test]
    fn far_observation_replaces_the_hand() {
        let mut s = session();
        s.process_frame(vec![hand_at(100.0, 100.0, OPEN)]);
        let original = s.hands()[0].id();

        let report = s.process_frame(vec![hand_at(400.0, 300.0, OPEN)]);
        assert_eq!(report.retired, 1);
        assert_eq!(report.created, 1);
        assert_ne!(s.hands()[0].id(), original);
    }

    #[test]
    fn overlapping_hands_are_muted() {
        let mut s = session();
        let report = s.process_frame(vec![hand_at(300.0, 200.0, OPEN), hand_at(302.0, 200.0, OPEN)]);
        assert_eq!(report.created, 2);
        assert!(s.hands().iter().all(HandState::is_spazzing));

        let report = s.process_frame(vec![hand_at(300.0, 200.0, PINCH), hand_at(302.0, 200.0, PINCH)]);
        assert!(report.events.is_empty());
        assert_eq!(report.live_hands, 2);
        assert!(s.log().is_empty());
    }

    #[test]
    fn separate_hands_track_independently() {
        let mut s = session();
        s.process_frame(vec![hand_at(100.0, 300.0, OPEN), hand_at(500.0, 300.0, OPEN)]);
        let report = s.process_frame(vec![hand_at(500.0, 300.0, PINCH), hand_at(100.0, 300.0, OPEN)]);
        assert_eq!(report.live_hands, 2);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].location(), Point::new(500.0, 260.0));
        assert!(s.hands().iter().all(|h| !h.is_spazzing()));
    }

    #[test]
    fn idle_trigger_fires_after_enough_empty_frames() {
        let mut s = session();
        // Counting only starts once hands have been seen
        assert!(!s.process_frame(Vec::new()).idle_triggered);
        assert_eq!(s.no_hands_frames(), None);

        s.process_frame(vec![hand_at(100.0, 100.0, OPEN)]);
        let triggered: Vec<bool> = (0..11).map(|_| s.process_frame(Vec::new()).idle_triggered).collect();
        assert_eq!(triggered.iter().filter(|&&t| t).count(), 1);
        assert!(triggered[10]);
        assert_eq!(s.no_hands_frames(), Some(0));
    }

    #[test]
    fn surface_reconciliation_fills_and_clears() {
        let mut s = session();
        let stale = s.board.place(&Point::new(500.0, 400.0)).unwrap();
        let cleared = s.reconcile_surface(&[Point::new(100.0, 100.0), Point::new(-50.0, 0.0)]);
        assert_eq!(cleared, vec![stale]);
        assert_eq!(s.board().height_at(stale), Some(0));
        let seen = s.board().center_of(&Point::new(100.0, 100.0)).unwrap();
        assert_eq!(s.board().height_at(seen), Some(1));
    }

    #[test]
    fn events_carry_the_capture_index() {
        let mut s = session();
        let mut events = Vec::new();
        for (index, pinch) in [(10, OPEN), (12, OPEN), (17, PINCH)] {
            events.extend(s.process_frame_at(index, vec![hand_at(310.0, 200.0, pinch)]).events);
        }
        assert_eq!(s.frames_processed(), 3);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame, 17);
    }

    #[test]
    fn optimal_matcher_can_be_injected() {
        let board = Board::new(640, 480, 30, BoardConfig::default());
        let mut s = TrackingSession::with_matcher(board, SessionConfig::default(), Box::new(OptimalMatcher::default()));
        s.process_frame(vec![hand_at(100.0, 300.0, OPEN), hand_at(112.0, 300.0, OPEN)]);
        let ids: Vec<_> = s.hands().iter().map(HandState::id).collect();

        let report = s.process_frame(vec![hand_at(110.0, 300.0, OPEN), hand_at(97.0, 300.0, OPEN)]);
        assert_eq!(report.retired, 0);
        assert_eq!(report.created, 0);
        assert_eq!(s.hands().iter().map(HandState::id).collect::<Vec<_>>(), ids);
    }
}
