// src/matching.rs - Assigning a frame's observations to the hands being tracked
use crate::geometry;
use crate::hand::HandState;
use crate::landmarks::Observation;

/// Decides which observation, if any, belongs to each live hand.
///
/// The returned vector has one slot per hand, in hand order. No observation
/// may be assigned to more than one hand, and a hand is only ever assigned an
/// observation it [accepts](HandState::accepts).
pub trait MatchStrategy: Send + Sync {
    fn assign(&self, hands: &[HandState], observations: &[Observation]) -> Vec<Option<usize>>;

    fn name(&self) -> &'static str;
}

/// Hands pick in list order, each taking the first observation it accepts
/// that no earlier hand took.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyMatcher;

impl MatchStrategy for GreedyMatcher {
    fn assign(&self, hands: &[HandState], observations: &[Observation]) -> Vec<Option<usize>> {
        let mut claimed = vec![false; observations.len()];
        hands
            .iter()
            .map(|hand| {
                let index = observations
                    .iter()
                    .enumerate()
                    .position(|(i, obs)| !claimed[i] && hand.accepts(obs))?;
                claimed[index] = true;
                Some(index)
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}

/// Exhaustive search for the assignment that keeps the most hands alive,
/// breaking ties by the smallest total wrist displacement.
#[derive(Debug, Clone, Copy)]
pub struct OptimalMatcher {
    /// Above this many hands the search falls back to greedy matching.
    pub max_hands: usize,
}

impl Default for OptimalMatcher {
    fn default() -> Self {
        Self { max_hands: 6 }
    }
}

struct Search<'a> {
    costs: &'a [Vec<Option<f64>>],
    used: Vec<bool>,
    current: Vec<Option<usize>>,
    best: Vec<Option<usize>>,
    best_score: (usize, f64),
}

impl Search<'_> {
    fn run(&mut self, hand: usize, matched: usize, cost: f64) {
        if hand == self.costs.len() {
            let (best_matched, best_cost) = self.best_score;
            if matched > best_matched || (matched == best_matched && cost < best_cost) {
                self.best_score = (matched, cost);
                self.best.clone_from(&self.current);
            }
            return;
        }

        let costs = self.costs;
        for (obs, slot) in costs[hand].iter().enumerate() {
            if let Some(c) = *slot {
                if !self.used[obs] {
                    self.used[obs] = true;
                    self.current[hand] = Some(obs);
                    self.run(hand + 1, matched + 1, cost + c);
                    self.used[obs] = false;
                }
            }
        }
        self.current[hand] = None;
        self.run(hand + 1, matched, cost);
    }
}

impl MatchStrategy for OptimalMatcher {
    fn assign(&self, hands: &[HandState], observations: &[Observation]) -> Vec<Option<usize>> {
        if hands.len() > self.max_hands {
            tracing::debug!(hands = hands.len(), "too many hands for exhaustive matching");
            return GreedyMatcher.assign(hands, observations);
        }

        let costs: Vec<Vec<Option<f64>>> = hands
            .iter()
            .map(|hand| {
                observations
                    .iter()
                    .map(|obs| {
                        hand.accepts(obs)
                            .then(|| geometry::distance(&hand.last_location(), &obs.wrist()))
                    })
                    .collect()
            })
            .collect();

        let mut search = Search {
            costs: &costs,
            used: vec![false; observations.len()],
            current: vec![None; hands.len()],
            best: vec![None; hands.len()],
            best_score: (0, f64::INFINITY),
        };
        search.run(0, 0, 0.0);
        search.best
    }

    fn name(&self) -> &'static str {
        "optimal"
    }
}
