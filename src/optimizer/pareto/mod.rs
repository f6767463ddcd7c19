
use crate::config::Priorities;
use crate::optimizer::evaluation::TrialMetrics;

/// A successful trial as seen by the selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub trial_index: usize,
    pub accuracy: f64,
    pub cost: f64,
    pub latency: f64,
}

impl Candidate {
    #[inline]
    pub fn from_metrics(trial_index: usize, metrics: &TrialMetrics) -> Self {
        Self {
            trial_index,
            accuracy: metrics.accuracy,
            cost: metrics.cost_per_query,
            latency: metrics.mean_latency_ms,
        }
    }

    /// At least as good on every axis and strictly better on one
    #[inline]
    pub fn dominates(&self, other: &Self) -> bool {
        let no_worse = self.accuracy >= other.accuracy
            && self.cost <= other.cost
            && self.latency <= other.latency;
        let better = self.accuracy > other.accuracy
            || self.cost < other.cost
            || self.latency < other.latency;
        no_worse && better
    }
}

/// Trial indices of the non-dominated candidates, ascending
#[inline]
pub fn pareto_frontier(candidates: &[Candidate]) -> Vec<usize> {
    let mut frontier: Vec<usize> = candidates
        .iter()
        .filter(|c| !candidates.iter().any(|other| other.dominates(c)))
        .map(|c| c.trial_index)
        .collect();
    frontier.sort_unstable();
    frontier.dedup();
    frontier
}

/// Frontier trial with the highest priority-weighted score.
///
/// Each axis is min-max normalised over all candidates (cost and latency
/// inverted so that higher is better); an axis with no spread scores 1.
#[inline]
pub fn recommend(candidates: &[Candidate], priorities: &Priorities) -> Option<usize> {
    let frontier = pareto_frontier(candidates);
    let accuracy = Range::of(candidates.iter().map(|c| c.accuracy))?;
    let cost = Range::of(candidates.iter().map(|c| c.cost))?;
    let latency = Range::of(candidates.iter().map(|c| c.latency))?;

    let mut best: Option<(usize, f64)> = None;
    for index in frontier {
        let Some(candidate) = candidates.iter().find(|c| c.trial_index == index) else {
            continue;
        };
        let score = priorities.accuracy * accuracy.scale(candidate.accuracy)
            + priorities.cost * cost.inverse_scale(candidate.cost)
            + priorities.latency * latency.inverse_scale(candidate.latency);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

#[derive(Debug, Clone, Copy)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        values.fold(None, |range, v| {
            Some(match range {
                None => Self { min: v, max: v },
                Some(Self { min, max }) => Self {
                    min: min.min(v),
                    max: max.max(v),
                },
            })
        })
    }

    fn scale(self, value: f64) -> f64 {
        if self.max > self.min {
            (value - self.min) / (self.max - self.min)
        } else {
            1.0
        }
    }

    /// Lower is better
    fn inverse_scale(self, value: f64) -> f64 {
        if self.max > self.min {
            (self.max - value) / (self.max - self.min)
        } else {
            1.0
        }
    }
}
