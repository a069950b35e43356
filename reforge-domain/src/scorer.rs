use reforge_types::issue::Issue;
use reforge_types::policy::ScoreWeights;
use reforge_types::refactoring::Refactoring;

/// Pure priority function.
///
/// The scheduler treats scores as opaque: higher is admitted first. Two
/// calls with the same inputs must return the same value.
pub trait PriorityScorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, refactoring: &Refactoring, issue: &Issue, time_budget_minutes: u64) -> f64;
}

/// Weighted linear heuristic:
/// `impact + confidence - effort / budget - risk`, each term weighted.
#[derive(Debug, Clone, Default)]
pub struct WeightedScorer {
    weights: ScoreWeights,
}

impl WeightedScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }
}

impl PriorityScorer for WeightedScorer {
    fn name(&self) -> &str {
        "weighted"
    }

    fn score(&self, refactoring: &Refactoring, issue: &Issue, time_budget_minutes: u64) -> f64 {
        let w = self.weights.for_kind(refactoring.kind);
        let effort_fraction = refactoring.effort_estimate as f64 / time_budget_minutes.max(1) as f64;

        w.impact * refactoring.impact_score + w.confidence * issue.confidence
            - w.effort * effort_fraction
            - w.risk * refactoring.risk_score
    }
}
