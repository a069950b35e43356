use crate::refactoring::RefactoringKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskTolerance {
    /// Highest `risk_score` admitted under this tolerance.
    pub fn threshold(self) -> f64 {
        match self {
            RiskTolerance::Low => 0.3,
            RiskTolerance::Medium => 0.6,
            RiskTolerance::High => 0.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTolerance::Low => "low",
            RiskTolerance::Medium => "medium",
            RiskTolerance::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub impact: f64,
    pub effort: f64,
    pub risk: f64,
    pub confidence: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            impact: 1.0,
            effort: 0.5,
            risk: 0.5,
            confidence: 0.5,
        }
    }
}

impl Weights {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("impact", self.impact),
            ("effort", self.effort),
            ("risk", self.risk),
            ("confidence", self.confidence),
        ]
        .into_iter()
    }
}

/// Scorer weights with optional overrides per refactoring kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(flatten)]
    pub base: Weights,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_kind: BTreeMap<RefactoringKind, Weights>,
}

impl ScoreWeights {
    pub fn for_kind(&self, kind: RefactoringKind) -> &Weights {
        self.per_kind.get(&kind).unwrap_or(&self.base)
    }
}

/// Inputs to one scheduling and execution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub time_budget_minutes: u64,

    #[serde(default)]
    pub risk_tolerance: RiskTolerance,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_refactorings: Option<u64>,

    #[serde(default)]
    pub scorer_weights: ScoreWeights,

    #[serde(default = "default_pass_rate_floor")]
    pub pass_rate_floor: f64,

    #[serde(default = "default_timeout_secs")]
    pub executor_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub runner_timeout_secs: u64,

    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

pub const DEFAULT_TIME_BUDGET_MINUTES: u64 = 60;
pub const DEFAULT_PASS_RATE_FLOOR: f64 = 0.95;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_PARALLEL: usize = 1;

fn default_pass_rate_floor() -> f64 {
    DEFAULT_PASS_RATE_FLOOR
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time_budget_minutes: DEFAULT_TIME_BUDGET_MINUTES,
            risk_tolerance: RiskTolerance::default(),
            max_refactorings: None,
            scorer_weights: ScoreWeights::default(),
            pass_rate_floor: DEFAULT_PASS_RATE_FLOOR,
            executor_timeout_secs: DEFAULT_TIMEOUT_SECS,
            runner_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_kind_override_falls_back_to_base() {
        let mut w = ScoreWeights::default();
        w.per_kind.insert(
            RefactoringKind::RemoveDeadCode,
            Weights {
                risk: 0.0,
                ..Weights::default()
            },
        );
        assert_eq!(w.for_kind(RefactoringKind::RemoveDeadCode).risk, 0.0);
        assert_eq!(w.for_kind(RefactoringKind::ExtractMethod).risk, 0.5);
    }

    #[test]
    fn thresholds_increase_with_tolerance() {
        assert!(RiskTolerance::Low.threshold() < RiskTolerance::Medium.threshold());
        assert!(RiskTolerance::Medium.threshold() < RiskTolerance::High.threshold());
    }
}
