use crate::ToolInfo;
use crate::conflict::Conflict;
use crate::issue::Severity;
use crate::refactoring::RefactoringKind;
use serde::{Deserialize, Serialize};

/// Stable tokens explaining why a candidate was not admitted or did not finish.
pub mod reason_tokens {
    pub const ISSUE_SUPERSEDED: &str = "issue_superseded";
    pub const UNKNOWN_ISSUE: &str = "unknown_issue";
    pub const RISK_TOLERANCE: &str = "risk_tolerance";
    pub const DEPENDENCY_CYCLE: &str = "dependency_cycle";
    pub const MISSING_DEPENDENCY: &str = "missing_dependency";
    pub const CONFLICT: &str = "conflict";
    pub const DEPENDENCY_NOT_ADMITTED: &str = "dependency_not_admitted";
    pub const BUDGET_EXCEEDED: &str = "budget_exceeded";
    pub const MAX_REFACTORINGS: &str = "max_refactorings";

    pub const DEPENDENCY_FAILED: &str = "dependency_failed";
    pub const CANCELLED: &str = "cancelled";
    pub const TRANSFORM_ERROR: &str = "transform_error";
    pub const EXECUTOR_TIMEOUT: &str = "executor_timeout";
    pub const RUNNER_TIMEOUT: &str = "runner_timeout";
    pub const RUNNER_ERROR: &str = "runner_error";
    pub const VERIFICATION_FAILED: &str = "verification_failed";
    pub const MERGE_CONFLICT: &str = "merge_conflict";
}

/// The ordered, budget-bounded, conflict-free subset chosen for application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub schema: String,
    pub tool: ToolInfo,
    pub budget: PlanBudget,

    /// Admitted candidates in admission order.
    #[serde(default)]
    pub entries: Vec<PlanEntry>,

    #[serde(default)]
    pub stages: Vec<PlanStage>,

    #[serde(default)]
    pub exclusions: Vec<Exclusion>,

    #[serde(default)]
    pub conflicts: Vec<Conflict>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Vec<String>>,

    pub summary: PlanSummary,
}

impl ExecutionPlan {
    pub fn new(tool: ToolInfo, budget: PlanBudget) -> Self {
        Self {
            schema: crate::schema::REFORGE_PLAN_V1.to_string(),
            tool,
            budget,
            entries: vec![],
            stages: vec![],
            exclusions: vec![],
            conflicts: vec![],
            cycles: vec![],
            summary: PlanSummary::default(),
        }
    }

    pub fn admitted_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn is_admitted(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn exclusion(&self, id: &str) -> Option<&Exclusion> {
        self.exclusions.iter().find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanBudget {
    pub time_budget_minutes: u64,

    /// Cumulative effort of the admitted entries.
    pub total_effort_minutes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_refactorings: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub id: String,
    pub issue_id: String,
    pub kind: RefactoringKind,
    pub severity: Severity,
    pub score: f64,
    pub effort_estimate: u64,
    pub cumulative_effort: u64,
    pub stage: usize,
    pub target: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStage {
    pub index: usize,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub id: String,
    pub reason_token: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub candidates_total: u64,
    pub admitted: u64,
    pub excluded: u64,
    pub stages: u64,
    pub conflicts: u64,
}
