use crate::config::{ConfigurationError, validate_run_config};
use crate::conflicts::{ConflictDetector, find_cycles};
use crate::registry::{Registry, RegistryError};
use crate::scorer::{PriorityScorer, WeightedScorer};
use chrono::{DateTime, Utc};
use reforge_types::ToolInfo;
use reforge_types::conflict::{Conflict, ConflictKind};
use reforge_types::issue::Issue;
use reforge_types::plan::{
    ExecutionPlan, Exclusion, PlanBudget, PlanEntry, PlanStage, PlanSummary, reason_tokens,
};
use reforge_types::policy::RunConfig;
use reforge_types::refactoring::{Refactoring, RefactoringStatus};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Greedy, deterministic admission of candidates under conflict, dependency
/// and budget constraints.
pub struct Scheduler {
    scorer: Box<dyn PriorityScorer>,
    detector: ConflictDetector,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Box::new(WeightedScorer::default()))
    }
}

struct Ranked<'a> {
    refactoring: &'a Refactoring,
    issue: &'a Issue,
    score: f64,
}

/// Score descending, then severity (critical first), then id ascending.
fn priority_order(a: &Ranked<'_>, b: &Ranked<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.issue.severity.cmp(&b.issue.severity))
        .then_with(|| a.refactoring.id.cmp(&b.refactoring.id))
}

#[derive(Default)]
struct Exclusions {
    list: Vec<Exclusion>,
}

impl Exclusions {
    fn push(&mut self, id: &str, token: &str, reason: String) {
        debug!(id = %id, token = %token, reason = %reason, "candidate excluded");
        self.list.push(Exclusion {
            id: id.to_string(),
            reason_token: token.to_string(),
            reason,
        });
    }
}

impl Scheduler {
    pub fn new(scorer: Box<dyn PriorityScorer>) -> Self {
        Self {
            scorer,
            detector: ConflictDetector::default(),
        }
    }

    pub fn with_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn scorer(&self) -> &dyn PriorityScorer {
        self.scorer.as_ref()
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// Builds an execution plan over every `proposed` refactoring.
    ///
    /// Pure with respect to the registry: the same registry and config always
    /// produce the same plan. Use [`Scheduler::commit`] to record the
    /// decisions.
    pub fn plan(
        &self,
        registry: &Registry,
        config: &RunConfig,
        tool: ToolInfo,
    ) -> Result<ExecutionPlan, ConfigurationError> {
        validate_run_config(config)?;
        let budget = config.time_budget_minutes;

        let candidates: Vec<&Refactoring> = registry.proposed().collect();
        let candidate_ids: BTreeSet<&str> = candidates.iter().map(|r| r.id.as_str()).collect();
        let mut exclusions = Exclusions::default();

        // Dependency cycles, over every candidate: members and everything
        // that transitively depends on them.
        let cycles = find_cycles(&candidates);
        let mut cycle_conflicts: BTreeSet<Conflict> = BTreeSet::new();
        let mut tainted: BTreeMap<&str, String> = BTreeMap::new();
        for cycle in &cycles {
            warn!(error = %cycle, "dependency cycle rejected");
            let members: BTreeSet<&str> = cycle.members.iter().map(String::as_str).collect();
            for r in &candidates {
                if members.contains(r.id.as_str()) {
                    tainted.insert(&r.id, cycle.to_string());
                    for dep in r.dependencies.iter().filter(|d| members.contains(d.as_str())) {
                        cycle_conflicts.insert(Conflict::new(
                            r.id.clone(),
                            dep.clone(),
                            ConflictKind::DependencyCycle,
                        ));
                    }
                }
            }
        }
        loop {
            let mut grew = false;
            for r in &candidates {
                if tainted.contains_key(r.id.as_str()) {
                    continue;
                }
                if let Some(dep) = r
                    .dependencies
                    .iter()
                    .find(|d| tainted.contains_key(d.as_str()))
                {
                    tainted.insert(
                        &r.id,
                        format!("depends on `{dep}`, which is part of a dependency cycle"),
                    );
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        // Issue and risk filters.
        let threshold = config.risk_tolerance.threshold();
        let mut survivors: Vec<(&Refactoring, &Issue)> = Vec::new();
        for r in &candidates {
            if let Some(reason) = tainted.get(r.id.as_str()) {
                exclusions.push(&r.id, reason_tokens::DEPENDENCY_CYCLE, reason.clone());
                continue;
            }
            let Some(issue) = registry.issue(&r.issue_id) else {
                exclusions.push(
                    &r.id,
                    reason_tokens::UNKNOWN_ISSUE,
                    format!("issue `{}` is not registered", r.issue_id),
                );
                continue;
            };
            if let Some(newer) = registry.superseded_by(&issue.id) {
                exclusions.push(
                    &r.id,
                    reason_tokens::ISSUE_SUPERSEDED,
                    format!("issue `{}` was superseded by `{}`", issue.id, newer),
                );
                continue;
            }
            if r.risk_score > threshold {
                exclusions.push(
                    &r.id,
                    reason_tokens::RISK_TOLERANCE,
                    format!(
                        "risk {:.2} exceeds {} tolerance ({:.2})",
                        r.risk_score,
                        config.risk_tolerance.as_str(),
                        threshold
                    ),
                );
                continue;
            }
            survivors.push((*r, issue));
        }

        let mut ranked: Vec<Ranked<'_>> = Vec::new();
        for (r, issue) in survivors {
            if let Some(dep) = r
                .dependencies
                .iter()
                .find(|d| !candidate_ids.contains(d.as_str()) && !registry.is_applied(d))
            {
                let known = registry
                    .status(dep)
                    .map(|s| format!(" (status {s})"))
                    .unwrap_or_default();
                exclusions.push(
                    &r.id,
                    reason_tokens::MISSING_DEPENDENCY,
                    format!("dependency `{dep}` is neither a candidate nor applied{known}"),
                );
                continue;
            }
            ranked.push(Ranked {
                refactoring: r,
                issue,
                score: self.scorer.score(r, issue, budget),
            });
        }
        ranked.sort_by(priority_order);

        let ranked_refs: Vec<&Refactoring> = ranked.iter().map(|c| c.refactoring).collect();
        let graph = self.detector.detect(&ranked_refs);

        // Greedy admission.
        let mut admitted: Vec<&Ranked<'_>> = Vec::new();
        let mut admitted_ids: BTreeSet<&str> = BTreeSet::new();
        let mut cumulative = 0u64;
        let mut entries = Vec::new();
        for c in &ranked {
            let r = c.refactoring;

            if let Some(other) = admitted
                .iter()
                .map(|a| a.refactoring.id.as_str())
                .find(|a| graph.conflicts_with(&r.id, a))
            {
                let kind = graph
                    .kind_between(&r.id, other)
                    .map(ConflictKind::as_str)
                    .unwrap_or("conflict");
                exclusions.push(
                    &r.id,
                    reason_tokens::CONFLICT,
                    format!("conflicts with admitted `{other}` ({kind})"),
                );
                continue;
            }

            if let Some(dep) = r
                .dependencies
                .iter()
                .find(|d| !admitted_ids.contains(d.as_str()) && !registry.is_applied(d))
            {
                exclusions.push(
                    &r.id,
                    reason_tokens::DEPENDENCY_NOT_ADMITTED,
                    format!("dependency `{dep}` was not admitted"),
                );
                continue;
            }

            let Some(total) = cumulative
                .checked_add(r.effort_estimate)
                .filter(|t| *t <= budget)
            else {
                exclusions.push(
                    &r.id,
                    reason_tokens::BUDGET_EXCEEDED,
                    format!(
                        "effort {} on top of {} exceeds budget {}",
                        r.effort_estimate, cumulative, budget
                    ),
                );
                continue;
            };

            if let Some(max) = config.max_refactorings
                && admitted.len() as u64 >= max
            {
                exclusions.push(
                    &r.id,
                    reason_tokens::MAX_REFACTORINGS,
                    format!("max_refactorings {max} reached"),
                );
                continue;
            }

            cumulative = total;
            admitted_ids.insert(&r.id);
            admitted.push(c);
            debug!(id = %r.id, score = c.score, cumulative, "candidate admitted");
            entries.push(PlanEntry {
                id: r.id.clone(),
                issue_id: r.issue_id.clone(),
                kind: r.kind,
                severity: c.issue.severity,
                score: c.score,
                effort_estimate: r.effort_estimate,
                cumulative_effort: cumulative,
                stage: 0,
                target: r.target_location.path.to_string(),
                dependencies: r.dependencies.iter().cloned().collect(),
            });
        }

        let stages = partition_stages(&mut entries);

        let mut conflicts: Vec<Conflict> = graph.conflicts().to_vec();
        conflicts.extend(cycle_conflicts);
        conflicts.sort();

        let mut plan = ExecutionPlan::new(
            tool,
            PlanBudget {
                time_budget_minutes: budget,
                total_effort_minutes: cumulative,
                max_refactorings: config.max_refactorings,
            },
        );
        plan.summary = PlanSummary {
            candidates_total: candidates.len() as u64,
            admitted: entries.len() as u64,
            excluded: exclusions.list.len() as u64,
            stages: stages.len() as u64,
            conflicts: conflicts.len() as u64,
        };
        plan.entries = entries;
        plan.stages = stages;
        plan.exclusions = exclusions.list;
        plan.conflicts = conflicts;
        plan.cycles = cycles.into_iter().map(|c| c.members).collect();

        info!(
            candidates = plan.summary.candidates_total,
            admitted = plan.summary.admitted,
            excluded = plan.summary.excluded,
            stages = plan.summary.stages,
            effort = cumulative,
            budget,
            "plan built"
        );
        Ok(plan)
    }

    /// Records a plan in the registry: admitted entries become `scheduled`,
    /// exclusions become `skipped`.
    pub fn commit(
        registry: &mut Registry,
        plan: &ExecutionPlan,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        for entry in &plan.entries {
            registry.transition(&entry.id, RefactoringStatus::Scheduled, at)?;
        }
        for ex in &plan.exclusions {
            if registry.status(&ex.id) == Some(RefactoringStatus::Proposed) {
                registry.transition(&ex.id, RefactoringStatus::Skipped, at)?;
            }
        }
        Ok(())
    }
}

/// Walks admission order; a candidate opens a new stage when one of its
/// dependencies or its target file is already in the current stage.
fn partition_stages(entries: &mut [PlanEntry]) -> Vec<PlanStage> {
    let mut stages: Vec<PlanStage> = Vec::new();
    let mut current_ids: BTreeSet<String> = BTreeSet::new();
    let mut current_files: BTreeSet<String> = BTreeSet::new();

    for entry in entries.iter_mut() {
        let blocked = entry.dependencies.iter().any(|d| current_ids.contains(d))
            || current_files.contains(&entry.target);
        if stages.is_empty() || blocked {
            stages.push(PlanStage {
                index: stages.len(),
                ids: vec![],
            });
            current_ids.clear();
            current_files.clear();
        }
        let index = stages.len() - 1;
        entry.stage = index;
        stages[index].ids.push(entry.id.clone());
        current_ids.insert(entry.id.clone());
        current_files.insert(entry.target.clone());
    }

    stages
}
