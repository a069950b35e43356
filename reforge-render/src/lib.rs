//! Rendering helpers (markdown) for human-readable artifacts.

use reforge_types::plan::ExecutionPlan;
use reforge_types::run::RunRecord;

pub fn render_plan_md(plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    out.push_str("# reforge plan\n\n");
    out.push_str(&format!(
        "- Candidates: {} (admitted {}, excluded {})\n",
        plan.summary.candidates_total, plan.summary.admitted, plan.summary.excluded
    ));
    out.push_str(&format!(
        "- Effort: {} / {} minutes\n",
        plan.budget.total_effort_minutes, plan.budget.time_budget_minutes
    ));
    if let Some(max) = plan.budget.max_refactorings {
        out.push_str(&format!("- Max refactorings: {}\n", max));
    }
    out.push_str(&format!("- Stages: {}\n", plan.summary.stages));
    out.push_str(&format!("- Conflicts: {}\n\n", plan.summary.conflicts));

    out.push_str("## Admitted\n\n");
    if plan.entries.is_empty() {
        out.push_str("_No refactorings admitted._\n\n");
    }
    for (i, e) in plan.entries.iter().enumerate() {
        out.push_str(&format!("### {}. {}\n\n", i + 1, e.id));
        out.push_str(&format!("- Kind: `{}`\n", e.kind));
        out.push_str(&format!("- Issue: `{}` ({})\n", e.issue_id, e.severity.as_str()));
        out.push_str(&format!("- Target: `{}`\n", e.target));
        out.push_str(&format!("- Score: {:.3}\n", e.score));
        out.push_str(&format!(
            "- Effort: {} min (cumulative {})\n",
            e.effort_estimate, e.cumulative_effort
        ));
        out.push_str(&format!("- Stage: {}\n", e.stage));
        if !e.dependencies.is_empty() {
            out.push_str(&format!("- Depends on: {}\n", e.dependencies.join(", ")));
        }
        out.push('\n');
    }

    if !plan.exclusions.is_empty() {
        out.push_str("## Excluded\n\n");
        for ex in &plan.exclusions {
            out.push_str(&format!(
                "- `{}` `{}`: {}\n",
                ex.id, ex.reason_token, ex.reason
            ));
        }
        out.push('\n');
    }

    if !plan.cycles.is_empty() {
        out.push_str("## Dependency cycles\n\n");
        for cycle in &plan.cycles {
            out.push_str(&format!("- {}\n", cycle.join(" → ")));
        }
        out.push('\n');
    }

    out
}

pub fn render_run_md(run: &RunRecord) -> String {
    let mut out = String::new();
    out.push_str("# reforge run\n\n");
    out.push_str(&format!("- Run: `{}`\n", run.run_id));
    out.push_str(&format!("- Verdict: `{}`\n", run.verdict.as_str()));
    out.push_str(&format!(
        "- Applied: {}\n- Failed: {}\n- Skipped: {}\n",
        run.metrics.refactorings_applied,
        run.metrics.refactorings_failed,
        run.metrics.refactorings_skipped
    ));
    out.push_str(&format!("- Issues detected: {}\n", run.metrics.issues_detected));
    out.push_str(&format!("- Quality delta: {:.3}\n", run.metrics.quality_delta));
    if run.cancelled {
        out.push_str("- Cancelled: `true`\n");
    }
    out.push('\n');

    out.push_str("## Refactorings\n\n");
    if run.entries.is_empty() {
        out.push_str("_No refactorings._\n");
        return out;
    }

    for (i, e) in run.entries.iter().enumerate() {
        out.push_str(&format!("### {}. {}\n\n", i + 1, e.refactoring_id));
        out.push_str(&format!("- Status: `{}`\n", e.final_status));
        if let Some(stage) = e.stage {
            out.push_str(&format!("- Stage: {}\n", stage));
        }
        if let Some(token) = &e.reason_token {
            out.push_str(&format!("- Reason token: `{}`\n", token));
        }
        if let Some(reason) = &e.failure_reason {
            out.push_str(&format!("- Reason: {}\n", reason));
        }
        if !e.transitions.is_empty() {
            let path: Vec<&str> = e.transitions.iter().map(|t| t.status.as_str()).collect();
            out.push_str(&format!("- Transitions: {}\n", path.join(" → ")));
        }
        if !e.failing_tests.is_empty() {
            out.push_str("\n**Failing tests**\n\n");
            for t in &e.failing_tests {
                let origin = match t.origin {
                    reforge_types::verification::TestOrigin::PreExisting => "pre-existing",
                    reforge_types::verification::TestOrigin::Generated => "generated",
                };
                out.push_str(&format!("- `{}` ({})\n", t.name, origin));
            }
        }
        if !e.files_changed.is_empty() {
            out.push_str("\n**Files changed**\n\n");
            for f in &e.files_changed {
                out.push_str(&format!("- `{}`\n", f));
            }
        }
        out.push('\n');
    }

    out
}
