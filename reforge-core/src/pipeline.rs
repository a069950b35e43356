//! Plan and run pipelines, extracted from the CLI.
//!
//! Candidate loading and artifact writing go through the port traits;
//! transforms and verification go through the [`Supervisor`].

use crate::ports::{CandidateSource, WritePort};
use crate::settings::{PlanSettings, RunSettings};
use crate::supervisor::{Execution, Supervisor};
use anyhow::Context;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use reforge_domain::{ConfigurationError, Registry, Scheduler, validate_run_config};
use reforge_render::{render_plan_md, render_run_md};
use reforge_types::ToolInfo;
use reforge_types::plan::ExecutionPlan;
use reforge_types::refactoring::RefactoringStatus;
use reforge_types::run::{RunEntry, RunMetrics, RunRecord, RunVerdict};
use reforge_workspace::{Snapshot, WriteBackOptions, WrittenFile, Workspace, render_patch, write_back};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error type for pipeline results. Exit code 1 for both; a run that
/// finished with failures is not an error (see `RunOutcome::has_failures`).
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Registry populated from every loadable candidate file.
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub registry: Registry,
    /// Unreadable inputs and rejected records, one message each.
    pub input_errors: Vec<String>,
}

/// Registers all issues before any refactoring so that proposals may
/// reference issues reported by another detector.
pub fn ingest(source: &dyn CandidateSource) -> anyhow::Result<Ingested> {
    let loaded = source.load_candidates()?;
    let mut out = Ingested::default();

    let mut envelopes = Vec::new();
    for c in &loaded {
        for e in &c.rejected {
            out.input_errors.push(format!("{}: {}", c.path, e));
        }
        match &c.envelope {
            Ok(env) => envelopes.push((c, env)),
            Err(e) => out.input_errors.push(format!("{}: {}", c.path, e)),
        }
    }

    for (c, env) in &envelopes {
        for issue in &env.issues {
            if let Err(e) = out.registry.register_issue(issue.clone()) {
                warn!(path = %c.path, error = %e, "rejected issue");
                out.input_errors.push(format!("{}: {}", c.path, e));
            }
        }
    }
    for (c, env) in &envelopes {
        for r in &env.refactorings {
            match out.registry.propose(r.clone()) {
                Ok(id) => debug!(id = %id, detector = %c.detector_id, "proposed"),
                Err(e) => {
                    warn!(path = %c.path, error = %e, "rejected refactoring");
                    out.input_errors.push(format!("{}: {}", c.path, e));
                }
            }
        }
    }

    debug!(
        inputs = loaded.len(),
        issues = out.registry.issues().count(),
        refactorings = out.registry.refactorings().count(),
        errors = out.input_errors.len(),
        "ingested candidates"
    );
    Ok(out)
}

/// Outcome of `run_plan`.
pub struct PlanOutcome {
    pub plan: ExecutionPlan,
    pub registry: Registry,
    pub input_errors: Vec<String>,
}

/// Run the plan pipeline: ingest candidates and schedule them.
///
/// Nothing is committed to the registry; see `Scheduler::commit`.
pub fn run_plan(
    settings: &PlanSettings,
    source: &dyn CandidateSource,
    scheduler: &Scheduler,
    tool: ToolInfo,
) -> Result<PlanOutcome, ToolError> {
    validate_run_config(&settings.run)?;
    let Ingested {
        registry,
        input_errors,
    } = ingest(source)?;
    let plan = scheduler.plan(&registry, &settings.run, tool)?;

    Ok(PlanOutcome {
        plan,
        registry,
        input_errors,
    })
}

/// Write all plan artifacts to the output directory.
pub fn write_plan_artifacts(
    outcome: &PlanOutcome,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    let plan_json = serde_json::to_string_pretty(&outcome.plan).context("serialize plan")?;
    writer.write_file(&out_dir.join("plan.json"), plan_json.as_bytes())?;

    let plan_md = render_plan_md(&outcome.plan);
    writer.write_file(&out_dir.join("plan.md"), plan_md.as_bytes())?;

    Ok(())
}

/// Outcome of `run_orchestration`.
pub struct RunOutcome {
    pub plan: ExecutionPlan,
    pub record: RunRecord,
    /// Unified diff from the initial tree to the final head.
    pub patch: String,
    /// Files written to the repository (empty on dry runs).
    pub written: Vec<WrittenFile>,
    pub has_failures: bool,
}

/// Run the full pipeline: plan, commit, execute, verify and (with
/// `settings.apply`) write the final tree back.
pub async fn run_orchestration(
    settings: &RunSettings,
    source: &dyn CandidateSource,
    scheduler: &Scheduler,
    supervisor: &Supervisor,
    initial: Snapshot,
    tool: ToolInfo,
) -> Result<RunOutcome, ToolError> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4().to_string();

    let PlanOutcome {
        plan,
        mut registry,
        input_errors,
    } = run_plan(&settings.plan_settings(), source, scheduler, tool.clone())?;
    Scheduler::commit(&mut registry, &plan, Utc::now()).context("commit plan")?;

    let mut workspace = Workspace::new(initial);
    let before = workspace.head_snapshot();
    let execution = supervisor
        .execute(&mut registry, &mut workspace, &plan)
        .await?;
    let after = workspace.head_snapshot();
    let patch = render_patch(&before, &after);

    let written = if settings.apply && before.digest() != after.digest() {
        let opts = WriteBackOptions {
            backup_dir: settings
                .backup_enabled
                .then(|| settings.out_dir.join("backups")),
            backup_suffix: settings.backup_suffix.clone(),
        };
        write_back(&settings.repo_root, &before, &after, &opts).context("write back")?
    } else {
        vec![]
    };

    let mut record = build_run_record(tool, run_id, started_at, &registry, &plan, &execution);
    record.head_digest_before = Some(before.digest());
    record.head_digest_after = Some(after.digest());
    record.errors = input_errors;
    record.ended_at = Some(Utc::now());

    let has_failures = record.metrics.refactorings_failed > 0;
    info!(
        run_id = %record.run_id,
        verdict = record.verdict.as_str(),
        applied = record.metrics.refactorings_applied,
        failed = record.metrics.refactorings_failed,
        skipped = record.metrics.refactorings_skipped,
        written = written.len(),
        dry_run = !settings.apply,
        "run finished"
    );

    Ok(RunOutcome {
        plan,
        record,
        patch,
        written,
        has_failures,
    })
}

/// Assembles the audit record: admitted entries in admission order, then
/// plan exclusions.
pub fn build_run_record(
    tool: ToolInfo,
    run_id: String,
    started_at: DateTime<Utc>,
    registry: &Registry,
    plan: &ExecutionPlan,
    execution: &Execution,
) -> RunRecord {
    let mut record = RunRecord::new(tool, run_id, started_at);
    record.entries = execution.entries.clone();
    for ex in &plan.exclusions {
        record.entries.push(RunEntry {
            refactoring_id: ex.id.clone(),
            final_status: registry
                .status(&ex.id)
                .unwrap_or(RefactoringStatus::Skipped),
            stage: None,
            transitions: registry.history(&ex.id).to_vec(),
            failure_reason: Some(ex.reason.clone()),
            reason_token: Some(ex.reason_token.clone()),
            failing_tests: vec![],
            files_changed: vec![],
        });
    }

    record.metrics = metrics(registry, &record.entries);
    record.verdict = verdict(&execution.entries);
    record.cancelled = execution.cancelled;
    record
}

fn metrics(registry: &Registry, entries: &[RunEntry]) -> RunMetrics {
    let count = |pred: fn(RefactoringStatus) -> bool| {
        entries.iter().filter(|e| pred(e.final_status)).count() as u64
    };

    let quality_delta: f64 = entries
        .iter()
        .filter(|e| e.final_status == RefactoringStatus::Applied)
        .filter_map(|e| {
            let r = registry.refactoring(&e.refactoring_id)?;
            let issue = registry.issue(&r.issue_id)?;
            Some(r.impact_score * issue.confidence)
        })
        .sum();

    RunMetrics {
        issues_detected: registry.issues().count() as u64,
        refactorings_applied: count(|s| s == RefactoringStatus::Applied),
        refactorings_failed: count(|s| {
            matches!(s, RefactoringStatus::Failed | RefactoringStatus::RolledBack)
        }),
        refactorings_skipped: count(|s| s == RefactoringStatus::Skipped),
        quality_delta,
    }
}

/// Judged on admitted work only; plan exclusions never degrade a run.
fn verdict(admitted: &[RunEntry]) -> RunVerdict {
    let failed = admitted.iter().any(|e| {
        matches!(
            e.final_status,
            RefactoringStatus::Failed | RefactoringStatus::RolledBack
        )
    });
    if failed {
        return RunVerdict::Fail;
    }
    if admitted
        .iter()
        .any(|e| e.final_status != RefactoringStatus::Applied)
    {
        return RunVerdict::Warn;
    }
    RunVerdict::Pass
}

/// Write all run artifacts to the output directory.
pub fn write_run_artifacts(
    outcome: &RunOutcome,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    let plan_json = serde_json::to_string_pretty(&outcome.plan).context("serialize plan")?;
    writer.write_file(&out_dir.join("plan.json"), plan_json.as_bytes())?;
    writer.write_file(
        &out_dir.join("plan.md"),
        render_plan_md(&outcome.plan).as_bytes(),
    )?;

    let run_json = serde_json::to_string_pretty(&outcome.record).context("serialize run")?;
    writer.write_file(&out_dir.join("run.json"), run_json.as_bytes())?;
    writer.write_file(
        &out_dir.join("run.md"),
        render_run_md(&outcome.record).as_bytes(),
    )?;

    writer.write_file(&out_dir.join("patch.diff"), outcome.patch.as_bytes())?;

    Ok(())
}
