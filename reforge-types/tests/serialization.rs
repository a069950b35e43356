use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use reforge_types::ToolInfo;
use reforge_types::candidates::CandidateEnvelope;
use reforge_types::conflict::{Conflict, ConflictKind};
use reforge_types::plan::{ExecutionPlan, PlanBudget};
use reforge_types::policy::{RiskTolerance, RunConfig, ScoreWeights};
use reforge_types::refactoring::{RefactoringKind, RefactoringStatus};
use reforge_types::run::{RunRecord, RunVerdict, StatusTransition};

fn tool() -> ToolInfo {
    ToolInfo {
        name: "reforge".to_string(),
        version: Some("0.1.0".to_string()),
        commit: None,
    }
}

#[test]
fn statuses_serialize_snake_case() {
    let rb = serde_json::to_value(RefactoringStatus::RolledBack).expect("serialize");
    let sk = serde_json::to_value(RefactoringStatus::Skipped).expect("serialize");
    assert_eq!(rb, serde_json::json!("rolled_back"));
    assert_eq!(sk, serde_json::json!("skipped"));

    let fail = serde_json::to_value(RunVerdict::Fail).expect("serialize");
    assert_eq!(fail, serde_json::json!("fail"));
}

#[test]
fn conflict_kind_serializes_snake_case() {
    let c = Conflict::new("r2", "r1", ConflictKind::LogicalContradiction);
    let v = serde_json::to_value(&c).expect("serialize");
    assert_eq!(
        v,
        serde_json::json!({"a": "r1", "b": "r2", "kind": "logical_contradiction"})
    );
}

#[test]
fn plan_omits_empty_cycles_and_carries_schema() {
    let plan = ExecutionPlan::new(
        tool(),
        PlanBudget {
            time_budget_minutes: 10,
            total_effort_minutes: 0,
            max_refactorings: None,
        },
    );
    let v = serde_json::to_value(&plan).expect("serialize");
    assert_eq!(v["schema"], serde_json::json!("reforge.plan.v1"));
    assert!(v.get("cycles").is_none());
    assert!(v["budget"].get("max_refactorings").is_none());
}

#[test]
fn run_record_round_trips_transitions() {
    let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut record = RunRecord::new(tool(), "run-1", at);
    record.entries.push(reforge_types::run::RunEntry {
        refactoring_id: "r1".to_string(),
        final_status: RefactoringStatus::Applied,
        stage: Some(0),
        transitions: vec![
            StatusTransition {
                status: RefactoringStatus::Applying,
                at,
            },
            StatusTransition {
                status: RefactoringStatus::Verifying,
                at,
            },
            StatusTransition {
                status: RefactoringStatus::Applied,
                at,
            },
        ],
        failure_reason: None,
        reason_token: None,
        failing_tests: vec![],
        files_changed: vec!["a.py".to_string()],
    });

    let json = serde_json::to_string(&record).expect("serialize");
    let back: RunRecord = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.schema, "reforge.run.v1");
    assert_eq!(back.final_status("r1"), Some(RefactoringStatus::Applied));
    assert_eq!(back.entries[0].transitions.len(), 3);
}

#[test]
fn run_config_fills_defaults() {
    let cfg: RunConfig =
        serde_json::from_str(r#"{"time_budget_minutes": 30}"#).expect("deserialize");
    assert_eq!(cfg.time_budget_minutes, 30);
    assert_eq!(cfg.risk_tolerance, RiskTolerance::Medium);
    assert_eq!(cfg.pass_rate_floor, 0.95);
    assert_eq!(cfg.max_parallel, 1);
    assert_eq!(cfg.scorer_weights, ScoreWeights::default());
}

#[test]
fn score_weights_accept_per_kind_table() {
    let json = serde_json::json!({
        "impact": 2.0,
        "per_kind": { "remove_dead_code": { "risk": 0.0 } }
    });
    let w: ScoreWeights = serde_json::from_value(json).expect("deserialize");
    assert_eq!(w.base.impact, 2.0);
    assert_eq!(w.base.effort, 0.5);
    let dead = w.for_kind(RefactoringKind::RemoveDeadCode);
    assert_eq!(dead.risk, 0.0);
    assert_eq!(dead.impact, 1.0);
}

#[test]
fn candidate_envelope_ignores_unknown_fields() {
    let json = serde_json::json!({
        "schema": "reforge.candidates.v1",
        "detector": { "name": "smells", "extra": true },
        "issues": [{
            "id": "i1",
            "kind": "maintainability",
            "severity": "high",
            "location": { "path": "x.py", "start_line": 1, "end_line": 10 },
            "confidence": 0.8,
            "detected_by": "smells",
            "something_new": 1
        }],
        "refactorings": []
    });
    let env: CandidateEnvelope = serde_json::from_value(json).expect("deserialize");
    assert_eq!(env.detector.name, "smells");
    assert_eq!(env.issues.len(), 1);
    assert!(env.refactorings.is_empty());
}
