//! CLI argument parsing and end-to-end command tests.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn reforge() -> Command {
    Command::cargo_bin("reforge").expect("reforge binary")
}

fn create_temp_repo() -> TempDir {
    let td = tempfile::tempdir().expect("tempdir");
    let root = td.path();

    fs::write(root.join("a.py"), "def old_name():\n    return 1\n").unwrap();
    fs::write(root.join("b.py"), "import a\n").unwrap();

    // Create empty artifacts directory
    fs::create_dir_all(root.join("artifacts")).unwrap();

    td
}

fn write_candidates(root: &Path) {
    let envelope = serde_json::json!({
        "schema": "reforge.candidates.v1",
        "detector": { "name": "lint", "version": "1.0.0" },
        "issues": [{
            "id": "i1",
            "kind": "maintainability",
            "severity": "high",
            "location": { "path": "a.py", "start_line": 1, "end_line": 2 },
            "confidence": 0.5,
            "detected_by": "lint"
        }],
        "refactorings": [{
            "id": "r1",
            "kind": "rename",
            "issue_id": "i1",
            "target_location": { "path": "a.py", "start_line": 1, "end_line": 2 },
            "impact_score": 0.8,
            "effort_estimate": 10,
            "risk_score": 0.2
        }]
    });
    let dir = root.join("artifacts").join("lint");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("candidates.json"),
        serde_json::to_string_pretty(&envelope).unwrap(),
    )
    .unwrap();
}

fn read_json(path: &Path) -> serde_json::Value {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("read {}: {}", path.display(), e));
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_plan_no_args_uses_current_dir() {
    let temp = create_temp_repo();

    reforge()
        .current_dir(temp.path())
        .arg("plan")
        .assert()
        .success();

    let plan = read_json(&temp.path().join("artifacts/reforge/plan.json"));
    assert_eq!(plan["schema"], "reforge.plan.v1");
    assert_eq!(plan["summary"]["admitted"], 0);
}

#[test]
fn test_plan_admits_candidates() {
    let temp = create_temp_repo();
    write_candidates(temp.path());

    reforge()
        .current_dir(temp.path())
        .arg("plan")
        .assert()
        .success();

    let plan = read_json(&temp.path().join("artifacts/reforge/plan.json"));
    assert_eq!(plan["entries"][0]["id"], "r1");
    assert!(temp.path().join("artifacts/reforge/plan.md").exists());
}

#[test]
fn test_plan_with_explicit_paths() {
    let temp = create_temp_repo();
    write_candidates(temp.path());
    let out = temp.path().join("custom-out");

    reforge()
        .arg("plan")
        .arg("--repo-root")
        .arg(temp.path())
        .arg("--out-dir")
        .arg(&out)
        .assert()
        .success();

    assert!(out.join("plan.json").exists());
}

#[test]
fn test_plan_zero_budget_is_configuration_error() {
    let temp = create_temp_repo();

    reforge()
        .current_dir(temp.path())
        .args(["plan", "--budget-minutes", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn test_plan_low_risk_tolerance_excludes_risky_work() {
    let temp = create_temp_repo();
    write_candidates(temp.path());
    fs::write(
        temp.path().join("reforge.toml"),
        "[run]\nrisk_tolerance = \"high\"\n",
    )
    .unwrap();

    // CLI flag beats the config file.
    reforge()
        .current_dir(temp.path())
        .args(["plan", "--risk-tolerance", "low"])
        .assert()
        .success();

    let plan = read_json(&temp.path().join("artifacts/reforge/plan.json"));
    assert_eq!(plan["summary"]["admitted"], 1);

    fs::write(
        temp.path().join("artifacts/lint/candidates.json"),
        fs::read_to_string(temp.path().join("artifacts/lint/candidates.json"))
            .unwrap()
            .replace("\"risk_score\": 0.2", "\"risk_score\": 0.5"),
    )
    .unwrap();
    reforge()
        .current_dir(temp.path())
        .args(["plan", "--risk-tolerance", "low"])
        .assert()
        .success();

    let plan = read_json(&temp.path().join("artifacts/reforge/plan.json"));
    assert_eq!(plan["summary"]["admitted"], 0);
    assert_eq!(plan["exclusions"][0]["reason_token"], "risk_tolerance");
}

#[test]
fn test_invalid_risk_tolerance_rejected() {
    reforge()
        .args(["plan", "--risk-tolerance", "reckless"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_invalid_config_file_fails() {
    let temp = create_temp_repo();
    fs::write(temp.path().join("reforge.toml"), "[run\n").unwrap();

    reforge()
        .current_dir(temp.path())
        .arg("plan")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("reforge.toml"));
}

#[test]
fn test_run_without_executor_fails() {
    let temp = create_temp_repo();

    reforge()
        .current_dir(temp.path())
        .args(["run", "--runner", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no transform executor configured"));
}

#[test]
fn test_run_without_runner_fails() {
    let temp = create_temp_repo();

    reforge()
        .current_dir(temp.path())
        .args(["run", "--executor", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no test runner configured"));
}

#[test]
fn test_list_rules_text() {
    reforge()
        .arg("list-rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("Contradiction rules:"))
        .stdout(predicate::str::contains("extract_method"))
        .stdout(predicate::str::contains("inline_method"));
}

#[test]
fn test_list_rules_json() {
    let output = reforge()
        .args(["list-rules", "--format", "json"])
        .output()
        .expect("run reforge");
    assert!(output.status.success());

    let rules: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rules = rules.as_array().expect("rules array");
    assert!(!rules.is_empty());
    assert!(rules.iter().all(|r| r["first"].is_string()));
}

#[test]
fn test_version_flag() {
    reforge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("reforge"));
}

#[cfg(unix)]
mod commands {
    use super::*;

    const EXECUTOR_TOML: &str = r#"
[executor]
command = ["sh", "-c", '''printf '%s\n' "$REFORGE_KIND" > "$REFORGE_TARGET_PATH"''']
"#;

    const PASSING_RUNNER_TOML: &str = r#"
[verification]
command = ["sh", "-c", '''echo '{"passed": true, "tests_run": 3}' ''']
"#;

    // Fails a pre-existing test once the transform has touched a.py.
    const REGRESSING_RUNNER_TOML: &str = r#"
[verification]
command = ["sh", "-c", '''if grep -q rename a.py; then echo '{"passed": false, "failing_tests": [{"name": "test_a", "origin": "pre_existing"}]}'; else echo '{"passed": true}'; fi''']
"#;

    fn configure(root: &Path, runner: &str) {
        fs::write(
            root.join("reforge.toml"),
            format!("{}{}", EXECUTOR_TOML, runner),
        )
        .unwrap();
    }

    #[test]
    fn test_run_dry_run_leaves_repo_untouched() {
        let temp = create_temp_repo();
        write_candidates(temp.path());
        configure(temp.path(), PASSING_RUNNER_TOML);

        reforge()
            .current_dir(temp.path())
            .arg("run")
            .assert()
            .success();

        let out = temp.path().join("artifacts/reforge");
        let run = read_json(&out.join("run.json"));
        assert_eq!(run["schema"], "reforge.run.v1");
        assert_eq!(run["verdict"], "pass");
        assert_eq!(run["entries"][0]["final_status"], "applied");
        assert!(out.join("run.md").exists());

        let patch = fs::read_to_string(out.join("patch.diff")).unwrap();
        assert!(patch.contains("+rename"));

        let a = fs::read_to_string(temp.path().join("a.py")).unwrap();
        assert!(a.contains("old_name"), "dry run must not write: {}", a);
    }

    #[test]
    fn test_run_apply_writes_back_with_backup() {
        let temp = create_temp_repo();
        write_candidates(temp.path());
        configure(temp.path(), PASSING_RUNNER_TOML);

        reforge()
            .current_dir(temp.path())
            .args(["run", "--apply"])
            .assert()
            .success();

        let a = fs::read_to_string(temp.path().join("a.py")).unwrap();
        assert_eq!(a, "rename\n");
        let backup = temp
            .path()
            .join("artifacts/reforge/backups/a.py.reforge.bak");
        assert!(backup.exists(), "expected backup at {}", backup.display());
        assert!(
            fs::read_to_string(backup)
                .unwrap()
                .contains("old_name")
        );
    }

    #[test]
    fn test_run_apply_no_backups() {
        let temp = create_temp_repo();
        write_candidates(temp.path());
        configure(temp.path(), PASSING_RUNNER_TOML);

        reforge()
            .current_dir(temp.path())
            .args(["run", "--apply", "--no-backups"])
            .assert()
            .success();

        assert_eq!(
            fs::read_to_string(temp.path().join("a.py")).unwrap(),
            "rename\n"
        );
        assert!(!temp.path().join("artifacts/reforge/backups").exists());
    }

    #[test]
    fn test_run_regression_exits_with_failures() {
        let temp = create_temp_repo();
        write_candidates(temp.path());
        configure(temp.path(), REGRESSING_RUNNER_TOML);

        reforge()
            .current_dir(temp.path())
            .args(["run", "--apply"])
            .assert()
            .code(2);

        let run = read_json(&temp.path().join("artifacts/reforge/run.json"));
        assert_eq!(run["verdict"], "fail");
        assert_eq!(run["entries"][0]["final_status"], "rolled_back");
        assert_eq!(run["entries"][0]["reason_token"], "verification_failed");

        // Rolled back: nothing reaches the repository.
        let a = fs::read_to_string(temp.path().join("a.py")).unwrap();
        assert!(a.contains("old_name"));
    }

    #[test]
    fn test_run_executor_flag_overrides_config() {
        let temp = create_temp_repo();
        write_candidates(temp.path());
        configure(temp.path(), PASSING_RUNNER_TOML);

        // `false` exits non-zero: a transform error, failed without rollback.
        reforge()
            .current_dir(temp.path())
            .args(["run", "--executor", "false"])
            .assert()
            .code(2);

        let run = read_json(&temp.path().join("artifacts/reforge/run.json"));
        assert_eq!(run["entries"][0]["final_status"], "failed");
        assert_eq!(run["entries"][0]["reason_token"], "transform_error");
    }
}
