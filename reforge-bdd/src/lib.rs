//! BDD harness (cucumber-rs).
//!
//! Fixture builders for the acceptance scenarios: candidate files written the
//! way a detector would, and `reforge.toml` files wiring shell commands in as
//! transform executor and test runner.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use reforge_types::candidates::{CandidateEnvelope, DetectorInfo};
use reforge_types::issue::{Issue, IssueKind, Severity};
use reforge_types::location::Location;
use reforge_types::refactoring::{Refactoring, RefactoringKind};
use reforge_types::verification::{FailingTest, VerificationResult};
use serde::Serialize;

/// Candidates accumulated by scenario steps. Every refactoring gets its own
/// issue named `issue-<id>`.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    issues: Vec<Issue>,
    refactorings: Vec<Refactoring>,
}

impl CandidateSet {
    pub fn add(
        &mut self,
        id: &str,
        kind: RefactoringKind,
        location: Location,
        impact: f64,
        effort: u64,
    ) {
        let issue_id = format!("issue-{id}");
        self.issues.push(Issue::new(
            issue_id.clone(),
            IssueKind::Maintainability,
            Severity::Medium,
            location.clone(),
            0.8,
            "bdd",
        ));
        self.refactorings
            .push(Refactoring::new(id, kind, issue_id, location).with_scores(impact, effort, 0.1));
    }

    pub fn add_dependency(&mut self, id: &str, dependency: &str) -> anyhow::Result<()> {
        let r = self
            .refactorings
            .iter_mut()
            .find(|r| r.id == id)
            .with_context(|| format!("no candidate `{id}`"))?;
        r.dependencies.insert(dependency.to_string());
        Ok(())
    }

    pub fn envelope(&self, detector: &str) -> CandidateEnvelope {
        let mut env = CandidateEnvelope::new(DetectorInfo {
            name: detector.to_string(),
            version: Some("0.0.0".to_string()),
        });
        env.issues = self.issues.clone();
        env.refactorings = self.refactorings.clone();
        env
    }

    /// Writes `<artifacts_dir>/<detector>/candidates.json`.
    pub fn write(&self, artifacts_dir: &Utf8Path, detector: &str) -> anyhow::Result<Utf8PathBuf> {
        let dir = artifacts_dir.join(detector);
        fs::create_dir_all(&dir)?;
        let path = dir.join("candidates.json");
        let json = serde_json::to_string_pretty(&self.envelope(detector))
            .context("serialize candidates")?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

/// The parts of `reforge.toml` scenarios care about.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<RunTable>,

    #[serde(skip_serializing_if = "Option::is_none")]
    executor: Option<CommandTable>,

    #[serde(skip_serializing_if = "Option::is_none")]
    verification: Option<CommandTable>,
}

#[derive(Debug, Clone, Serialize)]
struct RunTable {
    time_budget_minutes: u64,
}

#[derive(Debug, Clone, Serialize)]
struct CommandTable {
    command: Vec<String>,
}

impl RepoConfig {
    pub fn set_budget(&mut self, minutes: u64) {
        self.run = Some(RunTable {
            time_budget_minutes: minutes,
        });
    }

    pub fn set_executor(&mut self, script: &str) {
        self.executor = Some(shell(script));
    }

    pub fn set_runner(&mut self, script: &str) {
        self.verification = Some(shell(script));
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string(self).context("serialize reforge.toml")
    }

    pub fn write(&self, repo_root: &Utf8Path) -> anyhow::Result<()> {
        fs::write(repo_root.join("reforge.toml"), self.to_toml()?)?;
        Ok(())
    }
}

fn shell(script: &str) -> CommandTable {
    CommandTable {
        command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    }
}

/// Appends the refactoring id to its target file.
pub const APPEND_ID_EXECUTOR: &str =
    r#"printf '%s\n' "$REFORGE_REFACTORING_ID" >> "$REFORGE_TARGET_PATH""#;

pub fn passing_runner() -> anyhow::Result<String> {
    let json = serde_json::to_string(&VerificationResult::passing())?;
    Ok(format!("echo '{json}'"))
}

/// A runner that passes until `path` contains `needle`, then reports
/// `failures` pre-existing test failures out of `total` tests.
pub fn regressing_runner(path: &str, needle: &str, failures: u64, total: u64) -> anyhow::Result<String> {
    let failing = VerificationResult {
        passed: false,
        failing_tests: (1..=failures)
            .map(|n| FailingTest::pre_existing(format!("test_existing_{n}")))
            .collect(),
        generated_test_pass_rate: Some((total - failures) as f64 / total as f64),
        compiler_errors: vec![],
        tests_run: Some(total),
    };
    let failing = serde_json::to_string(&failing)?;
    let passing = serde_json::to_string(&VerificationResult::passing())?;
    Ok(format!(
        "if grep -q '{needle}' '{path}'; then echo '{failing}'; else echo '{passing}'; fi"
    ))
}

/// A source file with `lines` numbered lines.
pub fn source_file(lines: u32) -> String {
    (1..=lines).map(|n| format!("line_{n} = {n}\n")).collect()
}
