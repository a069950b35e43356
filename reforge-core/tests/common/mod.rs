#![allow(dead_code)]

use async_trait::async_trait;
use camino::Utf8Path;
use chrono::Utc;
use reforge_core::ports::{RunnerError, TestRunner, TransformError, TransformExecutor};
use reforge_core::supervisor::SupervisorConfig;
use reforge_domain::{Registry, Scheduler};
use reforge_types::ToolInfo;
use reforge_types::issue::{Issue, IssueKind, Severity};
use reforge_types::location::Location;
use reforge_types::plan::ExecutionPlan;
use reforge_types::policy::RunConfig;
use reforge_types::refactoring::{Refactoring, RefactoringKind};
use reforge_types::verification::{FailingTest, VerificationResult};
use reforge_workspace::Snapshot;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

pub const BREAKS_TESTS: &str = "BREAKS_TESTS";
pub const SLOW_TESTS: &str = "SLOW_TESTS";

pub fn tool() -> ToolInfo {
    ToolInfo {
        name: "reforge".to_string(),
        version: Some("0.1.0".to_string()),
        commit: None,
    }
}

pub fn initial_tree() -> Snapshot {
    Snapshot::from_files([
        ("a.py", "def a():\n    return 1\n"),
        ("b.py", "def b():\n    return 2\n"),
        ("c.py", "def c():\n    return 3\n"),
        ("tests/test_app.py", "def test_login():\n    pass\n"),
    ])
}

pub fn issue(id: &str, path: &str) -> Issue {
    Issue::new(
        id,
        IssueKind::Maintainability,
        Severity::Medium,
        Location::lines(path, 1, 2),
        0.5,
        "smells",
    )
}

/// A rename on `path` with impact 0.8, effort 10 and risk 0.2.
pub fn rename(id: &str, path: &str) -> Refactoring {
    Refactoring::new(
        id,
        RefactoringKind::Rename,
        format!("issue-{id}"),
        Location::lines(path, 1, 2),
    )
    .with_scores(0.8, 10, 0.2)
}

/// Registers one issue per refactoring, plans with `config` and commits.
pub fn planned(refactorings: Vec<Refactoring>, config: &RunConfig) -> (Registry, ExecutionPlan) {
    let mut registry = Registry::new();
    for r in &refactorings {
        registry
            .register_issue(issue(&r.issue_id, r.target_location.path.as_str()))
            .expect("register issue");
    }
    for r in refactorings {
        registry.propose(r).expect("propose");
    }
    let plan = Scheduler::default()
        .plan(&registry, config, tool())
        .expect("plan");
    Scheduler::commit(&mut registry, &plan, Utc::now()).expect("commit");
    (registry, plan)
}

pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        executor_timeout: Duration::from_secs(10),
        runner_timeout: Duration::from_secs(10),
        pass_rate_floor: 0.95,
        max_parallel: 1,
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    /// Write `content` to `path` instead of the target file.
    Write(&'static str, &'static str),
    Reject(&'static str),
    Hang,
}

/// Rewrites the target file unless a script says otherwise.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: BTreeMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, id: &str, script: Script) -> Self {
        self.scripts.insert(id.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl TransformExecutor for ScriptedExecutor {
    async fn apply(
        &self,
        refactoring: &Refactoring,
        snapshot: &Snapshot,
    ) -> Result<Snapshot, TransformError> {
        self.calls.lock().expect("lock").push(refactoring.id.clone());
        let mut out = snapshot.clone();
        match self.scripts.get(&refactoring.id) {
            Some(Script::Reject(message)) => {
                return Err(TransformError::Rejected {
                    message: message.to_string(),
                });
            }
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            Some(Script::Write(path, content)) => out.write(*path, *content),
            None => out.write(
                refactoring.target_location.path.clone(),
                format!("# refactored by {}\n", refactoring.id),
            ),
        }
        Ok(out)
    }
}

/// Passes unless a file carries one of the markers above.
#[derive(Debug, Default)]
pub struct MarkerRunner {
    runs: Mutex<u32>,
}

impl MarkerRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> u32 {
        *self.runs.lock().expect("lock")
    }
}

fn any_file_contains(snapshot: &Snapshot, marker: &str) -> bool {
    snapshot
        .paths()
        .filter_map(|p| snapshot.get_str(p))
        .any(|s| s.contains(marker))
}

#[async_trait]
impl TestRunner for MarkerRunner {
    async fn run(&self, snapshot: &Snapshot) -> Result<VerificationResult, RunnerError> {
        *self.runs.lock().expect("lock") += 1;
        if any_file_contains(snapshot, SLOW_TESTS) {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        if any_file_contains(snapshot, BREAKS_TESTS) {
            return Ok(VerificationResult {
                passed: false,
                failing_tests: vec![
                    FailingTest::pre_existing("test_login"),
                    FailingTest::pre_existing("test_logout"),
                ],
                generated_test_pass_rate: Some(0.96),
                compiler_errors: vec![],
                tests_run: Some(50),
            });
        }
        Ok(VerificationResult {
            tests_run: Some(50),
            ..VerificationResult::passing()
        })
    }
}

pub fn text<'a>(snapshot: &'a Snapshot, path: &str) -> Option<&'a str> {
    snapshot.get_str(Utf8Path::new(path))
}
