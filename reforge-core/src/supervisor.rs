//! Execution and verification of a committed plan.
//!
//! The [`Supervisor`] walks the plan stage by stage. Every refactoring goes
//! `scheduled → applying → verifying → applied`, or ends in `failed` (and
//! `rolled_back` once something had to be undone). Transforms and test runs
//! happen on snapshot values owned by a worker; only the coordinator moves
//! the workspace head or touches the registry.

use crate::ports::{TestRunner, TransformExecutor};
use crate::verify::{Baseline, VerificationFailure, evaluate};
use anyhow::Context;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use reforge_domain::Registry;
use reforge_types::plan::{ExecutionPlan, PlanEntry, reason_tokens};
use reforge_types::policy::RunConfig;
use reforge_types::refactoring::{Refactoring, RefactoringStatus};
use reforge_types::run::RunEntry;
use reforge_types::verification::{FailingTest, VerificationResult};
use reforge_workspace::{Snapshot, Workspace};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisorConfig {
    pub executor_timeout: Duration,
    pub runner_timeout: Duration,
    pub pass_rate_floor: f64,
    pub max_parallel: usize,
}

impl From<&RunConfig> for SupervisorConfig {
    fn from(cfg: &RunConfig) -> Self {
        Self {
            executor_timeout: Duration::from_secs(cfg.executor_timeout_secs),
            runner_timeout: Duration::from_secs(cfg.runner_timeout_secs),
            pass_rate_floor: cfg.pass_rate_floor,
            max_parallel: cfg.max_parallel.max(1),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

/// Why one refactoring did not reach `applied`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ItemFailure {
    #[error("transform failed: {message}")]
    Transform { message: String },

    #[error("transform executor timed out after {timeout:?}")]
    ExecutorTimeout { timeout: Duration },

    #[error("test runner timed out after {timeout:?}")]
    RunnerTimeout { timeout: Duration },

    #[error("test runner failed: {message}")]
    Runner { message: String },

    #[error("verification failed: {0}")]
    Verification(VerificationFailure),

    #[error("cancelled while {during}")]
    Cancelled { during: RefactoringStatus },

    #[error("merge conflict with `{other}` on {path}")]
    MergeConflict { other: String, path: Utf8PathBuf },
}

impl ItemFailure {
    pub fn reason_token(&self) -> &'static str {
        match self {
            ItemFailure::Transform { .. } => reason_tokens::TRANSFORM_ERROR,
            ItemFailure::ExecutorTimeout { .. } => reason_tokens::EXECUTOR_TIMEOUT,
            ItemFailure::RunnerTimeout { .. } => reason_tokens::RUNNER_TIMEOUT,
            ItemFailure::Runner { .. } => reason_tokens::RUNNER_ERROR,
            ItemFailure::Verification(_) => reason_tokens::VERIFICATION_FAILED,
            ItemFailure::Cancelled { .. } => reason_tokens::CANCELLED,
            ItemFailure::MergeConflict { .. } => reason_tokens::MERGE_CONFLICT,
        }
    }

    /// A transform that reported an error never produced a tree, so there
    /// is nothing to roll back.
    pub fn rolls_back(&self) -> bool {
        !matches!(self, ItemFailure::Transform { .. })
    }

    fn failing_tests(&self) -> Vec<FailingTest> {
        match self {
            ItemFailure::Verification(v) => v.failing_tests.clone(),
            _ => vec![],
        }
    }
}

/// Result of [`Supervisor::execute`].
#[derive(Debug, Clone)]
pub struct Execution {
    /// One entry per admitted refactoring, in admission order.
    pub entries: Vec<RunEntry>,
    /// Failures present on the untouched tree.
    pub baseline: Baseline,
    pub cancelled: bool,
}

pub struct Supervisor {
    executor: Arc<dyn TransformExecutor>,
    runner: Arc<dyn TestRunner>,
    config: SupervisorConfig,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        executor: Arc<dyn TransformExecutor>,
        runner: Arc<dyn TestRunner>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            executor,
            runner,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the test runner on the untouched tree. A baseline that cannot be
    /// established is treated as empty.
    pub async fn baseline(&self, snapshot: &Snapshot) -> Baseline {
        match tokio::time::timeout(self.config.runner_timeout, self.runner.run(snapshot)).await {
            Ok(Ok(result)) => {
                let baseline = Baseline::from_result(&result);
                debug!(
                    failing_tests = baseline.failing_tests.len(),
                    compiler_errors = baseline.compiler_errors.len(),
                    "baseline established"
                );
                baseline
            }
            Ok(Err(e)) => {
                warn!(error = %e, "baseline run failed; using an empty baseline");
                Baseline::empty()
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.runner_timeout,
                    "baseline run timed out; using an empty baseline"
                );
                Baseline::empty()
            }
        }
    }

    /// Executes every stage of `plan` against `workspace`.
    ///
    /// The plan must already be committed to `registry`
    /// (see `Scheduler::commit`): admitted entries are expected in
    /// `scheduled`. Each attempt is verified against the failures of the
    /// current head, so a test fixed by an earlier refactoring must keep
    /// passing.
    pub async fn execute(
        &self,
        registry: &mut Registry,
        workspace: &mut Workspace,
        plan: &ExecutionPlan,
    ) -> anyhow::Result<Execution> {
        let initial = self.baseline(&workspace.head_snapshot()).await;
        let mut baseline = Arc::new(initial.clone());
        let worker = Worker {
            executor: Arc::clone(&self.executor),
            runner: Arc::clone(&self.runner),
            config: self.config,
            cancel: self.cancel.clone(),
        };
        let by_id: BTreeMap<&str, &PlanEntry> =
            plan.entries.iter().map(|e| (e.id.as_str(), e)).collect();
        let mut ledger = Ledger::default();

        for stage in &plan.stages {
            let mut runnable = Vec::new();
            for id in &stage.ids {
                if self.cancel.is_cancelled() {
                    ledger.skip(registry, id, reason_tokens::CANCELLED, "run cancelled before start")?;
                    continue;
                }
                let failed_dep = by_id
                    .get(id.as_str())
                    .and_then(|e| e.dependencies.iter().find(|d| ledger.unapplied.contains(*d)));
                if let Some(dep) = failed_dep {
                    let reason = format!("dependency `{dep}` was not applied");
                    ledger.skip(registry, id, reason_tokens::DEPENDENCY_FAILED, &reason)?;
                    continue;
                }
                let refactoring = registry
                    .refactoring(id)
                    .cloned()
                    .with_context(|| format!("plan entry `{id}` is not registered"))?;
                runnable.push(refactoring);
            }

            if runnable.len() > 1 && self.config.max_parallel > 1 {
                debug!(stage = stage.index, workers = runnable.len(), "parallel stage");
                self.run_parallel(
                    registry,
                    workspace,
                    &mut ledger,
                    &worker,
                    &mut baseline,
                    runnable,
                )
                .await?;
            } else {
                for refactoring in runnable {
                    if self.cancel.is_cancelled() {
                        ledger.skip(
                            registry,
                            &refactoring.id,
                            reason_tokens::CANCELLED,
                            "run cancelled before start",
                        )?;
                        continue;
                    }
                    self.run_one(
                        registry,
                        workspace,
                        &mut ledger,
                        &worker,
                        &mut baseline,
                        refactoring,
                    )
                    .await?;
                }
            }
        }

        let entries = plan
            .entries
            .iter()
            .map(|e| ledger.entry(registry, e))
            .collect::<Vec<_>>();
        let cancelled = self.cancel.is_cancelled();
        info!(
            admitted = entries.len(),
            applied = entries
                .iter()
                .filter(|e| e.final_status == RefactoringStatus::Applied)
                .count(),
            unapplied = ledger.unapplied.len(),
            cancelled,
            head = %workspace.head(),
            "plan executed"
        );

        Ok(Execution {
            entries,
            baseline: initial,
            cancelled,
        })
    }

    async fn run_one(
        &self,
        registry: &mut Registry,
        workspace: &mut Workspace,
        ledger: &mut Ledger,
        worker: &Worker,
        baseline: &mut Arc<Baseline>,
        refactoring: Refactoring,
    ) -> anyhow::Result<()> {
        let pre = workspace.head();
        let base = workspace.head_snapshot();
        let attempt = worker
            .clone()
            .attempt(refactoring, Arc::clone(&base), Arc::clone(baseline))
            .await;

        match attempt.outcome {
            Ok(Verified { snapshot, result }) => {
                let files = snapshot.changed_paths(&base);
                let head = workspace.commit(snapshot);
                debug!(id = %attempt.id, head = %head, files = files.len(), "committed");
                ledger.applied(registry, &attempt.id, attempt.started, files)?;
                *baseline = Arc::new(Baseline::from_result(&result));
            }
            Err(failure) => {
                ledger.failed(registry, &attempt.id, attempt.started, &failure)?;
                workspace.set_head(pre)?;
            }
        }
        Ok(())
    }

    async fn run_parallel(
        &self,
        registry: &mut Registry,
        workspace: &mut Workspace,
        ledger: &mut Ledger,
        worker: &Worker,
        baseline: &mut Arc<Baseline>,
        runnable: Vec<Refactoring>,
    ) -> anyhow::Result<()> {
        let base = workspace.head_snapshot();
        let order: Vec<String> = runnable.iter().map(|r| r.id.clone()).collect();
        let permits = Arc::new(Semaphore::new(self.config.max_parallel));
        let mut set = JoinSet::new();

        for refactoring in runnable {
            let worker = worker.clone();
            let permits = Arc::clone(&permits);
            let base = Arc::clone(&base);
            let baseline = Arc::clone(baseline);
            set.spawn(async move {
                let id = refactoring.id.clone();
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (id, None);
                };
                if worker.cancel.is_cancelled() {
                    return (id, None);
                }
                (id, Some(worker.attempt(refactoring, base, baseline).await))
            });
        }

        let mut results: BTreeMap<String, Option<Attempt>> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, attempt)) => {
                    results.insert(id, attempt);
                }
                Err(e) => warn!(error = %e, "worker task aborted"),
            }
        }

        let mut merged = (*base).clone();
        let mut touched: BTreeMap<Utf8PathBuf, String> = BTreeMap::new();
        // Failures shared by every merged result; `None` until one is merged.
        let mut next_baseline: Option<Baseline> = None;

        for id in order {
            let attempt = match results.remove(&id) {
                Some(Some(attempt)) => attempt,
                Some(None) => {
                    ledger.skip(registry, &id, reason_tokens::CANCELLED, "run cancelled before start")?;
                    continue;
                }
                None => {
                    let failure = ItemFailure::Transform {
                        message: "worker task aborted".to_string(),
                    };
                    let started = Started {
                        applying: Utc::now(),
                        verifying: None,
                    };
                    ledger.failed(registry, &id, started, &failure)?;
                    continue;
                }
            };

            let Verified { snapshot, result } = match attempt.outcome {
                Ok(verified) => verified,
                Err(failure) => {
                    ledger.failed(registry, &id, attempt.started, &failure)?;
                    continue;
                }
            };

            let files = snapshot.changed_paths(&base);
            let clash = files
                .iter()
                .find_map(|p| touched.get(p).map(|other| (p.clone(), other.clone())));
            if let Some((path, other)) = clash {
                let failure = ItemFailure::MergeConflict { other, path };
                ledger.failed(registry, &id, attempt.started, &failure)?;
                continue;
            }

            merged.overlay(&base, &snapshot);
            for path in &files {
                touched.insert(path.clone(), id.clone());
            }
            ledger.applied(registry, &id, attempt.started, files)?;
            let verified = Baseline::from_result(&result);
            next_baseline = Some(match next_baseline {
                Some(acc) => acc.intersection(&verified),
                None => verified,
            });
        }

        if let Some(next) = next_baseline {
            let head = workspace.commit(merged);
            debug!(
                head = %head,
                files = touched.len(),
                failing_tests = next.failing_tests.len(),
                "merged parallel stage"
            );
            *baseline = Arc::new(next);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Started {
    applying: DateTime<Utc>,
    verifying: Option<DateTime<Utc>>,
}

/// A result tree together with the runner output that accepted it.
struct Verified {
    snapshot: Snapshot,
    result: VerificationResult,
}

struct Attempt {
    id: String,
    started: Started,
    outcome: Result<Verified, ItemFailure>,
}

#[derive(Clone)]
struct Worker {
    executor: Arc<dyn TransformExecutor>,
    runner: Arc<dyn TestRunner>,
    config: SupervisorConfig,
    cancel: CancellationToken,
}

impl Worker {
    async fn attempt(
        self,
        refactoring: Refactoring,
        base: Arc<Snapshot>,
        baseline: Arc<Baseline>,
    ) -> Attempt {
        let mut started = Started {
            applying: Utc::now(),
            verifying: None,
        };
        let outcome = self
            .transform_and_verify(&refactoring, &base, &baseline, &mut started)
            .await;
        Attempt {
            id: refactoring.id,
            started,
            outcome,
        }
    }

    async fn transform_and_verify(
        &self,
        refactoring: &Refactoring,
        base: &Snapshot,
        baseline: &Baseline,
        started: &mut Started,
    ) -> Result<Verified, ItemFailure> {
        let applied = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(ItemFailure::Cancelled { during: RefactoringStatus::Applying });
            }
            res = tokio::time::timeout(
                self.config.executor_timeout,
                self.executor.apply(refactoring, base),
            ) => res,
        };
        let candidate = match applied {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                return Err(ItemFailure::Transform {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ItemFailure::ExecutorTimeout {
                    timeout: self.config.executor_timeout,
                });
            }
        };

        started.verifying = Some(Utc::now());
        let verified = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(ItemFailure::Cancelled { during: RefactoringStatus::Verifying });
            }
            res = tokio::time::timeout(self.config.runner_timeout, self.runner.run(&candidate)) => res,
        };
        let result = match verified {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(ItemFailure::Runner {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ItemFailure::RunnerTimeout {
                    timeout: self.config.runner_timeout,
                });
            }
        };

        evaluate(baseline, &result, self.config.pass_rate_floor)
            .map_err(ItemFailure::Verification)?;
        Ok(Verified {
            snapshot: candidate,
            result,
        })
    }
}

#[derive(Debug, Default)]
struct Note {
    reason: Option<String>,
    token: Option<&'static str>,
    failing_tests: Vec<FailingTest>,
    files_changed: Vec<String>,
}

/// Coordinator-side bookkeeping: registry transitions plus what ends up in
/// each run entry.
#[derive(Debug, Default)]
struct Ledger {
    notes: BTreeMap<String, Note>,
    unapplied: BTreeSet<String>,
}

impl Ledger {
    fn record_start(registry: &mut Registry, id: &str, started: Started) -> anyhow::Result<()> {
        registry.transition(id, RefactoringStatus::Applying, started.applying)?;
        if let Some(at) = started.verifying {
            registry.transition(id, RefactoringStatus::Verifying, at)?;
        }
        Ok(())
    }

    fn applied(
        &mut self,
        registry: &mut Registry,
        id: &str,
        started: Started,
        files: BTreeSet<Utf8PathBuf>,
    ) -> anyhow::Result<()> {
        Self::record_start(registry, id, started)?;
        registry.transition(id, RefactoringStatus::Applied, Utc::now())?;
        self.notes.insert(
            id.to_string(),
            Note {
                files_changed: files.into_iter().map(|p| p.into_string()).collect(),
                ..Note::default()
            },
        );
        Ok(())
    }

    fn failed(
        &mut self,
        registry: &mut Registry,
        id: &str,
        started: Started,
        failure: &ItemFailure,
    ) -> anyhow::Result<()> {
        Self::record_start(registry, id, started)?;
        let now = Utc::now();
        registry.transition(id, RefactoringStatus::Failed, now)?;
        if failure.rolls_back() {
            registry.transition(id, RefactoringStatus::RolledBack, now)?;
        }
        warn!(
            id = %id,
            reason_token = failure.reason_token(),
            reason = %failure,
            "refactoring failed"
        );
        self.unapplied.insert(id.to_string());
        self.notes.insert(
            id.to_string(),
            Note {
                reason: Some(failure.to_string()),
                token: Some(failure.reason_token()),
                failing_tests: failure.failing_tests(),
                files_changed: vec![],
            },
        );
        Ok(())
    }

    fn skip(
        &mut self,
        registry: &mut Registry,
        id: &str,
        token: &'static str,
        reason: &str,
    ) -> anyhow::Result<()> {
        registry.transition(id, RefactoringStatus::Skipped, Utc::now())?;
        debug!(id = %id, reason_token = token, "skipped");
        self.unapplied.insert(id.to_string());
        self.notes.insert(
            id.to_string(),
            Note {
                reason: Some(reason.to_string()),
                token: Some(token),
                ..Note::default()
            },
        );
        Ok(())
    }

    fn entry(&mut self, registry: &Registry, plan_entry: &PlanEntry) -> RunEntry {
        let id = plan_entry.id.as_str();
        let note = self.notes.remove(id).unwrap_or_default();
        RunEntry {
            refactoring_id: id.to_string(),
            final_status: registry
                .status(id)
                .unwrap_or(RefactoringStatus::Scheduled),
            stage: Some(plan_entry.stage),
            transitions: registry.history(id).to_vec(),
            failure_reason: note.reason,
            reason_token: note.token.map(str::to_string),
            failing_tests: note.failing_tests,
            files_changed: note.files_changed,
        }
    }
}
