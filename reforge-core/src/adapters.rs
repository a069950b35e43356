//! Default filesystem and subprocess port implementations.

use crate::ports::{
    CandidateSource, RunnerError, TestRunner, TransformError, TransformExecutor, WritePort,
};
use anyhow::Context;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use reforge_candidates::{LoadedCandidates, OUTPUT_DIR_NAME};
use reforge_types::refactoring::Refactoring;
use reforge_types::verification::VerificationResult;
use reforge_workspace::{LoadOptions, Snapshot, load_dir, materialize};
use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Loads candidate files from the filesystem via `reforge_candidates::load_candidates`.
#[derive(Debug, Clone)]
pub struct FsCandidateSource {
    pub artifacts_dir: Utf8PathBuf,
}

impl FsCandidateSource {
    pub fn new(artifacts_dir: Utf8PathBuf) -> Self {
        Self { artifacts_dir }
    }
}

impl CandidateSource for FsCandidateSource {
    fn load_candidates(&self) -> anyhow::Result<Vec<LoadedCandidates>> {
        reforge_candidates::load_candidates(&self.artifacts_dir)
            .with_context(|| format!("load candidates from {}", self.artifacts_dir))
    }
}

/// In-memory candidate source for embedding and testing.
///
/// Drops anything reforge itself wrote and sorts by path, mirroring the fs
/// loader.
#[derive(Debug, Clone)]
pub struct InMemoryCandidateSource {
    loaded: Vec<LoadedCandidates>,
}

impl InMemoryCandidateSource {
    pub fn new(mut loaded: Vec<LoadedCandidates>) -> Self {
        loaded.retain(|c| {
            if c.detector_id == OUTPUT_DIR_NAME {
                debug!(path = %c.path, "skipping reforge output");
                return false;
            }
            true
        });
        loaded.sort_by(|a, b| a.path.cmp(&b.path));
        Self { loaded }
    }
}

impl CandidateSource for InMemoryCandidateSource {
    fn load_candidates(&self) -> anyhow::Result<Vec<LoadedCandidates>> {
        Ok(self.loaded.clone())
    }
}

/// Filesystem write operations.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
        fs::write(path, contents).with_context(|| format!("write {}", path))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path).with_context(|| format!("create_dir_all {}", path))
    }
}

/// An external command: `argv[0]` is looked up on `PATH` unless absolute.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Runs a command per refactoring inside a scratch copy of the snapshot.
///
/// The command receives the refactoring as JSON on stdin and
/// `REFORGE_REFACTORING_ID`, `REFORGE_KIND`, `REFORGE_TARGET_PATH` and
/// `REFORGE_WORKDIR` in its environment. Whatever tree it leaves behind
/// becomes the result snapshot.
#[derive(Debug, Clone)]
pub struct CommandTransformExecutor {
    pub command: CommandSpec,
    pub load_options: LoadOptions,
}

impl CommandTransformExecutor {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            load_options: LoadOptions::default(),
        }
    }
}

#[async_trait]
impl TransformExecutor for CommandTransformExecutor {
    async fn apply(
        &self,
        refactoring: &Refactoring,
        snapshot: &Snapshot,
    ) -> Result<Snapshot, TransformError> {
        let (_guard, dir) = scratch_dir("reforge-transform-")?;
        materialize_blocking(snapshot, &dir).await?;

        let stdin = serde_json::to_vec(refactoring).context("serialize refactoring")?;
        let env = [
            ("REFORGE_REFACTORING_ID", refactoring.id.clone()),
            ("REFORGE_KIND", refactoring.kind.as_str().to_string()),
            (
                "REFORGE_TARGET_PATH",
                refactoring.target_location.path.to_string(),
            ),
            ("REFORGE_WORKDIR", dir.to_string()),
        ];
        let output = run_command(&self.command, &dir, &stdin, &env).await?;
        if !output.status.success() {
            return Err(TransformError::Command {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let result = load_dir_blocking(&dir, &self.load_options).await?;
        debug!(
            id = %refactoring.id,
            changed = result.changed_paths(snapshot).len(),
            "transform command finished"
        );
        Ok(result)
    }
}

/// Runs a test command inside a scratch copy of the snapshot and parses a
/// `VerificationResult` from its stdout.
///
/// A non-zero exit with valid JSON is still a result; the JSON decides.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    pub command: CommandSpec,
}

impl CommandTestRunner {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(&self, snapshot: &Snapshot) -> Result<VerificationResult, RunnerError> {
        let (_guard, dir) = scratch_dir("reforge-verify-")?;
        materialize_blocking(snapshot, &dir).await?;

        let env = [("REFORGE_WORKDIR", dir.to_string())];
        let output = run_command(&self.command, &dir, &[], &env).await?;

        match serde_json::from_slice::<VerificationResult>(&output.stdout) {
            Ok(result) => Ok(result),
            Err(_) if !output.status.success() => Err(RunnerError::Command {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            }),
            Err(e) => Err(RunnerError::Output {
                message: e.to_string(),
            }),
        }
    }
}

// Scratch trees are written and read on the blocking pool so parallel
// workers do not stall the runtime.
async fn materialize_blocking(snapshot: &Snapshot, dir: &Utf8Path) -> anyhow::Result<()> {
    let snapshot = snapshot.clone();
    let dir = dir.to_owned();
    tokio::task::spawn_blocking(move || materialize(&snapshot, &dir))
        .await
        .context("materialize task failed")?
}

async fn load_dir_blocking(dir: &Utf8Path, opts: &LoadOptions) -> anyhow::Result<Snapshot> {
    let dir = dir.to_owned();
    let opts = opts.clone();
    tokio::task::spawn_blocking(move || load_dir(&dir, &opts))
        .await
        .context("load task failed")?
}

fn scratch_dir(prefix: &str) -> anyhow::Result<(TempDir, Utf8PathBuf)> {
    let guard = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .context("create scratch dir")?;
    let dir = Utf8PathBuf::from_path_buf(guard.path().to_path_buf())
        .map_err(|p| anyhow::anyhow!("non-utf8 scratch dir: {}", p.display()))?;
    Ok((guard, dir))
}

/// Spawns `spec` in `dir`, feeds `stdin` and collects the output. The child
/// is killed if the returned future is dropped (timeouts, cancellation).
async fn run_command(
    spec: &CommandSpec,
    dir: &Utf8Path,
    stdin: &[u8],
    env: &[(&str, String)],
) -> anyhow::Result<Output> {
    let (program, args) = spec
        .argv
        .split_first()
        .context("command argv is empty")?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .envs(&spec.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn `{}`", program))?;

    if let Some(mut input) = child.stdin.take() {
        // A child that never reads stdin is not an error.
        let _ = input.write_all(stdin).await;
        let _ = input.shutdown().await;
    }

    child
        .wait_with_output()
        .await
        .with_context(|| format!("wait for `{}`", program))
}

fn stderr_tail(stderr: &[u8]) -> String {
    const MAX: usize = 2000;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut start = text.len() - MAX;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_candidates::CandidateLoadError;
    use reforge_types::location::Location;
    use reforge_types::refactoring::RefactoringKind;

    fn loaded(path: &str, detector: &str) -> LoadedCandidates {
        LoadedCandidates {
            path: Utf8PathBuf::from(path),
            detector_id: detector.to_string(),
            envelope: Err(CandidateLoadError::Io {
                message: "stub".to_string(),
            }),
            rejected: vec![],
        }
    }

    #[test]
    fn in_memory_sorts_and_drops_own_output() {
        let source = InMemoryCandidateSource::new(vec![
            loaded("artifacts/smells/candidates.json", "smells"),
            loaded("artifacts/reforge/candidates.json", "reforge"),
            loaded("artifacts/audit/candidates.json", "audit"),
        ]);
        let got = source.load_candidates().unwrap();
        let paths: Vec<&str> = got.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "artifacts/audit/candidates.json",
                "artifacts/smells/candidates.json"
            ]
        );
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let long = "x".repeat(3000) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert!(tail.ends_with("END"));
        assert_eq!(stderr_tail(b"  short \n"), "short");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn scratch_tree_round_trips_through_the_blocking_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let tree = Snapshot::from_files([("src/a.py", "a\n"), ("b.py", "b\n")]);

        materialize_blocking(&tree, &dir).await.unwrap();
        let loaded = load_dir_blocking(&dir, &LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn fs_write_port_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let path = root.join("a/b/c.txt");
        FsWritePort.write_file(&path, b"hi").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn empty_argv_is_an_error() {
        let exec = CommandTransformExecutor::new(CommandSpec::default());
        let r = Refactoring::new(
            "r1",
            RefactoringKind::Rename,
            "i1",
            Location::lines("a.txt", 1, 1),
        );
        let err = exec.apply(&r, &Snapshot::new()).await.unwrap_err();
        assert!(err.to_string().contains("argv is empty"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_executor_returns_edited_tree() {
        let exec = CommandTransformExecutor::new(CommandSpec::new([
            "sh",
            "-c",
            "printf '%s' \"$REFORGE_KIND\" > \"$REFORGE_TARGET_PATH\"",
        ]));
        let r = Refactoring::new(
            "r1",
            RefactoringKind::ExtractMethod,
            "i1",
            Location::lines("src/a.txt", 1, 1),
        );
        let before = Snapshot::from_files([("src/a.txt", "old"), ("b.txt", "keep")]);
        let after = exec.apply(&r, &before).await.unwrap();
        assert_eq!(
            after.get_str(Utf8Path::new("src/a.txt")),
            Some("extract_method")
        );
        assert_eq!(after.get_str(Utf8Path::new("b.txt")), Some("keep"));
        assert_eq!(before.get_str(Utf8Path::new("src/a.txt")), Some("old"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_executor_reports_non_zero_exit() {
        let exec =
            CommandTransformExecutor::new(CommandSpec::new(["sh", "-c", "echo nope >&2; exit 3"]));
        let r = Refactoring::new(
            "r1",
            RefactoringKind::Rename,
            "i1",
            Location::lines("a.txt", 1, 1),
        );
        let err = exec.apply(&r, &Snapshot::new()).await.unwrap_err();
        match err {
            TransformError::Command { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runner_parses_stdout_even_on_failure_exit() {
        let runner = CommandTestRunner::new(CommandSpec::new([
            "sh",
            "-c",
            r#"echo '{"passed": false, "failing_tests": [{"name": "t1", "origin": "pre_existing"}]}'; exit 1"#,
        ]));
        let result = runner.run(&Snapshot::new()).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.failing_tests[0].name, "t1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runner_rejects_garbage_output() {
        let runner = CommandTestRunner::new(CommandSpec::new(["sh", "-c", "echo hello"]));
        let err = runner.run(&Snapshot::new()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Output { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_env_reaches_the_child() {
        let runner = CommandTestRunner::new(
            CommandSpec::new(["sh", "-c", r#"echo "{\"passed\": $PASSED}""#])
                .with_env("PASSED", "true"),
        );
        let result = runner.run(&Snapshot::new()).await.unwrap();
        assert!(result.passed);
    }
}
