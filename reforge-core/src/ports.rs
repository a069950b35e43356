//! Port traits abstracting all I/O away from the pipeline.

use async_trait::async_trait;
use camino::Utf8Path;
use reforge_candidates::LoadedCandidates;
use reforge_types::refactoring::Refactoring;
use reforge_types::verification::VerificationResult;
use reforge_workspace::Snapshot;
use thiserror::Error;

/// Source of detector candidate files.
pub trait CandidateSource {
    fn load_candidates(&self) -> anyhow::Result<Vec<LoadedCandidates>>;
}

/// File-system write operations.
pub trait WritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum TransformError {
    /// The executor understood the request and declined it.
    #[error("rejected: {message}")]
    Rejected { message: String },

    #[error("command failed ({status}): {stderr}")]
    Command { status: String, stderr: String },

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("command failed ({status}): {stderr}")]
    Command { status: String, stderr: String },

    #[error("unreadable runner output: {message}")]
    Output { message: String },

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Performs one structural edit.
///
/// Must not touch anything but the returned snapshot; the input is shared
/// with other workers.
#[async_trait]
pub trait TransformExecutor: Send + Sync {
    async fn apply(
        &self,
        refactoring: &Refactoring,
        snapshot: &Snapshot,
    ) -> Result<Snapshot, TransformError>;
}

/// Runs the test suite (and optionally generated tests) against a snapshot.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, snapshot: &Snapshot) -> Result<VerificationResult, RunnerError>;
}
