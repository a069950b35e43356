//! Embeddable core library for reforge.
//!
//! Provides a clap-free, I/O-abstracted entry point suitable for linking
//! into other host processes.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`CandidateSource`](ports::CandidateSource): load detector outputs
//! - [`TransformExecutor`](ports::TransformExecutor): apply one refactoring to a snapshot
//! - [`TestRunner`](ports::TestRunner): verify a snapshot
//! - [`WritePort`](ports::WritePort): write artifacts
//!
//! The [`adapters`] module provides filesystem and subprocess implementations.
//!
//! # Entry points
//!
//! - [`run_plan`](pipeline::run_plan): ingest candidates and build a plan
//! - [`run_orchestration`](pipeline::run_orchestration): plan, execute and verify

pub mod adapters;
pub mod pipeline;
pub mod ports;
pub mod settings;
pub mod supervisor;
pub mod verify;

pub use reforge_candidates::{CandidateLoadError, LoadedCandidates};
pub use reforge_workspace::Snapshot;
pub use tokio_util::sync::CancellationToken;
