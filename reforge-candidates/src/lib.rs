//! Candidate ingestion.
//!
//! Each detection collaborator writes `<artifacts>/<detector>/candidates.json`.
//! Loading is tolerant: a file that fails to read or parse is returned as a
//! failed input instead of aborting the whole scan.

mod load;

pub use load::{CandidateLoadError, LoadedCandidates, load_candidates};

/// Directory name reforge writes its own artifacts to; never ingested.
pub const OUTPUT_DIR_NAME: &str = "reforge";
