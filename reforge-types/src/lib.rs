//! Shared records (schemas-as-code) for the reforge workspace.
//!
//! # Design constraints
//! - These types are serialized to disk as plan and run artifacts.
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod candidates;
pub mod conflict;
pub mod issue;
pub mod location;
pub mod plan;
pub mod policy;
pub mod refactoring;
pub mod run;
pub mod verification;

use serde::{Deserialize, Serialize};

/// Schema identifiers.
pub mod schema {
    pub const REFORGE_CANDIDATES_V1: &str = "reforge.candidates.v1";
    pub const REFORGE_PLAN_V1: &str = "reforge.plan.v1";
    pub const REFORGE_RUN_V1: &str = "reforge.run.v1";
}

/// Identifies the tool that produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// A record failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("{record}: id must not be empty")]
    EmptyId { record: &'static str },

    #[error("{id}: {field} = {value} is outside [0, 1]")]
    OutOfRange {
        id: String,
        field: &'static str,
        value: f64,
    },

    #[error("{id}: invalid location {location}: {message}")]
    InvalidLocation {
        id: String,
        location: String,
        message: String,
    },

    #[error("{id}: depends on itself")]
    SelfDependency { id: String },
}

pub(crate) fn check_unit_interval(
    id: &str,
    field: &'static str,
    value: f64,
) -> Result<(), RecordError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RecordError::OutOfRange {
            id: id.to_string(),
            field,
            value,
        })
    }
}
