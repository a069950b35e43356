use crate::issue::Issue;
use crate::refactoring::Refactoring;
use serde::{Deserialize, Serialize};

/// Output of one detection collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEnvelope {
    pub schema: String,
    pub detector: DetectorInfo,

    #[serde(default)]
    pub issues: Vec<Issue>,

    #[serde(default)]
    pub refactorings: Vec<Refactoring>,
}

impl CandidateEnvelope {
    pub fn new(detector: DetectorInfo) -> Self {
        Self {
            schema: crate::schema::REFORGE_CANDIDATES_V1.to_string(),
            detector,
            issues: vec![],
            refactorings: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
