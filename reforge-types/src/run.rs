use crate::ToolInfo;
use crate::refactoring::RefactoringStatus;
use crate::verification::FailingTest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit record of one execution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub schema: String,
    pub tool: ToolInfo,
    pub run_id: String,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub entries: Vec<RunEntry>,

    pub metrics: RunMetrics,
    pub verdict: RunVerdict,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_digest_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_digest_after: Option<String>,

    #[serde(default)]
    pub cancelled: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RunRecord {
    pub fn new(tool: ToolInfo, run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            schema: crate::schema::REFORGE_RUN_V1.to_string(),
            tool,
            run_id: run_id.into(),
            started_at,
            ended_at: None,
            entries: vec![],
            metrics: RunMetrics::default(),
            verdict: RunVerdict::Pass,
            head_digest_before: None,
            head_digest_after: None,
            cancelled: false,
            errors: vec![],
        }
    }

    pub fn entry(&self, id: &str) -> Option<&RunEntry> {
        self.entries.iter().find(|e| e.refactoring_id == id)
    }

    pub fn final_status(&self, id: &str) -> Option<RefactoringStatus> {
        self.entry(id).map(|e| e.final_status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub refactoring_id: String,
    pub final_status: RefactoringStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,

    #[serde(default)]
    pub transitions: Vec<StatusTransition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_token: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failing_tests: Vec<FailingTest>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub status: RefactoringStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub issues_detected: u64,
    pub refactorings_applied: u64,
    pub refactorings_failed: u64,
    pub refactorings_skipped: u64,
    pub quality_delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    /// Every admitted refactoring was applied.
    Pass,
    /// Nothing failed, but some admitted work was skipped.
    Warn,
    /// At least one refactoring failed or was rolled back.
    Fail,
}

impl RunVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            RunVerdict::Pass => "pass",
            RunVerdict::Warn => "warn",
            RunVerdict::Fail => "fail",
        }
    }
}
