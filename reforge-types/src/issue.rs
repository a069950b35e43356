use crate::location::Location;
use crate::{RecordError, check_unit_interval};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad category of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Architecture,
    Security,
    Performance,
    Maintainability,
}

/// Issue severity.
///
/// Variants are declared most severe first, so the derived `Ord` sorts
/// critical issues ahead of low ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

/// A detected code-quality concern.
///
/// Issues are immutable once registered. A re-detection after a code change
/// produces a new issue whose `supersedes` names the one it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub kind: IssueKind,
    pub severity: Severity,
    pub location: Location,
    pub confidence: f64,
    pub detected_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

impl Issue {
    pub fn new(
        id: impl Into<String>,
        kind: IssueKind,
        severity: Severity,
        location: Location,
        confidence: f64,
        detected_by: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            severity,
            location,
            confidence,
            detected_by: detected_by.into(),
            title: None,
            description: None,
            recommendation: None,
            tags: vec![],
            detected_at: None,
            supersedes: None,
        }
    }

    pub fn is_security_related(&self) -> bool {
        self.kind == IssueKind::Security
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.trim().is_empty() {
            return Err(RecordError::EmptyId { record: "issue" });
        }
        check_unit_interval(&self.id, "confidence", self.confidence)?;
        if let Some(message) = self.location.problem() {
            return Err(RecordError::InvalidLocation {
                id: self.id.clone(),
                location: self.location.to_string(),
                message,
            });
        }
        Ok(())
    }
}
