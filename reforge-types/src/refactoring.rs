use crate::location::Location;
use crate::{RecordError, check_unit_interval};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Structural transformation a refactoring performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefactoringKind {
    ExtractMethod,
    InlineMethod,
    RenameMethod,
    MoveMethod,
    ChangeSignature,
    ExtractClass,
    ExtractInterface,
    MoveClass,
    RenameClass,
    PullUpMethod,
    PushDownMethod,
    RenameVariable,
    ExtractVariable,
    InlineVariable,
    RemoveDeadCode,
    SimplifyConditional,
    ReplaceMagicNumber,
    Rename,
}

impl RefactoringKind {
    pub const ALL: [RefactoringKind; 18] = [
        RefactoringKind::ExtractMethod,
        RefactoringKind::InlineMethod,
        RefactoringKind::RenameMethod,
        RefactoringKind::MoveMethod,
        RefactoringKind::ChangeSignature,
        RefactoringKind::ExtractClass,
        RefactoringKind::ExtractInterface,
        RefactoringKind::MoveClass,
        RefactoringKind::RenameClass,
        RefactoringKind::PullUpMethod,
        RefactoringKind::PushDownMethod,
        RefactoringKind::RenameVariable,
        RefactoringKind::ExtractVariable,
        RefactoringKind::InlineVariable,
        RefactoringKind::RemoveDeadCode,
        RefactoringKind::SimplifyConditional,
        RefactoringKind::ReplaceMagicNumber,
        RefactoringKind::Rename,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RefactoringKind::ExtractMethod => "extract_method",
            RefactoringKind::InlineMethod => "inline_method",
            RefactoringKind::RenameMethod => "rename_method",
            RefactoringKind::MoveMethod => "move_method",
            RefactoringKind::ChangeSignature => "change_signature",
            RefactoringKind::ExtractClass => "extract_class",
            RefactoringKind::ExtractInterface => "extract_interface",
            RefactoringKind::MoveClass => "move_class",
            RefactoringKind::RenameClass => "rename_class",
            RefactoringKind::PullUpMethod => "pull_up_method",
            RefactoringKind::PushDownMethod => "push_down_method",
            RefactoringKind::RenameVariable => "rename_variable",
            RefactoringKind::ExtractVariable => "extract_variable",
            RefactoringKind::InlineVariable => "inline_variable",
            RefactoringKind::RemoveDeadCode => "remove_dead_code",
            RefactoringKind::SimplifyConditional => "simplify_conditional",
            RefactoringKind::ReplaceMagicNumber => "replace_magic_number",
            RefactoringKind::Rename => "rename",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for RefactoringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a refactoring.
///
/// ```text
/// proposed -> scheduled -> applying -> verifying -> applied
///    |            |            |            |
///    v            v            v            v
/// skipped      skipped       failed  ->  failed -> rolled_back
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefactoringStatus {
    #[default]
    Proposed,
    Scheduled,
    Applying,
    Verifying,
    Applied,
    Failed,
    RolledBack,
    Skipped,
}

impl RefactoringStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RefactoringStatus::Proposed => "proposed",
            RefactoringStatus::Scheduled => "scheduled",
            RefactoringStatus::Applying => "applying",
            RefactoringStatus::Verifying => "verifying",
            RefactoringStatus::Applied => "applied",
            RefactoringStatus::Failed => "failed",
            RefactoringStatus::RolledBack => "rolled_back",
            RefactoringStatus::Skipped => "skipped",
        }
    }

    pub fn can_transition_to(self, next: RefactoringStatus) -> bool {
        use RefactoringStatus::*;
        matches!(
            (self, next),
            (Proposed, Scheduled)
                | (Proposed, Skipped)
                | (Scheduled, Applying)
                | (Scheduled, Skipped)
                | (Applying, Verifying)
                | (Applying, Failed)
                | (Verifying, Applied)
                | (Verifying, Failed)
                | (Failed, RolledBack)
        )
    }

    /// `failed` is not listed: it is final only when nothing was committed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RefactoringStatus::Applied | RefactoringStatus::RolledBack | RefactoringStatus::Skipped
        )
    }
}

impl fmt::Display for RefactoringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed code transformation addressing one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refactoring {
    /// May be empty on ingestion; the registry assigns a deterministic id.
    #[serde(default)]
    pub id: String,

    pub kind: RefactoringKind,
    pub issue_id: String,
    pub target_location: Location,
    pub impact_score: f64,

    /// Whole minutes.
    pub effort_estimate: u64,

    pub risk_score: f64,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<String>,

    #[serde(default)]
    pub status: RefactoringStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_by: Option<String>,

    /// Opaque parameters for the transform executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Refactoring {
    pub fn new(
        id: impl Into<String>,
        kind: RefactoringKind,
        issue_id: impl Into<String>,
        target_location: Location,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            issue_id: issue_id.into(),
            target_location,
            impact_score: 0.0,
            effort_estimate: 0,
            risk_score: 0.0,
            dependencies: BTreeSet::new(),
            status: RefactoringStatus::Proposed,
            title: None,
            description: None,
            proposed_by: None,
            params: None,
        }
    }

    pub fn with_scores(mut self, impact_score: f64, effort_estimate: u64, risk_score: f64) -> Self {
        self.impact_score = impact_score;
        self.effort_estimate = effort_estimate;
        self.risk_score = risk_score;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.trim().is_empty() {
            return Err(RecordError::EmptyId {
                record: "refactoring",
            });
        }
        check_unit_interval(&self.id, "impact_score", self.impact_score)?;
        check_unit_interval(&self.id, "risk_score", self.risk_score)?;
        if let Some(message) = self.target_location.problem() {
            return Err(RecordError::InvalidLocation {
                id: self.id.clone(),
                location: self.target_location.to_string(),
                message,
            });
        }
        if self.dependencies.contains(&self.id) {
            return Err(RecordError::SelfDependency {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}
