use chrono::{DateTime, Utc};
use reforge_types::RecordError;
use reforge_types::issue::Issue;
use reforge_types::refactoring::{Refactoring, RefactoringStatus};
use reforge_types::run::StatusTransition;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("issue `{id}` is already registered")]
    DuplicateIssue { id: String },

    #[error("refactoring `{id}` is already registered")]
    DuplicateRefactoring { id: String },

    #[error("refactoring `{id}` must be proposed as `proposed`, not `{status}`")]
    NotProposed {
        id: String,
        status: RefactoringStatus,
    },

    #[error("unknown refactoring `{id}`")]
    UnknownRefactoring { id: String },

    #[error("refactoring `{id}`: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: RefactoringStatus,
        to: RefactoringStatus,
    },

    #[error(transparent)]
    Invalid(#[from] RecordError),
}

/// Single owned store of issues and refactorings.
///
/// Issues are immutable once registered. Refactorings change only through
/// [`Registry::transition`], which enforces the lifecycle and timestamps
/// every step.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    issues: BTreeMap<String, Issue>,
    refactorings: BTreeMap<String, Refactoring>,
    /// old issue id -> id of the issue that supersedes it
    superseded: BTreeMap<String, String>,
    history: BTreeMap<String, Vec<StatusTransition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_issue(&mut self, issue: Issue) -> Result<(), RegistryError> {
        issue.validate()?;
        if self.issues.contains_key(&issue.id) {
            return Err(RegistryError::DuplicateIssue { id: issue.id });
        }
        if let Some(old) = &issue.supersedes {
            debug!(old = %old, new = %issue.id, "issue superseded");
            self.superseded.insert(old.clone(), issue.id.clone());
        }
        self.issues.insert(issue.id.clone(), issue);
        Ok(())
    }

    /// Registers a refactoring and returns its id, assigning a deterministic
    /// one when the proposal carries none.
    ///
    /// Only `proposed` records are accepted; every later status is reached
    /// through [`Registry::transition`].
    pub fn propose(&mut self, mut refactoring: Refactoring) -> Result<String, RegistryError> {
        if refactoring.id.trim().is_empty() {
            refactoring.id = deterministic_refactoring_id(&refactoring).to_string();
        }
        if refactoring.status != RefactoringStatus::Proposed {
            return Err(RegistryError::NotProposed {
                id: refactoring.id,
                status: refactoring.status,
            });
        }
        refactoring.validate()?;
        if self.refactorings.contains_key(&refactoring.id) {
            return Err(RegistryError::DuplicateRefactoring { id: refactoring.id });
        }
        let id = refactoring.id.clone();
        self.refactorings.insert(id.clone(), refactoring);
        Ok(id)
    }

    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.issues.get(id)
    }

    pub fn refactoring(&self, id: &str) -> Option<&Refactoring> {
        self.refactorings.get(id)
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    /// All refactorings, ordered by id.
    pub fn refactorings(&self) -> impl Iterator<Item = &Refactoring> {
        self.refactorings.values()
    }

    /// Refactorings still awaiting a scheduling decision.
    pub fn proposed(&self) -> impl Iterator<Item = &Refactoring> {
        self.refactorings
            .values()
            .filter(|r| r.status == RefactoringStatus::Proposed)
    }

    pub fn superseded_by(&self, issue_id: &str) -> Option<&str> {
        self.superseded.get(issue_id).map(String::as_str)
    }

    pub fn is_applied(&self, refactoring_id: &str) -> bool {
        self.refactorings
            .get(refactoring_id)
            .is_some_and(|r| r.status == RefactoringStatus::Applied)
    }

    pub fn status(&self, refactoring_id: &str) -> Option<RefactoringStatus> {
        self.refactorings.get(refactoring_id).map(|r| r.status)
    }

    pub fn history(&self, refactoring_id: &str) -> &[StatusTransition] {
        self.history
            .get(refactoring_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn transition(
        &mut self,
        id: &str,
        next: RefactoringStatus,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let r = self
            .refactorings
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownRefactoring { id: id.to_string() })?;
        if !r.status.can_transition_to(next) {
            return Err(RegistryError::IllegalTransition {
                id: id.to_string(),
                from: r.status,
                to: next,
            });
        }
        debug!(id = %id, from = %r.status, to = %next, "status transition");
        r.status = next;
        self.history
            .entry(id.to_string())
            .or_default()
            .push(StatusTransition { status: next, at });
        Ok(())
    }
}

/// Deterministic id: v5(namespace, issue_id|kind|location).
pub fn deterministic_refactoring_id(r: &Refactoring) -> Uuid {
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x7a, 0x1e, 0x52, 0x0c, 0x93, 0x4f, 0x4d, 0x2b, 0xa6, 0x11, 0x3e, 0xc8, 0x5b, 0x70, 0x04,
        0x9d,
    ]);

    let stable_key = format!("{}|{}|{}", r.issue_id, r.kind.as_str(), r.target_location);
    Uuid::new_v5(&NAMESPACE, stable_key.as_bytes())
}
