use camino::{Utf8Path, Utf8PathBuf};
use reforge_hash::TreeHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Copy-on-write file tree keyed by repo-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<Utf8PathBuf, Arc<[u8]>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files<P, B>(files: impl IntoIterator<Item = (P, B)>) -> Self
    where
        P: Into<Utf8PathBuf>,
        B: Into<Vec<u8>>,
    {
        let mut snap = Self::new();
        for (p, b) in files {
            snap.write(p, b);
        }
        snap
    }

    pub fn write(&mut self, path: impl Into<Utf8PathBuf>, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.files.insert(path.into(), Arc::from(bytes));
    }

    pub fn remove(&mut self, path: &Utf8Path) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn get(&self, path: &Utf8Path) -> Option<&[u8]> {
        self.files.get(path).map(|b| b.as_ref())
    }

    pub fn get_str(&self, path: &Utf8Path) -> Option<&str> {
        self.get(path).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Utf8Path> {
        self.files.keys().map(|p| p.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Utf8Path, &[u8])> {
        self.files.iter().map(|(p, b)| (p.as_path(), b.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// SHA-256 over every `(path, bytes)` pair in path order.
    pub fn digest(&self) -> String {
        let mut hasher = TreeHasher::new();
        for (path, bytes) in &self.files {
            hasher.update(path.as_str(), bytes);
        }
        hasher.finish()
    }

    /// Paths added, removed or modified relative to `base`.
    pub fn changed_paths(&self, base: &Snapshot) -> BTreeSet<Utf8PathBuf> {
        let mut out = BTreeSet::new();
        for (path, bytes) in &self.files {
            match base.files.get(path) {
                Some(old) if Arc::ptr_eq(old, bytes) || old == bytes => {}
                _ => {
                    out.insert(path.clone());
                }
            }
        }
        for path in base.files.keys() {
            if !self.files.contains_key(path) {
                out.insert(path.clone());
            }
        }
        out
    }

    /// Replays `other`'s changes relative to `base` onto `self`.
    pub fn overlay(&mut self, base: &Snapshot, other: &Snapshot) {
        for path in other.changed_paths(base) {
            match other.files.get(&path) {
                Some(bytes) => {
                    self.files.insert(path, Arc::clone(bytes));
                }
                None => {
                    self.files.remove(&path);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(usize);

impl SnapshotId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("unknown snapshot {0}")]
    UnknownSnapshot(SnapshotId),
}

/// Arena of snapshots with a head pointer.
///
/// Snapshots are never mutated once stored; moving the head is the only way
/// the visible workspace changes.
#[derive(Debug, Clone)]
pub struct Workspace {
    snapshots: Vec<Arc<Snapshot>>,
    head: SnapshotId,
}

impl Workspace {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            snapshots: vec![Arc::new(initial)],
            head: SnapshotId(0),
        }
    }

    pub fn head(&self) -> SnapshotId {
        self.head
    }

    pub fn head_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshots[self.head.0])
    }

    pub fn get(&self, id: SnapshotId) -> Result<Arc<Snapshot>, WorkspaceError> {
        self.snapshots
            .get(id.0)
            .cloned()
            .ok_or(WorkspaceError::UnknownSnapshot(id))
    }

    /// Stores a snapshot without moving the head.
    pub fn insert(&mut self, snapshot: Snapshot) -> SnapshotId {
        self.snapshots.push(Arc::new(snapshot));
        SnapshotId(self.snapshots.len() - 1)
    }

    pub fn set_head(&mut self, id: SnapshotId) -> Result<(), WorkspaceError> {
        if id.0 >= self.snapshots.len() {
            return Err(WorkspaceError::UnknownSnapshot(id));
        }
        debug!(from = %self.head, to = %id, "workspace head moved");
        self.head = id;
        Ok(())
    }

    /// Stores `snapshot` and makes it the head.
    pub fn commit(&mut self, snapshot: Snapshot) -> SnapshotId {
        let id = self.insert(snapshot);
        self.head = id;
        id
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
