//! Workspace snapshots.
//!
//! A [`Snapshot`] is an immutable-by-convention file tree whose contents are
//! shared (`Arc<[u8]>`) between copies, so cloning one is cheap and editing a
//! clone never disturbs the original. A [`Workspace`] is an arena of
//! snapshots addressed by [`SnapshotId`] with a movable head.

mod disk;
mod patch;
mod snapshot;

pub use disk::{LoadOptions, WriteBackOptions, WrittenFile, load_dir, materialize, write_back};
pub use patch::render_patch;
pub use snapshot::{Snapshot, SnapshotId, Workspace, WorkspaceError};
