use crate::snapshot::Snapshot;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use glob::{Pattern, glob};
use reforge_hash::sha256_hex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Path components that exclude a file wherever they appear.
    pub exclude: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            exclude: vec![".git".to_string(), "target".to_string()],
        }
    }
}

/// Reads every regular file under `root` into a snapshot.
pub fn load_dir(root: &Utf8Path, opts: &LoadOptions) -> anyhow::Result<Snapshot> {
    let pattern = format!("{}/**/*", Pattern::escape(root.as_str()));
    let mut snap = Snapshot::new();

    for entry in glob(&pattern).with_context(|| format!("glob {}", pattern))? {
        let path = entry.map_err(|e| anyhow::anyhow!("glob error: {e}"))?;
        let path = Utf8PathBuf::from_path_buf(path)
            .map_err(|p| anyhow::anyhow!("non-utf8 path: {}", p.display()))?;
        if !path.is_file() {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path, root))?;
        if rel
            .components()
            .any(|c| opts.exclude.iter().any(|x| x == c.as_str()))
        {
            continue;
        }
        let bytes = fs::read(&path)?;
        snap.write(rel.to_path_buf(), bytes);
    }

    debug!(root = %root, files = snap.len(), "loaded snapshot");
    Ok(snap)
}

/// Writes every file of `snapshot` below `dir`.
pub fn materialize(snapshot: &Snapshot, dir: &Utf8Path) -> anyhow::Result<()> {
    for (rel, bytes) in snapshot.iter() {
        let abs = dir.join(rel);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&abs, bytes)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct WriteBackOptions {
    /// Copies of overwritten files land here when set.
    pub backup_dir: Option<Utf8PathBuf>,
    pub backup_suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: Utf8PathBuf,
    pub sha256_before: Option<String>,
    pub sha256_after: Option<String>,
    pub backup_path: Option<Utf8PathBuf>,
}

/// Writes the difference between `base` and `target` into `repo_root`.
pub fn write_back(
    repo_root: &Utf8Path,
    base: &Snapshot,
    target: &Snapshot,
    opts: &WriteBackOptions,
) -> anyhow::Result<Vec<WrittenFile>> {
    let mut written = Vec::new();

    for rel in target.changed_paths(base) {
        let abs = repo_root.join(&rel);
        let before = base.get(&rel);

        let backup_path = match (&opts.backup_dir, before) {
            (Some(dir), Some(bytes)) => {
                let dest = dir.join(format!("{}{}", rel, opts.backup_suffix));
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&dest, bytes).with_context(|| format!("backup {}", rel))?;
                Some(dest)
            }
            _ => None,
        };

        let after = target.get(&rel);
        match after {
            Some(bytes) => {
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&abs, bytes).with_context(|| format!("write {}", rel))?;
            }
            None => {
                if abs.exists() {
                    fs::remove_file(&abs).with_context(|| format!("remove {}", rel))?;
                }
            }
        }

        debug!(path = %rel, "wrote back");
        written.push(WrittenFile {
            sha256_before: before.map(sha256_hex),
            sha256_after: after.map(sha256_hex),
            path: rel,
            backup_path,
        });
    }

    Ok(written)
}
