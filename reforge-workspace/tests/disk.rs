use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use reforge_workspace::{
    LoadOptions, Snapshot, Workspace, WriteBackOptions, load_dir, materialize, write_back,
};
use std::fs;
use tempfile::TempDir;

fn utf8_root(temp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

fn seed(root: &Utf8Path) {
    fs::create_dir_all(root.join("pkg")).unwrap();
    fs::create_dir_all(root.join(".git")).unwrap();
    fs::write(root.join("pkg/a.py"), "def a():\n    return 1\n").unwrap();
    fs::write(root.join("b.py"), "B = 2\n").unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
}

#[test]
fn load_dir_skips_excluded_components() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    seed(&root);

    let snap = load_dir(&root, &LoadOptions::default()).unwrap();
    let paths: Vec<String> = snap.paths().map(|p| p.to_string()).collect();
    assert_eq!(paths, vec!["b.py", "pkg/a.py"]);
}

#[test]
fn materialize_then_load_is_identity() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let snap = Snapshot::from_files([("x/y.py", "y = 1\n"), ("z.py", "")]);

    materialize(&snap, &root).unwrap();
    let back = load_dir(&root, &LoadOptions::default()).unwrap();
    assert_eq!(back.digest(), snap.digest());
}

#[test]
fn rollback_leaves_byte_identical_tree() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    seed(&root);

    let initial = load_dir(&root, &LoadOptions::default()).unwrap();
    let digest_before = initial.digest();
    let mut ws = Workspace::new(initial);
    let pre = ws.head();

    let mut attempted = (*ws.head_snapshot()).clone();
    attempted.write("pkg/a.py", "def a(:\n");
    attempted.write("pkg/new.py", "oops\n");
    let candidate = ws.insert(attempted);
    ws.set_head(candidate).unwrap();
    ws.set_head(pre).unwrap();

    let out = tempfile::tempdir().unwrap();
    let out_root = utf8_root(&out);
    materialize(&ws.head_snapshot(), &out_root).unwrap();
    let reloaded = load_dir(&out_root, &LoadOptions::default()).unwrap();
    assert_eq!(reloaded.digest(), digest_before);
}

#[test]
fn write_back_updates_files_and_keeps_backups() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    seed(&root);
    let base = load_dir(&root, &LoadOptions::default()).unwrap();

    let mut target = base.clone();
    target.write("b.py", "B = 3\n");
    target.remove(Utf8Path::new("pkg/a.py"));

    let backups = root.join("artifacts/reforge/backups");
    let written = write_back(
        &root,
        &base,
        &target,
        &WriteBackOptions {
            backup_dir: Some(backups.clone()),
            backup_suffix: ".reforge.bak".to_string(),
        },
    )
    .unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(fs::read_to_string(root.join("b.py")).unwrap(), "B = 3\n");
    assert!(!root.join("pkg/a.py").exists());
    assert_eq!(
        fs::read_to_string(backups.join("b.py.reforge.bak")).unwrap(),
        "B = 2\n"
    );
    let removed = written.iter().find(|w| w.path == "pkg/a.py").unwrap();
    assert!(removed.sha256_before.is_some());
    assert!(removed.sha256_after.is_none());
}
