use crate::snapshot::Snapshot;
use diffy::PatchFormatter;

/// Unified diff of every text file that differs between `before` and `after`.
///
/// Binary (non UTF-8) files are listed without hunks.
pub fn render_patch(before: &Snapshot, after: &Snapshot) -> String {
    let mut out = String::new();
    let formatter = PatchFormatter::new();

    for path in after.changed_paths(before) {
        out.push_str(&format!("diff --git a/{0} b/{0}\n", path));

        let old = before.get(&path);
        let new = after.get(&path);
        let (Some(old_text), Some(new_text)) = (
            old.map_or(Some(""), |b| std::str::from_utf8(b).ok()),
            new.map_or(Some(""), |b| std::str::from_utf8(b).ok()),
        ) else {
            out.push_str("Binary files differ\n");
            continue;
        };

        let from = if old.is_some() {
            format!("a/{}", path)
        } else {
            "/dev/null".to_string()
        };
        let to = if new.is_some() {
            format!("b/{}", path)
        } else {
            "/dev/null".to_string()
        };
        out.push_str(&format!("--- {from}\n+++ {to}\n"));

        let patch = diffy::create_patch(old_text, new_text);
        let body = formatter.fmt_patch(&patch).to_string();
        // Skip diffy's own ---/+++ header lines.
        for line in body.lines().skip_while(|l| l.starts_with("---") || l.starts_with("+++")) {
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}
