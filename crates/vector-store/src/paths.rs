use std::path::{Path, PathBuf};

pub const INDEX_DIR_NAME: &str = ".trace-impact";

/// Default directory holding persisted snapshots, relative to `root`.
#[must_use]
pub fn index_dir_for_root(root: &Path) -> PathBuf {
    root.join(INDEX_DIR_NAME).join("indexes")
}

/// Snapshot file for one collection. The collection name is sanitised so it
/// is always a single path component.
#[must_use]
pub fn snapshot_path(index_dir: &Path, collection: &str) -> PathBuf {
    index_dir.join(format!("{}.json", safe_component(collection)))
}

fn safe_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.chars().all(|ch| ch == '.') {
        "_".to_string()
    } else {
        out
    }
}
