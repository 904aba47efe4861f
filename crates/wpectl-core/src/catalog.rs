use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task;
use tracing::trace;

use crate::error::{EngineError, Result};

/// Set of library root directories. Ordered so two sets compare by content
/// regardless of discovery order.
pub type DirectorySet = BTreeSet<PathBuf>;

/// Per-item manifest file consulted for title and preview.
pub const MANIFEST_FILE: &str = "project.json";

const DEFAULT_TITLE: &str = "Untitled";

/// One wallpaper item. Identity is `id` (the backing directory's basename);
/// entries are rebuilt wholesale on every scan, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub source_path: PathBuf,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub entries: Vec<CatalogEntry>,
    pub is_append: bool,
    pub roots: DirectorySet,
}

/// Walks the given roots and collects one entry per manifest-bearing
/// directory. A root that carries a manifest itself counts as an item; its
/// children are still visited. First occurrence of an id wins across all
/// roots. Unreadable directories and malformed manifests skip silently.
///
/// Entries come back sorted case-insensitively by title.
pub fn scan(roots: &DirectorySet, extra_root: Option<&Path>) -> ScanOutcome {
    let mut roots_used = roots.clone();
    let is_append = extra_root.is_some();
    if let Some(extra) = extra_root {
        roots_used.insert(extra.to_path_buf());
    }

    let mut entries = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for root in &roots_used {
        if let Some(entry) = read_entry(root) {
            if seen.insert(entry.id.clone()) {
                entries.push(entry);
            }
        }
        let Ok(children) = fs::read_dir(root) else {
            trace!(root = %root.display(), "unreadable library root");
            continue;
        };
        for child in children.flatten() {
            let path = child.path();
            let Some(entry) = read_entry(&path) else {
                continue;
            };
            if seen.insert(entry.id.clone()) {
                entries.push(entry);
            }
        }
    }

    entries.sort_by_key(|entry| entry.title.to_lowercase());
    ScanOutcome {
        entries,
        is_append,
        roots: roots_used,
    }
}

/// Blocking scan offloaded to the blocking pool.
pub async fn scan_task(roots: DirectorySet, extra_root: Option<PathBuf>) -> Result<ScanOutcome> {
    task::spawn_blocking(move || scan(&roots, extra_root.as_deref()))
        .await
        .map_err(|err| EngineError::Task(err.to_string()))
}

fn read_entry(dir: &Path) -> Option<CatalogEntry> {
    let manifest = dir.join(MANIFEST_FILE);
    if !manifest.is_file() {
        return None;
    }
    let raw = fs::read_to_string(&manifest).ok()?;
    let data: Value = match serde_json::from_str(&raw) {
        Ok(data) => data,
        Err(err) => {
            trace!(manifest = %manifest.display(), %err, "skipping malformed manifest");
            return None;
        }
    };
    let id = dir.file_name()?.to_string_lossy().into_owned();
    let title = data
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TITLE)
        .to_owned();
    let preview = data
        .get("preview")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Some(CatalogEntry {
        id,
        title,
        source_path: dir.to_path_buf(),
        preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_item(root: &Path, id: &str, manifest: &str) -> PathBuf {
        let dir = root.join(id);
        fs::create_dir_all(&dir).expect("create item dir");
        fs::write(dir.join(MANIFEST_FILE), manifest).expect("write manifest");
        dir
    }

    fn roots_of(paths: &[&Path]) -> DirectorySet {
        paths.iter().map(|p| p.to_path_buf()).collect()
    }

    #[test]
    fn scans_single_item_with_title_and_preview() {
        let root = tempdir().expect("tempdir");
        let dir = write_item(root.path(), "123", r#"{"title":"Foo","preview":"p.png"}"#);

        let outcome = scan(&roots_of(&[root.path()]), None);
        assert!(!outcome.is_append);
        assert_eq!(outcome.entries.len(), 1);
        let entry = &outcome.entries[0];
        assert_eq!(entry.id, "123");
        assert_eq!(entry.title, "Foo");
        assert_eq!(entry.preview.as_deref(), Some("p.png"));
        assert_eq!(entry.source_path, dir);
    }

    #[test]
    fn root_bearing_manifest_is_its_own_entry() {
        let parent = tempdir().expect("tempdir");
        let root = write_item(parent.path(), "778899", r#"{"title":"Standalone"}"#);

        let outcome = scan(&roots_of(&[&root]), None);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].id, "778899");
    }

    #[test]
    fn first_occurrence_wins_across_roots() {
        let a = tempdir().expect("tempdir a");
        let b = tempdir().expect("tempdir b");
        write_item(a.path(), "42", r#"{"title":"From A"}"#);
        write_item(b.path(), "42", r#"{"title":"From B"}"#);

        let outcome = scan(&roots_of(&[a.path(), b.path()]), None);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].id, "42");
    }

    #[test]
    fn malformed_or_missing_manifests_skip_entries() {
        let root = tempdir().expect("tempdir");
        write_item(root.path(), "good", r#"{"title":"Good"}"#);
        write_item(root.path(), "bad", "{not json");
        fs::create_dir_all(root.path().join("bare")).expect("bare dir");

        let outcome = scan(&roots_of(&[root.path()]), None);
        let ids: Vec<&str> = outcome.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
    }

    #[test]
    fn missing_title_defaults_to_untitled() {
        let root = tempdir().expect("tempdir");
        write_item(root.path(), "1", r#"{"preview":"x.gif"}"#);

        let outcome = scan(&roots_of(&[root.path()]), None);
        assert_eq!(outcome.entries[0].title, "Untitled");
    }

    #[test]
    fn entries_sorted_case_insensitively_by_title() {
        let root = tempdir().expect("tempdir");
        write_item(root.path(), "1", r#"{"title":"beta"}"#);
        write_item(root.path(), "2", r#"{"title":"Alpha"}"#);
        write_item(root.path(), "3", r#"{"title":"GAMMA"}"#);

        let outcome = scan(&roots_of(&[root.path()]), None);
        let titles: Vec<&str> = outcome.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "beta", "GAMMA"]);
    }

    #[test]
    fn extra_root_marks_append_and_joins_roots() {
        let root = tempdir().expect("tempdir");
        let extra = tempdir().expect("extra tempdir");
        write_item(extra.path(), "55", r#"{"title":"Extra"}"#);

        let outcome = scan(&roots_of(&[root.path()]), Some(extra.path()));
        assert!(outcome.is_append);
        assert!(outcome.roots.contains(root.path()));
        assert!(outcome.roots.contains(extra.path()));
        assert_eq!(outcome.entries.len(), 1);
    }

    #[test]
    fn rescanning_unchanged_roots_is_idempotent() {
        let root = tempdir().expect("tempdir");
        write_item(root.path(), "a", r#"{"title":"One"}"#);
        write_item(root.path(), "b", r#"{"title":"Two"}"#);

        let roots = roots_of(&[root.path()]);
        let first = scan(&roots, None);
        let second = scan(&roots, None);
        assert_eq!(first.entries, second.entries);
    }

    #[tokio::test]
    async fn scan_task_offloads_to_blocking_pool() {
        let root = tempdir().expect("tempdir");
        write_item(root.path(), "9", r#"{"title":"Nine"}"#);

        let outcome = scan_task(roots_of(&[root.path()]), None)
            .await
            .expect("scan task");
        assert_eq!(outcome.entries.len(), 1);
    }
}
