//! Cache marker scan.
//!
//! A `.tsc` directory (any casing) anywhere under the configured save path
//! is used as the cache directory instead of the save path itself.

use std::path::{Path, PathBuf};

use log::debug;
use walkdir::{DirEntry, WalkDir};

pub const MARKER_DIR: &str = ".tsc";

fn is_marker(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.eq_ignore_ascii_case(MARKER_DIR))
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.starts_with('.'))
}

/// Walk `root` and return the first marker directory found.
///
/// Hidden directories other than the marker are not descended into, the
/// root included. A root that is itself a marker is returned as is.
/// Unreadable entries are skipped.
pub fn find_marker_dir(root: &Path) -> Option<PathBuf> {
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| is_marker(e) || !is_hidden_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skipping path during marker scan: {}", err);
                continue;
            }
        };

        if is_marker(&entry) {
            return Some(entry.into_path());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn finds_nested_marker() {
        let dir = tempdir::TempDir::new("scan-test").unwrap();
        let marker = dir.path().join("media").join("cache").join(".TSC");
        fs::create_dir_all(&marker).unwrap();

        assert_eq!(find_marker_dir(dir.path()), Some(marker));
    }

    #[test]
    fn skips_hidden_dirs_and_marker_files() {
        let dir = tempdir::TempDir::new("scan-test").unwrap();
        fs::create_dir_all(dir.path().join(".hidden").join(".tsc")).unwrap();
        fs::create_dir_all(dir.path().join("plain")).unwrap();
        fs::write(dir.path().join("plain").join(".tsc"), b"not a dir").unwrap();

        assert_eq!(find_marker_dir(dir.path()), None);
    }

    #[test]
    fn hidden_root_finds_nothing() {
        let dir = tempdir::TempDir::new("scan-test").unwrap();
        let root = dir.path().join(".cache");
        fs::create_dir_all(root.join(".tsc")).unwrap();

        assert_eq!(find_marker_dir(&root), None);
    }

    #[test]
    fn marker_root_is_returned() {
        let dir = tempdir::TempDir::new("scan-test").unwrap();
        let root = dir.path().join(".Tsc");
        fs::create_dir_all(root.join("nested")).unwrap();

        assert_eq!(find_marker_dir(&root), Some(root));
    }

    #[test]
    fn missing_root_finds_nothing() {
        let dir = tempdir::TempDir::new("scan-test").unwrap();
        assert_eq!(find_marker_dir(&dir.path().join("absent")), None);
    }
}
