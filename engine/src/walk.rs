//! Recursive tree walker over any `Filesystem`.
//!
//! `walk` is lazy: each call to `next` lists exactly one directory. Entries come
//! out in pre-order, root first, and subdirectories are queued so that siblings
//! are visited in name order. Names inside one entry are left in listing order.
//!
//! A listing failure ends the walk: the error is yielded once and the
//! iterator is exhausted afterwards.

use tracing::debug;

use crate::error::EngineError;
use crate::fs_ops::Filesystem;
use crate::model::TreeEntry;
use crate::paths;

/// Lazy pre-order walk of a directory tree.
pub struct Walk<'a> {
    fs: &'a dyn Filesystem,
    pending: Vec<String>,
}

/// Start walking `root` on `fs`.
pub fn walk<'a>(fs: &'a dyn Filesystem, root: &str) -> Walk<'a> {
    Walk {
        fs,
        pending: vec![paths::normalize(root)],
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<TreeEntry, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let directory = self.pending.pop()?;

        let listing = match self.fs.list(&directory) {
            Ok(listing) => listing,
            Err(e) => {
                self.pending.clear();
                return Some(Err(e));
            }
        };

        let mut subdirectories = Vec::new();
        let mut files = Vec::new();
        for entry in listing {
            if entry.stat.is_dir {
                subdirectories.push(entry.name);
            } else {
                files.push(entry.name);
            }
        }

        let mut queued: Vec<&String> = subdirectories.iter().collect();
        queued.sort_by(|a, b| b.cmp(a));
        self.pending
            .extend(queued.into_iter().map(|name| paths::join(&directory, name)));

        debug!(
            "{} walk: {} ({} dirs, {} files)",
            self.fs.kind(),
            directory,
            subdirectories.len(),
            files.len()
        );

        Some(Ok(TreeEntry {
            directory,
            subdirectories,
            files,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::LocalFilesystem;
    use std::fs;

    fn build_tree(root: &std::path::Path) {
        fs::create_dir_all(root.join("b").join("deep")).expect("Failed to create dirs");
        fs::create_dir_all(root.join("a")).expect("Failed to create dirs");
        fs::write(root.join("top.txt"), b"top").expect("Failed to write file");
        fs::write(root.join("a").join("one.txt"), b"1").expect("Failed to write file");
        fs::write(root.join("b").join("two.txt"), b"2").expect("Failed to write file");
        fs::write(root.join("b").join("deep").join("three.txt"), b"3")
            .expect("Failed to write file");
    }

    #[test]
    fn test_walk_is_preorder_and_sorted_between_siblings() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = paths::normalize(&temp_dir.path().to_string_lossy());
        build_tree(temp_dir.path());

        let local = LocalFilesystem::default();
        let entries: Vec<TreeEntry> = walk(&local, &root)
            .collect::<Result<_, _>>()
            .expect("walk should succeed");

        let dirs: Vec<String> = entries
            .iter()
            .map(|e| paths::relative_to(&root, &e.directory).expect("under root"))
            .collect();
        assert_eq!(dirs, vec!["", "a", "b", "b/deep"]);

        let top = entries[0].clone().sorted();
        assert_eq!(top.subdirectories, vec!["a", "b"]);
        assert_eq!(top.files, vec!["top.txt"]);
    }

    #[test]
    fn test_walk_counts_every_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = paths::normalize(&temp_dir.path().to_string_lossy());
        build_tree(temp_dir.path());

        let local = LocalFilesystem::default();
        let total: usize = walk(&local, &root)
            .map(|e| e.expect("walk should succeed").files.len())
            .sum();
        assert_eq!(total, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_ignores_link_to_ancestor() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = paths::normalize(&temp_dir.path().to_string_lossy());
        fs::create_dir(temp_dir.path().join("a")).expect("Failed to create dir");
        fs::write(temp_dir.path().join("a").join("f.txt"), b"f").expect("Failed to write file");
        std::os::unix::fs::symlink("..", temp_dir.path().join("a").join("up"))
            .expect("Failed to create symlink");
        std::os::unix::fs::symlink("missing", temp_dir.path().join("dangling"))
            .expect("Failed to create symlink");

        let local = LocalFilesystem::default();
        let entries: Vec<TreeEntry> = walk(&local, &root)
            .collect::<Result<_, _>>()
            .expect("walk should succeed");

        assert_eq!(entries.len(), 2);
        let files: Vec<&String> = entries.iter().flat_map(|e| e.files.iter()).collect();
        assert_eq!(files, vec!["f.txt"]);
    }

    #[test]
    fn test_walk_missing_root_yields_one_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let missing = paths::normalize(&temp_dir.path().join("gone").to_string_lossy());

        let local = LocalFilesystem::default();
        let mut iter = walk(&local, &missing);
        assert!(matches!(
            iter.next(),
            Some(Err(EngineError::EnumerationFailed { .. }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_walk_restarts_from_scratch() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = paths::normalize(&temp_dir.path().to_string_lossy());
        fs::write(temp_dir.path().join("first.txt"), b"1").expect("Failed to write file");

        let local = LocalFilesystem::default();
        let before: usize = walk(&local, &root).map(|e| e.unwrap().files.len()).sum();
        fs::write(temp_dir.path().join("second.txt"), b"2").expect("Failed to write file");
        let after: usize = walk(&local, &root).map(|e| e.unwrap().files.len()).sum();

        assert_eq!(before, 1);
        assert_eq!(after, 2);
    }
}
