//! Tree paths and directory entries.
//!
//! An entry under the source root and an entry under the target root are
//! the same object when their paths relative to their roots are equal.

use crate::error::{Result, SyncError};
use std::fmt;
use std::path::{Path, PathBuf};

/// A path relative to a tree root. The root itself is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePath(PathBuf);

impl TreePath {
    /// Relativizes `path` against `root`.
    pub fn relative_to(root: &Path, path: &Path) -> Result<Self> {
        path.strip_prefix(root)
            .map(|rel| Self(rel.to_path_buf()))
            .map_err(|_| SyncError::OutsideRoot {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            })
    }

    /// Resolves this path under another root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            root.to_path_buf()
        } else {
            root.join(&self.0)
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            write!(f, "{}", self.0.display())
        }
    }
}

/// What kind of filesystem object an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// A link the walk did not follow. Mirrored by content.
    Symlink,
}

impl EntryKind {
    pub fn from_file_type(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            Self::Directory
        } else if ft.is_symlink() {
            Self::Symlink
        } else {
            Self::File
        }
    }

    /// Looks at what is on disk at `path` without following links.
    ///
    /// Returns `None` when nothing is there.
    pub fn detect(path: &Path) -> Option<Self> {
        std::fs::symlink_metadata(path)
            .ok()
            .map(|meta| Self::from_file_type(meta.file_type()))
    }

    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }
}

/// One node visited during a tree walk.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub absolute: PathBuf,
    pub relative: TreePath,
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Builds an entry from a walkdir item rooted at `root`.
    pub fn from_walk(root: &Path, entry: &walkdir::DirEntry) -> Result<Self> {
        Ok(Self {
            absolute: entry.path().to_path_buf(),
            relative: TreePath::relative_to(root, entry.path())?,
            kind: EntryKind::from_file_type(entry.file_type()),
        })
    }

    /// Where this entry's counterpart lives under `other_root`.
    pub fn counterpart(&self, other_root: &Path) -> PathBuf {
        self.relative.resolve(other_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_relative_and_resolve() {
        let rel = TreePath::relative_to(Path::new("/src"), Path::new("/src/a/b.txt")).unwrap();
        assert_eq!(rel.as_path(), Path::new("a/b.txt"));
        assert_eq!(rel.resolve(Path::new("/dst")), PathBuf::from("/dst/a/b.txt"));
    }

    #[test]
    fn test_root_is_empty_path() {
        let rel = TreePath::relative_to(Path::new("/src"), Path::new("/src")).unwrap();
        assert!(rel.is_root());
        assert_eq!(rel.resolve(Path::new("/dst")), PathBuf::from("/dst"));
        assert_eq!(rel.to_string(), ".");
    }

    #[test]
    fn test_outside_root() {
        let err = TreePath::relative_to(Path::new("/src"), Path::new("/elsewhere/x")).unwrap_err();
        assert!(matches!(err, SyncError::OutsideRoot { .. }));
    }

    #[test]
    fn test_detect_kinds() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();

        assert_eq!(EntryKind::detect(dir.path()), Some(EntryKind::Directory));
        assert_eq!(EntryKind::detect(&file), Some(EntryKind::File));
        assert_eq!(EntryKind::detect(&dir.path().join("missing")), None);
    }
}
