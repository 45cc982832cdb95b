//! The watch registry.
//!
//! One non-recursive notify subscription per directory under the source
//! root, each behind an opaque [`WatchHandle`]. The registry is built in
//! one go and thrown away after every sync; directories created in between
//! are only seen by the next build.

use crate::error::WatchError;
use crate::watcher::Signal;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Opaque token for one directory subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Live set of watched directories.
pub struct WatchRegistry {
    root: PathBuf,
    generation: u64,
    watcher: RecommendedWatcher,
    handles: BTreeMap<WatchHandle, PathBuf>,
    by_dir: HashMap<PathBuf, WatchHandle>,
    next_handle: u64,
}

impl WatchRegistry {
    /// Subscribes to every directory under `root`.
    ///
    /// Events are forwarded to `tx` tagged with `generation`. Directories
    /// that cannot be walked or watched are logged and left out.
    pub(crate) fn build(
        root: &Path,
        generation: u64,
        follow_symlinks: bool,
        tx: Sender<Signal>,
    ) -> Result<Self, WatchError> {
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            // The loop only goes away on shutdown, after which nobody cares.
            let _ = tx.send(Signal::Fs { generation, result });
        })?;

        let mut registry = Self {
            root: root.to_path_buf(),
            generation,
            watcher,
            handles: BTreeMap::new(),
            by_dir: HashMap::new(),
            next_handle: 0,
        };
        registry.register_all(follow_symlinks);

        info!(
            "Watching {} directories under {}",
            registry.len(),
            root.display()
        );
        Ok(registry)
    }

    fn register_all(&mut self, follow_symlinks: bool) {
        if !self.root.is_dir() {
            warn!("Cannot watch {}: not a directory", self.root.display());
            return;
        }

        let walker = WalkDir::new(&self.root).follow_links(follow_symlinks);
        for item in walker {
            match item {
                Ok(entry) if entry.file_type().is_dir() => {
                    self.register(entry.path());
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping directory while registering watches: {}", e),
            }
        }
    }

    fn register(&mut self, dir: &Path) -> Option<WatchHandle> {
        if let Err(e) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            let err = WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            };
            warn!("{}", err);
            return None;
        }

        let handle = WatchHandle(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(handle, dir.to_path_buf());
        self.by_dir.insert(dir.to_path_buf(), handle);
        debug!("Registered {} for {}", handle, dir.display());
        Some(handle)
    }

    /// Finds the watch an event path was reported through.
    ///
    /// That is normally the path's parent directory; events about a watched
    /// directory itself fall back to its own handle.
    pub fn handle_for(&self, path: &Path) -> Option<(WatchHandle, &Path)> {
        path.parent()
            .and_then(|parent| self.by_dir.get(parent))
            .or_else(|| self.by_dir.get(path))
            .and_then(|handle| {
                self.handles
                    .get(handle)
                    .map(|dir| (*handle, dir.as_path()))
            })
    }

    /// Drops every handle whose directory no longer exists.
    ///
    /// Returns the directories that were dropped.
    pub fn prune_invalid(&mut self) -> Vec<PathBuf> {
        let stale: Vec<WatchHandle> = self
            .handles
            .iter()
            .filter(|(_, dir)| !dir.is_dir())
            .map(|(handle, _)| *handle)
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for handle in stale {
            if let Some(dir) = self.handles.remove(&handle) {
                self.by_dir.remove(&dir);
                // The backend usually drops the watch on its own when the
                // directory goes away.
                if let Err(e) = self.watcher.unwatch(&dir) {
                    debug!("Unwatch {} failed: {}", dir.display(), e);
                }
                debug!("Watch invalidated: {} ({})", dir.display(), handle);
                removed.push(dir);
            }
        }
        removed
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains_dir(&self, dir: &Path) -> bool {
        self.by_dir.contains_key(dir)
    }

    /// Watched directories in handle order.
    #[cfg(test)]
    pub(crate) fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.handles.values().map(PathBuf::as_path)
    }
}

impl fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("root", &self.root)
            .field("generation", &self.generation)
            .field("handles", &self.handles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc::channel;
    use tempfile::tempdir;

    #[test]
    fn test_registers_every_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join("c")).unwrap();
        fs::write(dir.path().join("a/file.txt"), b"x").unwrap();

        let (tx, _rx) = channel();
        let registry = WatchRegistry::build(dir.path(), 0, false, tx).unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.dirs().next(), Some(dir.path()));
        assert!(registry.contains_dir(dir.path()));
        assert!(registry.contains_dir(&dir.path().join("a/b")));
        assert!(!registry.contains_dir(&dir.path().join("a/file.txt")));
    }

    #[test]
    fn test_handle_for_uses_parent() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();

        let (tx, _rx) = channel();
        let registry = WatchRegistry::build(dir.path(), 0, false, tx).unwrap();

        let (_, watched) = registry.handle_for(&dir.path().join("a/new.txt")).unwrap();
        assert_eq!(watched, dir.path().join("a"));

        let (_, watched) = registry.handle_for(&dir.path().join("a")).unwrap();
        assert_eq!(watched, dir.path());

        assert!(registry.handle_for(Path::new("/definitely/not/watched/x")).is_none());
    }

    #[test]
    fn test_prune_removes_deleted_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("gone/deeper")).unwrap();
        fs::create_dir_all(dir.path().join("kept")).unwrap();

        let (tx, _rx) = channel();
        let mut registry = WatchRegistry::build(dir.path(), 0, false, tx).unwrap();
        assert_eq!(registry.len(), 4);

        fs::remove_dir_all(dir.path().join("gone")).unwrap();
        let mut removed = registry.prune_invalid();
        removed.sort();

        assert_eq!(
            removed,
            vec![dir.path().join("gone"), dir.path().join("gone/deeper")]
        );
        assert_eq!(registry.len(), 2);
        assert!(registry.contains_dir(&dir.path().join("kept")));
    }

    #[test]
    fn test_new_directory_needs_rebuild() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = channel();
        let registry = WatchRegistry::build(dir.path(), 0, false, tx.clone()).unwrap();
        assert_eq!(registry.len(), 1);

        fs::create_dir(dir.path().join("later")).unwrap();
        assert!(!registry.contains_dir(&dir.path().join("later")));

        let rebuilt = WatchRegistry::build(dir.path(), 1, false, tx).unwrap();
        assert_eq!(rebuilt.generation(), 1);
        assert!(rebuilt.contains_dir(&dir.path().join("later")));
    }

    #[test]
    fn test_missing_root_gives_empty_registry() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = channel();
        let registry = WatchRegistry::build(&dir.path().join("missing"), 0, false, tx).unwrap();
        assert!(registry.is_empty());
    }
}
