//! The reconciliation engine.
//!
//! A pass runs in two phases. Phase 1 walks the source tree and creates or
//! updates whatever the target is missing or has wrong. Phase 2 walks the
//! target tree and deletes whatever the source no longer has. Phase 2 only
//! starts once phase 1 has finished.

use crate::busy::BusyFlag;
use crate::config::MirrorConfig;
use crate::error::{Result, SyncError};
use crate::fsops::{
    copy_dir_recursive, copy_file_preserving, files_identical, overwrite_file, remove_entry,
};
use crate::tree::{EntryKind, TreeEntry};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Something that can converge a target tree and report whether it is busy.
///
/// The watch loop talks to the reconciler only through this trait.
pub trait Reconcile: Send + Sync {
    /// Runs one full pass.
    fn synchronize(&self) -> SyncReport;

    /// True while a pass is running.
    fn is_busy(&self) -> bool;
}

/// What a single pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Directories created in the target, including nested ones.
    pub dirs_copied: usize,

    /// Files created in the target.
    pub files_copied: usize,

    /// Target files rewritten because their bytes differed.
    pub files_updated: usize,

    /// Target files removed.
    pub files_deleted: usize,

    /// Target directories removed (each counts once, whatever it held).
    pub dirs_deleted: usize,

    /// Entries that failed and were skipped.
    pub errors: usize,

    /// The pass did not run because another one held the busy flag.
    pub skipped: bool,

    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Total number of changes made to the target.
    pub fn mutations(&self) -> usize {
        self.dirs_copied
            + self.files_copied
            + self.files_updated
            + self.files_deleted
            + self.dirs_deleted
    }
}

/// Mirrors a source directory onto a target directory.
#[derive(Debug)]
pub struct Reconciler {
    source: PathBuf,
    target: PathBuf,
    follow_symlinks: bool,
    busy: BusyFlag,
}

impl Reconciler {
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        config: &MirrorConfig,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            follow_symlinks: config.follow_symlinks,
            busy: BusyFlag::new(),
        }
    }

    /// A handle on the busy flag that can be observed from other threads.
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Makes the target tree identical to the source tree.
    ///
    /// Never fails: per-entry errors are logged and counted, and an error
    /// that stops the pass is logged and ends it early. The busy flag is set
    /// for exactly the duration of the call. If a pass is already running
    /// this returns a report with `skipped` set and touches nothing.
    pub fn synchronize(&self) -> SyncReport {
        let Some(_guard) = self.busy.acquire() else {
            warn!("Synchronization already in progress, skipping");
            return SyncReport::skipped();
        };

        info!(
            "Synchronizing {} -> {}",
            self.source.display(),
            self.target.display()
        );
        let start = Instant::now();
        let mut report = SyncReport::default();

        if let Err(e) = self.run_pass(&mut report) {
            error!("Synchronization pass abandoned: {}", e);
            report.errors += 1;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Synchronized in {}ms: {} dirs copied, {} files copied, {} updated, \
             {} files deleted, {} dirs deleted, {} errors",
            report.duration_ms,
            report.dirs_copied,
            report.files_copied,
            report.files_updated,
            report.files_deleted,
            report.dirs_deleted,
            report.errors
        );
        report
    }

    fn run_pass(&self, report: &mut SyncReport) -> Result<()> {
        check_root(&self.source)?;
        check_root(&self.target)?;
        self.create_and_update(report)?;
        self.delete_orphans(report)
    }

    /// Phase 1: source -> target.
    fn create_and_update(&self, report: &mut SyncReport) -> Result<()> {
        let mut walker = WalkDir::new(&self.source)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        while let Some(item) = walker.next() {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping source entry: {}", e);
                    report.errors += 1;
                    continue;
                }
            };

            let outcome = TreeEntry::from_walk(&self.source, &entry)
                .and_then(|entry| self.mirror_entry(&entry, report));
            match outcome {
                // The subtree copy already handled and counted everything
                // below this directory.
                Ok(true) => walker.skip_current_dir(),
                Ok(false) => {}
                Err(e) => {
                    warn!("{}", e);
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    /// Brings one target entry in line with its source entry.
    ///
    /// Returns `true` when a whole directory subtree was copied.
    fn mirror_entry(&self, entry: &TreeEntry, report: &mut SyncReport) -> Result<bool> {
        let counterpart = entry.counterpart(&self.target);
        let existing = EntryKind::detect(&counterpart);

        if entry.kind.is_dir() {
            debug!("Comparing directory: {}", entry.relative);
            match existing {
                Some(EntryKind::Directory) => {}
                other => {
                    if let Some(kind) = other {
                        remove_entry(&counterpart, kind)?;
                        debug!("Removed {:?} in the way of directory {}", kind, entry.relative);
                    }
                    let stats =
                        copy_dir_recursive(&entry.absolute, &counterpart, self.follow_symlinks);
                    report.dirs_copied += stats.dirs;
                    report.files_copied += stats.files;
                    report.errors += stats.errors;
                    debug!("Copied directory: {}", entry.relative);
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        debug!("Comparing file: {}", entry.relative);
        match existing {
            None => {
                copy_file_preserving(&entry.absolute, &counterpart)?;
                report.files_copied += 1;
                debug!("Copied file: {}", entry.relative);
            }
            Some(EntryKind::File) => {
                if !files_identical(&entry.absolute, &counterpart)? {
                    debug!("File mismatch: {}", entry.relative);
                    overwrite_file(&entry.absolute, &counterpart)?;
                    report.files_updated += 1;
                }
            }
            Some(kind) => {
                remove_entry(&counterpart, kind)?;
                copy_file_preserving(&entry.absolute, &counterpart)?;
                report.files_copied += 1;
                debug!("Replaced {:?} with file: {}", kind, entry.relative);
            }
        }
        Ok(false)
    }

    /// Phase 2: delete from the target what the source does not have.
    fn delete_orphans(&self, report: &mut SyncReport) -> Result<()> {
        let mut walker = WalkDir::new(&self.target).sort_by_file_name().into_iter();

        while let Some(item) = walker.next() {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping target entry: {}", e);
                    report.errors += 1;
                    continue;
                }
            };

            let entry = match TreeEntry::from_walk(&self.target, &entry) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("{}", e);
                    report.errors += 1;
                    continue;
                }
            };
            if entry.relative.is_root()
                || EntryKind::detect(&entry.counterpart(&self.source)).is_some()
            {
                continue;
            }

            if entry.kind.is_dir() {
                walker.skip_current_dir();
            }

            match remove_entry(&entry.absolute, entry.kind) {
                Ok(()) if entry.kind.is_dir() => {
                    report.dirs_deleted += 1;
                    debug!("Deleted directory: {}", entry.relative);
                }
                Ok(()) => {
                    report.files_deleted += 1;
                    debug!("Deleted file: {}", entry.relative);
                }
                Err(e) => {
                    warn!("{}", e);
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }
}

impl Reconcile for Reconciler {
    fn synchronize(&self) -> SyncReport {
        Reconciler::synchronize(self)
    }

    fn is_busy(&self) -> bool {
        Reconciler::is_busy(self)
    }
}

fn check_root(root: &Path) -> Result<()> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SyncError::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SyncError::MissingRoot(root.to_path_buf()))
        }
        Err(e) => Err(SyncError::io("read root", root, e)),
    }
}
