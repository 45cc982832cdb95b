//! Classification of raw notify events.
//!
//! Purely informational: the loop logs these and uses them to tell real
//! changes from noise. Convergence itself is left to the reconciler.

use notify::{Event, EventKind};
use std::fmt;
use std::path::{Path, PathBuf};

/// Type of change detected under the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.path().display())
    }
}

/// Maps an event to one change per affected path.
///
/// Access notifications and backend-specific `Other` events carry no
/// content change and yield nothing.
pub fn classify(event: &Event) -> Vec<FileChange> {
    let make: fn(PathBuf) -> FileChange = match event.kind {
        EventKind::Create(_) => FileChange::Created,
        EventKind::Modify(_) | EventKind::Any => FileChange::Modified,
        EventKind::Remove(_) => FileChange::Deleted,
        EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };
    event.paths.iter().cloned().map(make).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{
        AccessKind, AccessMode, CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode,
    };

    #[test]
    fn test_classify_kinds() {
        let created =
            Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/s/a"));
        assert_eq!(classify(&created), vec![FileChange::Created(PathBuf::from("/s/a"))]);

        let touched = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)))
            .add_path(PathBuf::from("/s/a"));
        assert_eq!(classify(&touched), vec![FileChange::Modified(PathBuf::from("/s/a"))]);

        let removed =
            Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(PathBuf::from("/s/d"));
        assert_eq!(classify(&removed), vec![FileChange::Deleted(PathBuf::from("/s/d"))]);
    }

    #[test]
    fn test_access_is_noise() {
        let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(PathBuf::from("/s/a"));
        assert!(classify(&closed).is_empty());
    }

    #[test]
    fn test_rename_yields_both_paths() {
        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/s/old"))
            .add_path(PathBuf::from("/s/new"));
        let changes = classify(&renamed);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].to_string(), "modified /s/new");
    }
}
