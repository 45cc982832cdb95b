//! Error types for the reconciliation engine.
//!
//! Per-entry failures are logged and skipped by the walk, so most of these
//! only ever reach the caller when a whole pass has to be abandoned.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience type for fallible reconciliation operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Things that can go wrong while mirroring one tree onto another.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A filesystem operation failed on a specific path.
    #[error("failed to {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory walker could not read an entry.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// One of the two roots vanished or was never there.
    #[error("root directory '{0}' does not exist")]
    MissingRoot(PathBuf),

    /// A root exists but is not a directory.
    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    /// A path seen during a walk was not under the root it was walked from.
    #[error("'{path}' is not under root '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// The config file could not be read or parsed.
    #[error("invalid config '{path}': {reason}")]
    Config { path: PathBuf, reason: String },
}

impl SyncError {
    /// Creates an IO error with the failed action and path for context.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
